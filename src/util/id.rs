//! ID utilities (ULIDs, join codes).

use rand::Rng;
use rand::seq::SliceRandom;
use ulid::Ulid;

use crate::game::state::RoomId;

pub const JOIN_CODE_LEN: usize = 6;
/// No 0/O or 1/I, which get misread when codes are shared aloud.
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Room ids are lowercase ULIDs: unique and roughly creation ordered.
pub fn new_room_id() -> RoomId {
    Ulid::new().to_string().to_lowercase()
}

/// Short code players type in to join a room.
pub fn new_join_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..JOIN_CODE_LEN)
        .filter_map(|_| JOIN_CODE_ALPHABET.choose(&mut *rng))
        .map(|b| char::from(*b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_codes_use_the_alphabet() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = new_join_code(&mut rng);
            assert_eq!(code.len(), JOIN_CODE_LEN);
            assert!(code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn room_ids_are_distinct() {
        assert_ne!(new_room_id(), new_room_id());
    }
}
