use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use time::OffsetDateTime;
use uuid::Uuid;

use dutch::game::actions::{self, Action};
use dutch::game::cards::{DECK_SIZE, create_deck};
use dutch::game::state::{DrawSource, Phase, PlayerId, Room, RoomRecord, RoomStatus};
use dutch::game::view::project_for;

fn dealt(players: usize, seed: u64) -> (RoomRecord, Vec<PlayerId>) {
    let now = OffsetDateTime::UNIX_EPOCH;
    let ids: Vec<PlayerId> = (0..players).map(|_| Uuid::new_v4()).collect();
    let mut room = Room::new("room".into(), "ABCDEF".into(), ids[0], "p0".into(), players, now).unwrap();
    for (i, id) in ids.iter().enumerate().skip(1) {
        room.add_member(*id, format!("p{i}")).unwrap();
    }
    let mut record = RoomRecord::new(room);
    actions::start_game(&mut record, create_deck(&mut StdRng::seed_from_u64(seed)), now).unwrap();
    (record, ids)
}

/// One step of a random session: who tries what.
#[derive(Debug, Clone)]
enum Step {
    Act { actor: usize, action: Action },
    EndMemorizing,
    Timeout,
}

fn step() -> impl Strategy<Value = Step> {
    let action = prop_oneof![
        prop_oneof![Just(DrawSource::Deck), Just(DrawSource::Discard)].prop_map(|source| Action::Draw { source }),
        (0usize..5).prop_map(|hand_index| Action::Swap { hand_index }),
        Just(Action::Discard),
        Just(Action::CallDutch),
    ];
    prop_oneof![
        8 => (0usize..6, action).prop_map(|(actor, action)| Step::Act { actor, action }),
        1 => Just(Step::EndMemorizing),
        1 => Just(Step::Timeout),
    ]
}

proptest! {
    #[test]
    fn cards_are_conserved_and_hands_stay_private(
        seed in any::<u64>(),
        players in 2usize..=6,
        steps in prop::collection::vec(step(), 0..200),
    ) {
        let (mut record, ids) = dealt(players, seed);
        let now = OffsetDateTime::UNIX_EPOCH;

        for step in steps {
            let before = record.clone();
            let result = match step {
                Step::Act { actor, action } => actions::apply(&mut record, ids[actor % players], action, now).map(|_| ()),
                Step::EndMemorizing => actions::end_memorizing(&mut record, now).map(|_| ()),
                Step::Timeout => {
                    let turn = record.room.turn_number;
                    actions::expire_turn(&mut record, turn, now).map(|_| ())
                }
            };
            if result.is_err() {
                prop_assert_eq!(&record, &before);
            }

            let game = record.game.as_ref().unwrap();
            prop_assert_eq!(game.total_cards(), DECK_SIZE);
            prop_assert_eq!(record.room.status == RoomStatus::Finished, game.phase == Phase::Finished);
            if game.phase == Phase::Finished {
                prop_assert!(record.room.current_turn.is_none());
                prop_assert!(game.final_scores.is_some());
                prop_assert!(game.pending_draw.is_none());
            }

            for viewer in &ids {
                let view = project_for(*viewer, &record.room, game, 1);
                for hand in &view.player_hands {
                    prop_assert_eq!(hand.cards.is_some(), hand.player_id == *viewer);
                    prop_assert_eq!(hand.card_count, 4);
                }
                prop_assert!(view.revealed_cards.keys().all(|k| k == viewer));
                if let Some(held) = view.held_card {
                    let pending = game.pending_draw.unwrap();
                    prop_assert_eq!(pending.player_id, *viewer);
                    prop_assert_eq!(pending.card, held);
                }
            }
        }
    }
}
