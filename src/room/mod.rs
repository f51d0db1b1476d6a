pub mod manager;

pub use manager::{ActionReceipt, RoomEvent, RoomManager};
