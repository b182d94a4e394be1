pub mod core;
pub mod dispatch;
pub mod player;
pub mod socket;
pub mod store;
pub mod volume;
