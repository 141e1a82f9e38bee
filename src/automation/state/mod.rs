pub mod shared;

pub use shared::{StateActor, StateClient, StateCommand};
