pub mod reactor;
pub mod store;

pub use reactor::{MockReactor, ReactorEvent};
pub use store::{MockStore, MOCK_POLL_FD};
