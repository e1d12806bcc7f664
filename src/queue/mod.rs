pub mod broker;
pub mod store;

pub use broker::{MessageEnvelope, TaskBroker};
pub use store::{FjallQueue, QueueError};
