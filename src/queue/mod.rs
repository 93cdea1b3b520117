pub mod broker;
pub mod store;

pub use broker::{TaskBroker, TaskEnvelope};
pub use store::FjallQueue;
