pub mod batch;
pub mod interactive;

pub use batch::{load_requests, BatchRequest, BatchResult, BatchRunner, FailurePolicy};
pub use interactive::{Console, InteractiveController};
