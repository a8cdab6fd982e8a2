pub mod engine;
pub mod storage;

pub use engine::{CandleEngine, SamplingConfig};
pub use storage::HistoryStore;
