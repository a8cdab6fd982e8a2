pub mod app;
pub mod core;
pub mod infra;
pub mod template;

pub use app::{BatchRequest, BatchResult, BatchRunner, FailurePolicy, InteractiveController};
pub use core::{
    AssistError, ConversationHistory, ConversationSession, ConversationTurn, DeviceProfile, Engine,
    Result, Scenario, ScenarioRegistry,
};
pub use infra::{CandleEngine, HistoryStore, SamplingConfig};
