pub mod conversation;
pub mod device;
pub mod engine;
pub mod error;
pub mod scenario;

pub use conversation::{ConversationHistory, ConversationSession, ConversationTurn};
pub use device::{Backend, DeviceProfile, DeviceSelector, Precision};
pub use engine::{ChatMessage, Engine, Role};
pub use error::{AssistError, Result};
pub use scenario::{Scenario, ScenarioDefinition, ScenarioRegistry, UnknownScenario};
