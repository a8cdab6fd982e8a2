//! Conversation turns, the append-only history, and the session that drives the engine.

use crate::core::engine::{ChatMessage, Engine};
use crate::core::error::Result;
use crate::core::scenario::{Scenario, ScenarioDefinition, ScenarioRegistry};
use chrono::{Local, NaiveDateTime, SubsecRound};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub scenario: Scenario,
    pub question: String,
    pub response: Option<String>,
}

impl ConversationTurn {
    pub fn pending(scenario: Scenario, question: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            scenario,
            question: question.into(),
            response: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.response.is_some()
    }
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnId(usize);

/// Append-only log of turns in chronological order.
///
/// Clones share the same log, so a handle taken before a blocking engine call
/// still observes the pending turn the call left behind.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Arc<RwLock<Vec<ConversationTurn>>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, turn: ConversationTurn) -> TurnId {
        let mut turns = self.turns.write();
        turns.push(turn);
        TurnId(turns.len() - 1)
    }

    /// Sets the response of a pending turn. Answered turns are never overwritten.
    pub(crate) fn record_response(&self, id: TurnId, response: String) -> bool {
        let mut turns = self.turns.write();
        match turns.get_mut(id.0) {
            Some(turn) if turn.response.is_none() => {
                turn.response = Some(response);
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.read().clone()
    }

    pub fn last(&self) -> Option<ConversationTurn> {
        self.turns.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }
}

/// The system + user message pair sent to the engine for one question.
pub fn build_messages(definition: &ScenarioDefinition, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(definition.system_prompt.as_str()),
        ChatMessage::user(question),
    ]
}

pub struct ConversationSession<E> {
    engine: E,
    registry: Arc<ScenarioRegistry>,
    history: ConversationHistory,
}

impl<E: Engine> ConversationSession<E> {
    pub fn new(engine: E, registry: Arc<ScenarioRegistry>) -> Self {
        Self {
            engine,
            registry,
            history: ConversationHistory::new(),
        }
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Asks `question` under `scenario_id`, falling back to the default scenario
    /// for unknown ids.
    pub fn ask(&mut self, question: &str, scenario_id: &str, max_tokens: usize) -> Result<String> {
        let scenario = self.registry.resolve(scenario_id);
        self.ask_scenario(question, scenario, max_tokens)
    }

    /// Records a pending turn, runs the engine, and marks the turn answered on
    /// success. A failed call leaves the turn pending.
    pub fn ask_scenario(
        &mut self,
        question: &str,
        scenario: Scenario,
        max_tokens: usize,
    ) -> Result<String> {
        let messages = build_messages(self.registry.get(scenario), question);
        let turn = self.history.append(ConversationTurn::pending(scenario, question));

        tracing::debug!(%scenario, max_tokens, "generating response");
        let response = self.engine.generate(&messages, max_tokens).map_err(|e| {
            tracing::warn!(%scenario, error = %e, "generation failed");
            e
        })?;

        let recorded = self.history.record_response(turn, response.clone());
        debug_assert!(recorded, "turn answered twice");
        Ok(response)
    }
}
