//! Batch question processing over a single shared session.

use crate::core::{AssistError, ConversationSession, Engine, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub question: String,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

impl BatchRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            scenario: None,
            max_tokens: None,
        }
    }

    pub fn scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub question: String,
    pub scenario: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What happens when one item's generation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure and return no results.
    #[default]
    Abort,
    /// Record the failure on that item's result and keep going.
    Isolate,
}

#[derive(Debug)]
pub enum BatchEvent<'a> {
    ItemStarted {
        index: usize,
        total: usize,
        question: &'a str,
    },
    ItemFinished {
        index: usize,
        total: usize,
        failed: bool,
    },
}

pub struct BatchRunner<'s, E> {
    session: &'s mut ConversationSession<E>,
    default_max_tokens: usize,
    policy: FailurePolicy,
}

impl<'s, E: Engine> BatchRunner<'s, E> {
    pub fn new(session: &'s mut ConversationSession<E>, default_max_tokens: usize) -> Self {
        Self {
            session,
            default_max_tokens,
            policy: FailurePolicy::default(),
        }
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn run(&mut self, requests: &[BatchRequest]) -> Result<Vec<BatchResult>> {
        self.run_with(requests, |_| {})
    }

    /// Processes `requests` strictly in order, reporting progress to `on_event`.
    pub fn run_with<F>(&mut self, requests: &[BatchRequest], mut on_event: F) -> Result<Vec<BatchResult>>
    where
        F: FnMut(BatchEvent<'_>),
    {
        let total = requests.len();
        let default_scenario = self.session.registry().default_scenario();
        let mut results = Vec::with_capacity(total);

        tracing::info!(total, policy = ?self.policy, "starting batch");

        for (index, request) in requests.iter().enumerate() {
            on_event(BatchEvent::ItemStarted {
                index,
                total,
                question: &request.question,
            });

            let scenario = request
                .scenario
                .clone()
                .unwrap_or_else(|| default_scenario.key().to_string());
            let max_tokens = request.max_tokens.unwrap_or(self.default_max_tokens);

            let outcome = self.session.ask(&request.question, &scenario, max_tokens);
            on_event(BatchEvent::ItemFinished {
                index,
                total,
                failed: outcome.is_err(),
            });

            let result = match (outcome, self.policy) {
                (Ok(response), _) => BatchResult {
                    question: request.question.clone(),
                    scenario,
                    response,
                    error: None,
                },
                (Err(e), FailurePolicy::Abort) => {
                    tracing::error!(item = index + 1, error = %e, "batch aborted");
                    return Err(AssistError::BatchAborted {
                        index,
                        source: Box::new(e),
                    });
                }
                (Err(e), FailurePolicy::Isolate) => {
                    tracing::warn!(item = index + 1, error = %e, "batch item failed, continuing");
                    BatchResult {
                        question: request.question.clone(),
                        scenario,
                        response: String::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }

        Ok(results)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    JsonLines,
    Yaml,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .as_deref()
        {
            Some("jsonl") | Some("ndjson") => InputFormat::JsonLines,
            Some("yaml") | Some("yml") => InputFormat::Yaml,
            _ => InputFormat::Json,
        }
    }
}

pub fn load_requests(path: &Path) -> Result<Vec<BatchRequest>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AssistError::BatchInput(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_requests(&content, InputFormat::from_path(path))
}

pub fn parse_requests(content: &str, format: InputFormat) -> Result<Vec<BatchRequest>> {
    let requests: Vec<BatchRequest> = match format {
        InputFormat::Json => serde_json::from_str(content)
            .map_err(|e| AssistError::BatchInput(e.to_string()))?,
        InputFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| AssistError::BatchInput(e.to_string()))?,
        InputFormat::JsonLines => content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str(line.trim()).map_err(|e| {
                    AssistError::BatchInput(format!("line {}: {}", number + 1, e))
                })
            })
            .collect::<Result<_>>()?,
    };

    if let Some(position) = requests.iter().position(|r| r.max_tokens == Some(0)) {
        return Err(AssistError::BatchInput(format!(
            "record {}: max_tokens must be positive",
            position + 1
        )));
    }

    Ok(requests)
}
