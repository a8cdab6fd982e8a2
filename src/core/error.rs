//! Error types surfaced by the assistant core.

use std::path::PathBuf;

/// Errors that cross a component boundary.
///
/// Conditions the core recovers from on its own (an unusable accelerator, an
/// unknown scenario id, blank interactive input) are modelled as plain values
/// elsewhere and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("checkpoint not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to load engine: {0}")]
    EngineLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid batch input: {0}")]
    BatchInput(String),
    #[error("batch aborted at item {}: {source}", .index + 1)]
    BatchAborted {
        index: usize,
        #[source]
        source: Box<AssistError>,
    },
    #[error("i/o error on {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AssistError {
    pub fn is_inference(&self) -> bool {
        match self {
            AssistError::Inference(_) => true,
            AssistError::BatchAborted { source, .. } => source.is_inference(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = AssistError::CheckpointNotFound(PathBuf::from("/models/missing"));
        assert_eq!(err.to_string(), "checkpoint not found: /models/missing");

        let err = AssistError::Inference("out of memory".to_string());
        assert_eq!(err.to_string(), "inference failed: out of memory");

        let err = AssistError::BatchInput("record 3: missing field `question`".to_string());
        assert_eq!(
            err.to_string(),
            "invalid batch input: record 3: missing field `question`"
        );
    }

    #[test]
    fn test_batch_aborted_reports_one_based_item() {
        let err = AssistError::BatchAborted {
            index: 0,
            source: Box::new(AssistError::Inference("boom".to_string())),
        };
        assert_eq!(err.to_string(), "batch aborted at item 1: inference failed: boom");
        assert!(err.is_inference());
    }

    #[test]
    fn test_persistence_keeps_io_source() {
        let err = AssistError::Persistence {
            path: PathBuf::from("out.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("i/o error on out.json"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_inference());
    }
}
