//! Durable JSON records for conversation history and batch results.

use crate::app::batch::BatchResult;
use crate::core::{AssistError, ConversationTurn, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const HISTORY_PREFIX: &str = "mindcare_conversation";
const RESULTS_PREFIX: &str = "batch_results";

pub struct HistoryStore {
    output_dir: PathBuf,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn save_history(&self, turns: &[ConversationTurn], path: Option<&Path>) -> Result<PathBuf> {
        self.save(turns, path, HISTORY_PREFIX)
    }

    pub fn save_results(&self, results: &[BatchResult], path: Option<&Path>) -> Result<PathBuf> {
        self.save(results, path, RESULTS_PREFIX)
    }

    pub fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
        load(path)
    }

    pub fn load_results(path: &Path) -> Result<Vec<BatchResult>> {
        load(path)
    }

    /// Writes `records` as pretty JSON, either to `path` or to a fresh
    /// timestamped file in the output directory. The file appears complete or
    /// not at all.
    fn save<T: Serialize>(&self, records: &[T], path: Option<&Path>, prefix: &str) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(records)?;

        let saved = match path {
            Some(path) => {
                let file = write_temp(parent_dir(path), &json)?;
                file.persist(path).map_err(|e| AssistError::Persistence {
                    path: path.to_path_buf(),
                    source: e.error,
                })?;
                path.to_path_buf()
            }
            None => self.persist_new(prefix, &json)?,
        };

        tracing::info!(path = %saved.display(), records = records.len(), "records saved");
        Ok(saved)
    }

    fn persist_new(&self, prefix: &str, json: &str) -> Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut file = write_temp(&self.output_dir, json)?;

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}_{}.json", prefix, stamp)
            } else {
                format!("{}_{}_{}.json", prefix, stamp, attempt)
            };
            let target = self.output_dir.join(name);

            match file.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    file = e.file;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AssistError::Persistence {
                        path: target,
                        source: e.error,
                    })
                }
            }
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(".")
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn write_temp(dir: &Path, content: &str) -> Result<NamedTempFile> {
    let io_err = |source: std::io::Error| AssistError::Persistence {
        path: dir.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    Ok(file)
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path).map_err(|source| AssistError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
