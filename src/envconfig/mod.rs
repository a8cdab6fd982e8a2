use mindcare::core::device::MAX_SUPPORTED_CAPABILITY;
use mindcare::{AssistError, SamplingConfig, Scenario};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHECKPOINT: &str = "./output/Qwen3-0.6B/checkpoint-1580";
pub const DEFAULT_MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub checkpoint: PathBuf,
    pub default_scenario: String,
    pub max_tokens: usize,
    pub output_dir: PathBuf,
    pub max_capability: u32,
    pub sampling: SamplingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint: PathBuf::from(DEFAULT_CHECKPOINT),
            default_scenario: Scenario::Assessment.key().to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            output_dir: PathBuf::from("."),
            max_capability: MAX_SUPPORTED_CAPABILITY,
            sampling: SamplingConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then the YAML config file if one exists, then `MINDCARE_*`
    /// environment variables.
    pub fn load() -> Result<Self, AssistError> {
        let explicit = env::var_os("MINDCARE_CONFIG").map(PathBuf::from);

        let mut config = match (&explicit, default_path()) {
            (Some(path), _) => Self::from_file(path)?,
            (None, Some(path)) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AssistError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AssistError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|e| {
            AssistError::Configuration(format!("{}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AssistError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MINDCARE_CHECKPOINT") {
            self.checkpoint = PathBuf::from(v);
        }
        if let Some(v) = lookup("MINDCARE_DEFAULT_SCENARIO") {
            self.default_scenario = v;
        }
        if let Some(v) = lookup("MINDCARE_MAX_TOKENS") {
            self.max_tokens = parse_var("MINDCARE_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("MINDCARE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MINDCARE_SEED") {
            self.sampling.seed = parse_var("MINDCARE_SEED", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AssistError> {
        if self.max_tokens == 0 {
            return Err(AssistError::Configuration(
                "max_tokens must be positive".to_string(),
            ));
        }
        self.default_scenario()?;
        Ok(())
    }

    pub fn default_scenario(&self) -> Result<Scenario, AssistError> {
        self.default_scenario
            .parse()
            .map_err(|e| AssistError::Configuration(format!("default scenario: {}", e)))
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mindcare").join("config.yaml"))
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AssistError> {
    value
        .trim()
        .parse()
        .map_err(|_| AssistError::Configuration(format!("{} has invalid value '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.checkpoint, PathBuf::from(DEFAULT_CHECKPOINT));
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.default_scenario().unwrap(), Scenario::Assessment);
        assert_eq!(config.max_capability, 11);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "checkpoint: /models/qwen3\nmax_tokens: 256\nsampling:\n  temperature: 0.7\n  seed: 42\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.checkpoint, PathBuf::from("/models/qwen3"));
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.sampling.temperature, Some(0.7));
        assert_eq!(config.sampling.seed, 42);
        assert_eq!(config.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_unknown_yaml_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_tokns: 10\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, AssistError::Configuration(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[
                ("MINDCARE_CHECKPOINT", "/ckpt"),
                ("MINDCARE_DEFAULT_SCENARIO", "mindfulness"),
                ("MINDCARE_MAX_TOKENS", " 128 "),
                ("MINDCARE_OUTPUT_DIR", "/tmp/out"),
                ("MINDCARE_SEED", "7"),
            ]))
            .unwrap();

        assert_eq!(config.checkpoint, PathBuf::from("/ckpt"));
        assert_eq!(config.default_scenario().unwrap(), Scenario::Mindfulness);
        assert_eq!(config.max_tokens, 128);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.sampling.seed, 7);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        let err = config
            .apply_env(env_of(&[("MINDCARE_MAX_TOKENS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("MINDCARE_MAX_TOKENS"));

        config.max_tokens = 0;
        assert!(config.validate().is_err());

        let config = Config {
            default_scenario: "astrology".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AssistError::Configuration(_))));
    }
}
