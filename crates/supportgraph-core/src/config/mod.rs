//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// Supportgraph configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub ingestion: IngestionConfig,
    pub learner: LearnerConfig,
    pub diagnosis: DiagnosisConfig,
    pub analytics: AnalyticsConfig,
    pub layout: LayoutConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "anthropic/claude-3-5-haiku-latest".to_string(),
            fallback_models: vec!["openai/gpt-4o-mini".to_string()],
            temperature: 0.1,
            max_tokens: 2048,
            timeout_secs: 30,
        }
    }
}

/// Which extraction collaborator the ingestion pipeline talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorKind {
    /// LLM when an API key is available, heuristic otherwise
    #[default]
    Auto,
    Llm,
    Heuristic,
}

impl FromStr for CollaboratorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "llm" => Ok(Self::Llm),
            "heuristic" => Ok(Self::Heuristic),
            other => Err(anyhow!(
                "Invalid collaborator: {}. Valid options: auto, llm, heuristic",
                other
            )),
        }
    }
}

impl std::fmt::Display for CollaboratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Llm => write!(f, "llm"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub collaborator: CollaboratorKind,
    /// Upper bound on one extraction call, in seconds
    pub timeout_secs: u64,
    /// Retry once when the first call fails transiently
    pub retry_on_transient: bool,
    /// Candidates below this confidence are ignored
    pub min_candidate_confidence: f32,
    /// Ticket text beyond this many characters is cut before extraction
    pub max_description_chars: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            collaborator: CollaboratorKind::Auto,
            timeout_secs: 45,
            retry_on_transient: true,
            min_candidate_confidence: 0.3,
            max_description_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Added for ratings of 4 or 5
    pub rating_boost: f32,
    /// Subtracted for ratings of 1 or 2
    pub rating_penalty: f32,
    pub positive_sentiment_boost: f32,
    pub negative_sentiment_penalty: f32,
    /// Default reinforcement when a resolution trace names no adjustment
    pub resolution_boost: f32,
    /// Confidence given to entities first learned from a resolution
    pub learned_entity_confidence: f32,
    /// Refuse to apply the same feedback twice
    pub idempotent: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            rating_boost: 0.05,
            rating_penalty: 0.08,
            positive_sentiment_boost: 0.03,
            negative_sentiment_penalty: 0.05,
            resolution_boost: 0.05,
            learned_entity_confidence: 0.6,
            idempotent: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    pub max_causes: usize,
    pub max_solutions: usize,
    pub max_related_cases: usize,
    pub quick_suggestion_limit: usize,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            max_causes: 5,
            max_solutions: 5,
            max_related_cases: 5,
            quick_suggestion_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Entities below this confidence are anomalies
    pub anomaly_threshold: f32,
    /// Anomalies below this confidence are high severity
    pub severe_anomaly_threshold: f32,
    /// Lower edge (exclusive) of the high confidence band
    pub high_confidence: f32,
    /// Upper edge (inclusive) of the low confidence band
    pub medium_confidence: f32,
    /// Entries in the influence ranking
    pub top_influential: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.3,
            severe_anomaly_threshold: 0.2,
            high_confidence: 0.8,
            medium_confidence: 0.5,
            top_influential: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub width: f32,
    pub height: f32,
    /// Cap on the radius of the initial circle
    pub max_initial_radius: f32,
    /// Node pairs further apart than this do not repel
    pub repulsion_distance: f32,
    pub repulsion_strength: f32,
    pub rest_length: f32,
    pub attraction_strength: f32,
    /// Velocity multiplier applied every tick
    pub damping: f32,
    pub node_base_radius: f32,
    pub node_radius_scale: f32,
    pub ticks: usize,
    pub tick_interval_ms: u64,
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            max_initial_radius: 300.0,
            repulsion_distance: 200.0,
            repulsion_strength: 1.0,
            rest_length: 120.0,
            attraction_strength: 0.01,
            damping: 0.9,
            node_base_radius: 6.0,
            node_radius_scale: 10.0,
            ticks: 500,
            tick_interval_ms: 16,
            seed: 42,
        }
    }
}

/// Where the graph is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!(
                "Invalid storage backend: {}. Valid options: sqlite, memory",
                other
            )),
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file; defaults to `supportgraph.db` in the data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Database file to open
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(crate::storage::default_database_path)
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("SUPPORTGRAPH_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty()))
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                let chars: Vec<char> = key.chars().collect();
                if chars.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix: String = chars[chars.len() - 4..].iter().collect();
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

/// Every key accepted by `get`/`set`, in display order
pub const CONFIG_KEYS: &[&str] = &[
    "llm.base_url",
    "llm.default_model",
    "llm.fallback_models",
    "llm.temperature",
    "llm.max_tokens",
    "llm.timeout_secs",
    "llm.api_key",
    "ingestion.collaborator",
    "ingestion.timeout_secs",
    "ingestion.retry_on_transient",
    "ingestion.min_candidate_confidence",
    "ingestion.max_description_chars",
    "learner.rating_boost",
    "learner.rating_penalty",
    "learner.positive_sentiment_boost",
    "learner.negative_sentiment_penalty",
    "learner.resolution_boost",
    "learner.learned_entity_confidence",
    "learner.idempotent",
    "diagnosis.max_causes",
    "diagnosis.max_solutions",
    "diagnosis.max_related_cases",
    "diagnosis.quick_suggestion_limit",
    "analytics.anomaly_threshold",
    "analytics.severe_anomaly_threshold",
    "analytics.high_confidence",
    "analytics.medium_confidence",
    "analytics.top_influential",
    "layout.width",
    "layout.height",
    "layout.max_initial_radius",
    "layout.repulsion_distance",
    "layout.repulsion_strength",
    "layout.rest_length",
    "layout.attraction_strength",
    "layout.damping",
    "layout.node_base_radius",
    "layout.node_radius_scale",
    "layout.ticks",
    "layout.tick_interval_ms",
    "layout.seed",
    "storage.backend",
    "storage.database_path",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SUPPORTGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("supportgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        let a = &self.analytics;
        if a.severe_anomaly_threshold > a.anomaly_threshold {
            return Err(anyhow!(
                "analytics.severe_anomaly_threshold ({}) must not exceed analytics.anomaly_threshold ({})",
                a.severe_anomaly_threshold,
                a.anomaly_threshold
            ));
        }
        if a.medium_confidence > a.high_confidence {
            return Err(anyhow!(
                "analytics.medium_confidence must not exceed analytics.high_confidence"
            ));
        }
        if self.layout.width <= 0.0 || self.layout.height <= 0.0 {
            return Err(anyhow!("layout canvas must have a positive width and height"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let value = match key {
            "llm.base_url" => self.llm.base_url.clone(),
            "llm.default_model" => self.llm.default_model.clone(),
            "llm.fallback_models" => self.llm.fallback_models.join(", "),
            "llm.temperature" => self.llm.temperature.to_string(),
            "llm.max_tokens" => self.llm.max_tokens.to_string(),
            "llm.timeout_secs" => self.llm.timeout_secs.to_string(),
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => redacted,
                None => "(not set - use SUPPORTGRAPH_API_KEY or OPENROUTER_API_KEY env var)"
                    .to_string(),
            },

            "ingestion.collaborator" => self.ingestion.collaborator.to_string(),
            "ingestion.timeout_secs" => self.ingestion.timeout_secs.to_string(),
            "ingestion.retry_on_transient" => self.ingestion.retry_on_transient.to_string(),
            "ingestion.min_candidate_confidence" => {
                self.ingestion.min_candidate_confidence.to_string()
            }
            "ingestion.max_description_chars" => self.ingestion.max_description_chars.to_string(),

            "learner.rating_boost" => self.learner.rating_boost.to_string(),
            "learner.rating_penalty" => self.learner.rating_penalty.to_string(),
            "learner.positive_sentiment_boost" => self.learner.positive_sentiment_boost.to_string(),
            "learner.negative_sentiment_penalty" => {
                self.learner.negative_sentiment_penalty.to_string()
            }
            "learner.resolution_boost" => self.learner.resolution_boost.to_string(),
            "learner.learned_entity_confidence" => {
                self.learner.learned_entity_confidence.to_string()
            }
            "learner.idempotent" => self.learner.idempotent.to_string(),

            "diagnosis.max_causes" => self.diagnosis.max_causes.to_string(),
            "diagnosis.max_solutions" => self.diagnosis.max_solutions.to_string(),
            "diagnosis.max_related_cases" => self.diagnosis.max_related_cases.to_string(),
            "diagnosis.quick_suggestion_limit" => self.diagnosis.quick_suggestion_limit.to_string(),

            "analytics.anomaly_threshold" => self.analytics.anomaly_threshold.to_string(),
            "analytics.severe_anomaly_threshold" => {
                self.analytics.severe_anomaly_threshold.to_string()
            }
            "analytics.high_confidence" => self.analytics.high_confidence.to_string(),
            "analytics.medium_confidence" => self.analytics.medium_confidence.to_string(),
            "analytics.top_influential" => self.analytics.top_influential.to_string(),

            "layout.width" => self.layout.width.to_string(),
            "layout.height" => self.layout.height.to_string(),
            "layout.max_initial_radius" => self.layout.max_initial_radius.to_string(),
            "layout.repulsion_distance" => self.layout.repulsion_distance.to_string(),
            "layout.repulsion_strength" => self.layout.repulsion_strength.to_string(),
            "layout.rest_length" => self.layout.rest_length.to_string(),
            "layout.attraction_strength" => self.layout.attraction_strength.to_string(),
            "layout.damping" => self.layout.damping.to_string(),
            "layout.node_base_radius" => self.layout.node_base_radius.to_string(),
            "layout.node_radius_scale" => self.layout.node_radius_scale.to_string(),
            "layout.ticks" => self.layout.ticks.to_string(),
            "layout.tick_interval_ms" => self.layout.tick_interval_ms.to_string(),
            "layout.seed" => self.layout.seed.to_string(),

            "storage.backend" => self.storage.backend.to_string(),
            "storage.database_path" => self.storage.resolved_database_path().display().to_string(),

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `supportgraph config list` to see available keys.",
                    key
                ));
            }
        };
        Ok(value)
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.base_url" => self.llm.base_url = value.trim_end_matches('/').to_string(),
            "llm.default_model" => self.llm.default_model = value.to_string(),
            "llm.fallback_models" => {
                self.llm.fallback_models = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "llm.temperature" => self.llm.temperature = parse_in_range(key, value, 0.0, 2.0)?,
            "llm.max_tokens" => self.llm.max_tokens = parse_value(key, value)?,
            "llm.timeout_secs" => self.llm.timeout_secs = parse_value(key, value)?,
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the SUPPORTGRAPH_API_KEY or OPENROUTER_API_KEY environment variable instead."
                ));
            }

            "ingestion.collaborator" => self.ingestion.collaborator = value.parse()?,
            "ingestion.timeout_secs" => self.ingestion.timeout_secs = parse_value(key, value)?,
            "ingestion.retry_on_transient" => {
                self.ingestion.retry_on_transient = parse_value(key, value)?
            }
            "ingestion.min_candidate_confidence" => {
                self.ingestion.min_candidate_confidence = parse_in_range(key, value, 0.0, 1.0)?
            }
            "ingestion.max_description_chars" => {
                self.ingestion.max_description_chars = parse_value(key, value)?
            }

            "learner.rating_boost" => {
                self.learner.rating_boost = parse_in_range(key, value, 0.0, 1.0)?
            }
            "learner.rating_penalty" => {
                self.learner.rating_penalty = parse_in_range(key, value, 0.0, 1.0)?
            }
            "learner.positive_sentiment_boost" => {
                self.learner.positive_sentiment_boost = parse_in_range(key, value, 0.0, 1.0)?
            }
            "learner.negative_sentiment_penalty" => {
                self.learner.negative_sentiment_penalty = parse_in_range(key, value, 0.0, 1.0)?
            }
            "learner.resolution_boost" => {
                self.learner.resolution_boost = parse_in_range(key, value, 0.0, 1.0)?
            }
            "learner.learned_entity_confidence" => {
                self.learner.learned_entity_confidence = parse_in_range(key, value, 0.1, 1.0)?
            }
            "learner.idempotent" => self.learner.idempotent = parse_value(key, value)?,

            "diagnosis.max_causes" => self.diagnosis.max_causes = parse_positive(key, value)?,
            "diagnosis.max_solutions" => self.diagnosis.max_solutions = parse_positive(key, value)?,
            "diagnosis.max_related_cases" => {
                self.diagnosis.max_related_cases = parse_value(key, value)?
            }
            "diagnosis.quick_suggestion_limit" => {
                self.diagnosis.quick_suggestion_limit = parse_positive(key, value)?
            }

            "analytics.anomaly_threshold" => {
                self.analytics.anomaly_threshold = parse_in_range(key, value, 0.0, 1.0)?
            }
            "analytics.severe_anomaly_threshold" => {
                self.analytics.severe_anomaly_threshold = parse_in_range(key, value, 0.0, 1.0)?
            }
            "analytics.high_confidence" => {
                self.analytics.high_confidence = parse_in_range(key, value, 0.0, 1.0)?
            }
            "analytics.medium_confidence" => {
                self.analytics.medium_confidence = parse_in_range(key, value, 0.0, 1.0)?
            }
            "analytics.top_influential" => {
                self.analytics.top_influential = parse_positive(key, value)?
            }

            "layout.width" => self.layout.width = parse_in_range(key, value, 1.0, 100_000.0)?,
            "layout.height" => self.layout.height = parse_in_range(key, value, 1.0, 100_000.0)?,
            "layout.max_initial_radius" => {
                self.layout.max_initial_radius = parse_in_range(key, value, 0.0, 100_000.0)?
            }
            "layout.repulsion_distance" => {
                self.layout.repulsion_distance = parse_in_range(key, value, 1.0, 100_000.0)?
            }
            "layout.repulsion_strength" => {
                self.layout.repulsion_strength = parse_in_range(key, value, 0.0, 100.0)?
            }
            "layout.rest_length" => {
                self.layout.rest_length = parse_in_range(key, value, 0.0, 100_000.0)?
            }
            "layout.attraction_strength" => {
                self.layout.attraction_strength = parse_in_range(key, value, 0.0, 1.0)?
            }
            "layout.damping" => self.layout.damping = parse_in_range(key, value, 0.0, 1.0)?,
            "layout.node_base_radius" => {
                self.layout.node_base_radius = parse_in_range(key, value, 0.0, 1000.0)?
            }
            "layout.node_radius_scale" => {
                self.layout.node_radius_scale = parse_in_range(key, value, 0.0, 1000.0)?
            }
            "layout.ticks" => self.layout.ticks = parse_value(key, value)?,
            "layout.tick_interval_ms" => {
                self.layout.tick_interval_ms = parse_positive(key, value)? as u64
            }
            "layout.seed" => self.layout.seed = parse_value(key, value)?,

            "storage.backend" => self.storage.backend = value.parse()?,
            "storage.database_path" => {
                self.storage.database_path = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `supportgraph config list` to see available keys.",
                    key
                ));
            }
        }
        self.validate()
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        CONFIG_KEYS
            .iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}

fn parse_positive(key: &str, value: &str) -> anyhow::Result<usize> {
    let parsed: usize = parse_value(key, value)?;
    if parsed == 0 {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}

fn parse_in_range(key: &str, value: &str, min: f32, max: f32) -> anyhow::Result<f32> {
    let parsed: f32 = parse_value(key, value)?;
    if !(min..=max).contains(&parsed) {
        return Err(anyhow!("{} must be between {} and {}", key, min, max));
    }
    Ok(parsed)
}
