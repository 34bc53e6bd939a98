use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recommend::{
    EngineSettings, HeuristicWeights, ModelBonusWeights, TrainingSettings, DEFAULT_MODEL_SLOT,
    DEFAULT_RECOMMENDATION_COUNT, HEURISTIC_WINDOW_DAYS, MODEL_WINDOW_DAYS,
};

/// Upper bound on plans a single request may ask for
pub const MAX_RECOMMENDATION_COUNT: usize = 50;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub recommendation: RecommendationConfig,
    pub model: ModelConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub default_count: usize,
    pub heuristic_window_days: u32,
    pub model_window_days: u32,
    pub weights: HeuristicWeights,
    pub bonuses: ModelBonusWeights,
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub enabled: bool,
    pub artifact_dir: PathBuf,
    pub slot: String,
    pub training: TrainingSettings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub model_enabled: Option<bool>,
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://planwise.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            recommendation: RecommendationConfig {
                default_count: DEFAULT_RECOMMENDATION_COUNT,
                heuristic_window_days: HEURISTIC_WINDOW_DAYS,
                model_window_days: MODEL_WINDOW_DAYS,
                weights: HeuristicWeights::default(),
                bonuses: ModelBonusWeights::default(),
            },
            model: ModelConfig {
                enabled: true,
                artifact_dir: PathBuf::from("models"),
                slot: DEFAULT_MODEL_SLOT.to_string(),
                training: TrainingSettings::default(),
            },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("planwise.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Settings for [`crate::recommend::RecommendationService`].
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_count: self.recommendation.default_count,
            heuristic_window_days: self.recommendation.heuristic_window_days,
            model_window_days: self.recommendation.model_window_days,
            model_enabled: self.model.enabled,
            slot: self.model.slot.clone(),
            heuristic: self.recommendation.weights,
            bonuses: self.recommendation.bonuses,
            training: self.model.training,
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(recommendation) = patch.recommendation {
            if let Some(default_count) = recommendation.default_count {
                self.recommendation.default_count = default_count;
            }
            if let Some(days) = recommendation.heuristic_window_days {
                self.recommendation.heuristic_window_days = days;
            }
            if let Some(days) = recommendation.model_window_days {
                self.recommendation.model_window_days = days;
            }
            if let Some(weights) = recommendation.weights {
                self.recommendation.weights = weights;
            }
            if let Some(bonuses) = recommendation.bonuses {
                self.recommendation.bonuses = bonuses;
            }
        }

        if let Some(model) = patch.model {
            if let Some(enabled) = model.enabled {
                self.model.enabled = enabled;
            }
            if let Some(artifact_dir) = model.artifact_dir {
                self.model.artifact_dir = artifact_dir;
            }
            if let Some(slot) = model.slot {
                self.model.slot = slot;
            }
            let training = &mut self.model.training;
            if let Some(holdout_fraction) = model.holdout_fraction {
                training.holdout_fraction = holdout_fraction;
            }
            if let Some(seed) = model.seed {
                training.seed = seed;
            }
            if let Some(epochs) = model.epochs {
                training.epochs = epochs;
            }
            if let Some(learning_rate) = model.learning_rate {
                training.learning_rate = learning_rate;
            }
            if let Some(l2) = model.l2 {
                training.l2 = l2;
            }
            if let Some(min_rows) = model.min_rows {
                training.min_rows = min_rows;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PLANWISE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PLANWISE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("PLANWISE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("PLANWISE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PLANWISE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PLANWISE_SERVER_PORT") {
            self.server.port = parse_env("PLANWISE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("PLANWISE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("PLANWISE_LOGGING_LEVEL").or_else(|| read_env("PLANWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PLANWISE_LOGGING_FORMAT").or_else(|| read_env("PLANWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        let recommendation = &mut self.recommendation;
        if let Some(value) = read_env("PLANWISE_RECOMMENDATION_DEFAULT_COUNT") {
            recommendation.default_count =
                parse_env("PLANWISE_RECOMMENDATION_DEFAULT_COUNT", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_RECOMMENDATION_HEURISTIC_WINDOW_DAYS") {
            recommendation.heuristic_window_days =
                parse_env("PLANWISE_RECOMMENDATION_HEURISTIC_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_RECOMMENDATION_MODEL_WINDOW_DAYS") {
            recommendation.model_window_days =
                parse_env("PLANWISE_RECOMMENDATION_MODEL_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_RECOMMENDATION_CAPACITY_WEIGHT") {
            recommendation.weights.capacity =
                parse_env("PLANWISE_RECOMMENDATION_CAPACITY_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_RECOMMENDATION_PRICE_WEIGHT") {
            recommendation.weights.price =
                parse_env("PLANWISE_RECOMMENDATION_PRICE_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_RECOMMENDATION_SPEED_WEIGHT") {
            recommendation.weights.speed =
                parse_env("PLANWISE_RECOMMENDATION_SPEED_WEIGHT", &value)?;
        }

        if let Some(value) = read_env("PLANWISE_MODEL_ENABLED") {
            self.model.enabled = parse_env("PLANWISE_MODEL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_MODEL_ARTIFACT_DIR") {
            self.model.artifact_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("PLANWISE_MODEL_SLOT") {
            self.model.slot = value;
        }
        let training = &mut self.model.training;
        if let Some(value) = read_env("PLANWISE_MODEL_HOLDOUT_FRACTION") {
            training.holdout_fraction = parse_env("PLANWISE_MODEL_HOLDOUT_FRACTION", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_MODEL_SEED") {
            training.seed = parse_env("PLANWISE_MODEL_SEED", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_MODEL_EPOCHS") {
            training.epochs = parse_env("PLANWISE_MODEL_EPOCHS", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_MODEL_LEARNING_RATE") {
            training.learning_rate = parse_env("PLANWISE_MODEL_LEARNING_RATE", &value)?;
        }
        if let Some(value) = read_env("PLANWISE_MODEL_L2") {
            training.l2 = parse_env("PLANWISE_MODEL_L2", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.model_enabled {
            self.model.enabled = enabled;
        }
        if let Some(artifact_dir) = overrides.artifact_dir {
            self.model.artifact_dir = artifact_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_recommendation(&self.recommendation)?;
        validate_model(&self.model)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("planwise.toml"), PathBuf::from("config/planwise.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_recommendation(recommendation: &RecommendationConfig) -> Result<(), ConfigError> {
    if recommendation.default_count == 0
        || recommendation.default_count > MAX_RECOMMENDATION_COUNT
    {
        return Err(ConfigError::Validation(format!(
            "recommendation.default_count must be in range 1..={MAX_RECOMMENDATION_COUNT}"
        )));
    }

    if recommendation.heuristic_window_days == 0 || recommendation.model_window_days == 0 {
        return Err(ConfigError::Validation(
            "recommendation window days must be greater than zero".to_string(),
        ));
    }

    let weights = &recommendation.weights;
    let all_weights = [
        ("capacity", weights.capacity),
        ("price", weights.price),
        ("speed", weights.speed),
        ("base_growth", weights.base_growth),
        ("volatility_growth", weights.volatility_growth),
        ("peak_headroom", weights.peak_headroom),
        ("overshoot_penalty", weights.overshoot_penalty),
        ("undershoot_credit", weights.undershoot_credit),
        ("mbps_per_daily_gb", weights.mbps_per_daily_gb),
        ("min_required_mbps", weights.min_required_mbps),
    ];
    if let Some((name, _)) = all_weights.iter().find(|(_, value)| !(value.is_finite() && *value >= 0.0))
    {
        return Err(ConfigError::Validation(format!(
            "recommendation.weights.{name} must be a non-negative number"
        )));
    }
    if weights.capacity + weights.price + weights.speed <= 0.0 {
        return Err(ConfigError::Validation(
            "recommendation.weights capacity+price+speed must be greater than zero".to_string(),
        ));
    }

    let bonuses = &recommendation.bonuses;
    let all_bonuses = [
        bonuses.category_match,
        bonuses.capacity_buffered,
        bonuses.capacity_covered,
        bonuses.capacity_partial,
        bonuses.capacity_buffer,
        bonuses.good_value_ppu,
        bonuses.good_value_bonus,
        bonuses.fair_value_ppu,
        bonuses.fair_value_bonus,
        bonuses.speed_bonus,
        bonuses.speed_multiplier,
    ];
    if all_bonuses.iter().any(|value| !(value.is_finite() && *value >= 0.0)) {
        return Err(ConfigError::Validation(
            "recommendation.bonuses values must be non-negative numbers".to_string(),
        ));
    }

    Ok(())
}

fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    if model.artifact_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("model.artifact_dir must not be empty".to_string()));
    }

    let slot_valid = !model.slot.is_empty()
        && !model.slot.starts_with('.')
        && model.slot.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !slot_valid {
        return Err(ConfigError::Validation(
            "model.slot may only contain ASCII letters, digits, `-`, `_` and `.`".to_string(),
        ));
    }

    let training = &model.training;
    if !(training.holdout_fraction > 0.0 && training.holdout_fraction < 1.0) {
        return Err(ConfigError::Validation(
            "model.holdout_fraction must be strictly between 0 and 1".to_string(),
        ));
    }
    if training.epochs == 0 {
        return Err(ConfigError::Validation("model.epochs must be greater than zero".to_string()));
    }
    if !(training.learning_rate.is_finite() && training.learning_rate > 0.0) {
        return Err(ConfigError::Validation(
            "model.learning_rate must be a positive number".to_string(),
        ));
    }
    if !(training.l2.is_finite() && training.l2 >= 0.0) {
        return Err(ConfigError::Validation("model.l2 must be a non-negative number".to_string()));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    recommendation: Option<RecommendationPatch>,
    model: Option<ModelPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    default_count: Option<usize>,
    heuristic_window_days: Option<u32>,
    model_window_days: Option<u32>,
    weights: Option<HeuristicWeights>,
    bonuses: Option<ModelBonusWeights>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    enabled: Option<bool>,
    artifact_dir: Option<PathBuf>,
    slot: Option<String>,
    holdout_fraction: Option<f64>,
    seed: Option<u64>,
    epochs: Option<usize>,
    learning_rate: Option<f64>,
    l2: Option<f64>,
    min_rows: Option<usize>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_engine_constants() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        let settings = config.engine_settings();

        ensure(settings.default_count == 3, "default count should be 3")?;
        ensure(settings.heuristic_window_days == 60, "heuristic window should be 60 days")?;
        ensure(settings.model_window_days == 90, "model window should be 90 days")?;
        ensure(settings.training.seed == 42, "default seed should be 42")?;
        ensure(settings.heuristic.capacity == 0.5, "capacity weight should default to 0.5")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PLANWISE_ARTIFACTS", "/var/lib/planwise/models");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("planwise.toml");
            fs::write(
                &path,
                r#"
[model]
artifact_dir = "${TEST_PLANWISE_ARTIFACTS}"
seed = 7
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.model.artifact_dir == PathBuf::from("/var/lib/planwise/models"),
                "artifact dir should be interpolated from environment",
            )?;
            ensure(config.model.training.seed == 7, "seed should come from the file")?;
            ensure(
                config.model.training.holdout_fraction == 0.2,
                "unspecified training settings keep defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_PLANWISE_ARTIFACTS"]);
        result
    }

    #[test]
    fn partial_weight_tables_fill_remaining_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("planwise.toml");
        fs::write(
            &path,
            r#"
[recommendation]
default_count = 5

[recommendation.weights]
capacity = 0.6
price = 0.2

[recommendation.bonuses]
category_match = 50.0
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.recommendation.default_count == 5, "default count should be 5")?;
        ensure(config.recommendation.weights.capacity == 0.6, "capacity weight from file")?;
        ensure(config.recommendation.weights.speed == 0.2, "speed weight keeps default")?;
        ensure(config.recommendation.weights.peak_headroom == 1.1, "headroom keeps default")?;
        ensure(config.recommendation.bonuses.category_match == 50.0, "category bonus from file")?;
        ensure(config.recommendation.bonuses.capacity_buffered == 30.0, "bonus keeps default")
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PLANWISE_LOG_LEVEL", "warn");
        env::set_var("PLANWISE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["PLANWISE_LOG_LEVEL", "PLANWISE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PLANWISE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("PLANWISE_SERVER_PORT", "9090");
        env::set_var("PLANWISE_MODEL_ENABLED", "false");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("planwise.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7070

[model]
enabled = true

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "env port should win over file")?;
            ensure(!config.model.enabled, "env model toggle should win over file")?;
            Ok(())
        })();

        clear_vars(&["PLANWISE_DATABASE_URL", "PLANWISE_SERVER_PORT", "PLANWISE_MODEL_ENABLED"]);
        result
    }

    #[test]
    fn invalid_env_value_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PLANWISE_MODEL_EPOCHS", "many");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Ok(_) => Err("expected env parse failure".to_string()),
                Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                    ensure(key == "PLANWISE_MODEL_EPOCHS", "error should name the env var")
                }
                Err(other) => Err(format!("unexpected error: {other}")),
            }
        })();

        clear_vars(&["PLANWISE_MODEL_EPOCHS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PLANWISE_MODEL_HOLDOUT_FRACTION", "1.5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("model.holdout_fraction")
            );
            ensure(has_message, "validation failure should mention model.holdout_fraction")
        })();

        clear_vars(&["PLANWISE_MODEL_HOLDOUT_FRACTION"]);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let result = AppConfig::load(LoadOptions {
            config_path: Some(missing),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "require_file should reject a missing config",
        )
    }
}
