use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use planwise_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let weights = &config.recommendation.weights;
    let training = &config.model.training;

    vec![
        Field {
            key_path: "database.url",
            env_keys: &["PLANWISE_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key_path: "database.max_connections",
            env_keys: &["PLANWISE_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key_path: "database.timeout_secs",
            env_keys: &["PLANWISE_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key_path: "server.bind_address",
            env_keys: &["PLANWISE_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Field {
            key_path: "server.port",
            env_keys: &["PLANWISE_SERVER_PORT"],
            value: config.server.port.to_string(),
        },
        Field {
            key_path: "server.graceful_shutdown_secs",
            env_keys: &["PLANWISE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["PLANWISE_LOGGING_LEVEL", "PLANWISE_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["PLANWISE_LOGGING_FORMAT", "PLANWISE_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
        Field {
            key_path: "recommendation.default_count",
            env_keys: &["PLANWISE_RECOMMENDATION_DEFAULT_COUNT"],
            value: config.recommendation.default_count.to_string(),
        },
        Field {
            key_path: "recommendation.heuristic_window_days",
            env_keys: &["PLANWISE_RECOMMENDATION_HEURISTIC_WINDOW_DAYS"],
            value: config.recommendation.heuristic_window_days.to_string(),
        },
        Field {
            key_path: "recommendation.model_window_days",
            env_keys: &["PLANWISE_RECOMMENDATION_MODEL_WINDOW_DAYS"],
            value: config.recommendation.model_window_days.to_string(),
        },
        Field {
            key_path: "recommendation.weights.capacity",
            env_keys: &["PLANWISE_RECOMMENDATION_CAPACITY_WEIGHT"],
            value: weights.capacity.to_string(),
        },
        Field {
            key_path: "recommendation.weights.price",
            env_keys: &["PLANWISE_RECOMMENDATION_PRICE_WEIGHT"],
            value: weights.price.to_string(),
        },
        Field {
            key_path: "recommendation.weights.speed",
            env_keys: &["PLANWISE_RECOMMENDATION_SPEED_WEIGHT"],
            value: weights.speed.to_string(),
        },
        Field {
            key_path: "model.enabled",
            env_keys: &["PLANWISE_MODEL_ENABLED"],
            value: config.model.enabled.to_string(),
        },
        Field {
            key_path: "model.artifact_dir",
            env_keys: &["PLANWISE_MODEL_ARTIFACT_DIR"],
            value: config.model.artifact_dir.display().to_string(),
        },
        Field {
            key_path: "model.slot",
            env_keys: &["PLANWISE_MODEL_SLOT"],
            value: config.model.slot.clone(),
        },
        Field {
            key_path: "model.holdout_fraction",
            env_keys: &["PLANWISE_MODEL_HOLDOUT_FRACTION"],
            value: training.holdout_fraction.to_string(),
        },
        Field {
            key_path: "model.seed",
            env_keys: &["PLANWISE_MODEL_SEED"],
            value: training.seed.to_string(),
        },
        Field {
            key_path: "model.epochs",
            env_keys: &["PLANWISE_MODEL_EPOCHS"],
            value: training.epochs.to_string(),
        },
        Field {
            key_path: "model.learning_rate",
            env_keys: &["PLANWISE_MODEL_LEARNING_RATE"],
            value: training.learning_rate.to_string(),
        },
        Field {
            key_path: "model.l2",
            env_keys: &["PLANWISE_MODEL_L2"],
            value: training.l2.to_string(),
        },
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("planwise.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/planwise.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source, render_line};

    #[test]
    fn nested_weight_paths_are_attributed_to_the_file() {
        let doc: Value = "[recommendation.weights]\ncapacity = 0.6\n".parse().expect("toml");
        assert!(contains_path(&doc, "recommendation.weights.capacity"));
        assert!(!contains_path(&doc, "recommendation.weights.price"));

        let source = field_source(
            "recommendation.weights.capacity",
            &["PLANWISE_TEST_UNSET_CAPACITY"],
            Some(&doc),
            Some(std::path::Path::new("planwise.toml")),
        );
        assert_eq!(source, "file (planwise.toml)");
    }

    #[test]
    fn unset_fields_report_default_source() {
        let source = field_source("model.slot", &["PLANWISE_TEST_UNSET_SLOT"], None, None);
        assert_eq!(
            render_line("model.slot", "plan-recommendation", source),
            "- model.slot = plan-recommendation (source: default)"
        );
    }
}
