use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use arcade_engine::GameConfig;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV_VAR: &str = "ARCADE_CONFIG";
const DEFAULT_TITLE: &str = "Arcade Demo";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path} at `{field}`: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) struct AppWiring {
    pub(crate) config: GameConfig,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Arcade Demo Startup ===");

    let config = match load_config_from_env() {
        Ok(Some(config)) => config,
        Ok(None) => default_config(),
        Err(error) => {
            warn!(error = %error, "config file rejected; falling back to defaults");
            default_config()
        }
    };
    info!(
        title = config.title.as_str(),
        width = config.width,
        height = config.height,
        desired_fps = config.desired_fps,
        "config_loaded"
    );

    AppWiring { config }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn default_config() -> GameConfig {
    GameConfig {
        title: DEFAULT_TITLE.to_string(),
        ..GameConfig::default()
    }
}

fn load_config_from_env() -> Result<Option<GameConfig>, ConfigError> {
    match env::var(CONFIG_ENV_VAR) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => load_config_file(Path::new(value.trim())).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => {
            warn!(
                env_var = CONFIG_ENV_VAR,
                error = %err,
                "unable to read config env var; using defaults"
            );
            Ok(None)
        }
    }
}

fn load_config_file(path: &Path) -> Result<GameConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text, path)
}

/// Missing fields keep their defaults; the title falls back to the demo's.
fn parse_config(text: &str, path: &Path) -> Result<GameConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let mut config: GameConfig =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let field = error.path().to_string();
            ConfigError::Parse {
                path: path.to_path_buf(),
                field,
                source: error.into_inner(),
            }
        })?;
    if config.title == GameConfig::default().title {
        config.title = DEFAULT_TITLE.to_string();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use arcade_engine::app::{OverCapPolicy, SteppingPolicy};

    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_config(
            r#"{ "width": 1024, "stepping_policy": "catch_up", "physics": { "use_quad_tree": true } }"#,
            Path::new("demo.json"),
        )
        .expect("config parses");

        assert_eq!(config.width, 1024);
        assert_eq!(config.height, GameConfig::default().height);
        assert_eq!(config.stepping_policy, SteppingPolicy::CatchUp);
        assert_eq!(config.over_cap_policy, OverCapPolicy::Clamp);
        assert!(config.physics.use_quad_tree);
        assert_eq!(config.title, DEFAULT_TITLE);
    }

    #[test]
    fn parse_error_names_offending_field() {
        let error = parse_config(r#"{ "loader": { "max_parallel_downloads": "many" } }"#, Path::new("bad.json"))
            .expect_err("type mismatch rejected");
        match error {
            ConfigError::Parse { field, .. } => assert_eq!(field, "loader.max_parallel_downloads"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("arcade.json");
        fs::write(&path, r#"{ "title": "Bounce", "desired_fps": 30 }"#).expect("write config");

        let config = load_config_file(&path).expect("config loads");
        assert_eq!(config.title, "Bounce");
        assert_eq!(config.desired_fps, 30);

        let missing = load_config_file(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
