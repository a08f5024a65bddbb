//! Run settings resolved from command-line flags, the environment (and `.env`)
//! and an optional YAML file, in that order of precedence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dataset::{DEFAULT_DATASET_URL, DatasetSource};
use crate::store::config::{parse_connect_kv, parse_engine};
use crate::store::{ConnectOptions, Engine};

pub const ENDPOINT_VAR: &str = "COSMOS_ENDPOINT_URI";
pub const KEY_VAR: &str = "COSMOS_PRIMARY_KEY";
pub const REGION_VAR: &str = "COSMOS_PREFERRED_REGION";
pub const APPLICATION_NAME: &str = "CosmosOptimization";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set; export it or add it to .env or the config file")]
    Missing(&'static str),
    #[error("unknown store '{0}'")]
    UnknownStore(String),
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Shape of the YAML config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub store: Option<String>,
    pub endpoint: Option<String>,
    pub primary_key: Option<String>,
    pub preferred_region: Option<String>,
    pub application_name: Option<String>,
    pub dataset_url: Option<String>,
    pub dataset_file: Option<PathBuf>,
    pub synthetic_users: Option<usize>,
    pub seed: Option<u64>,
    pub repeat: Option<u32>,
    pub connect: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&body).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(body: &str) -> Result<Self, serde_yaml::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(body)
    }
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub store: Option<String>,
    pub region: Option<String>,
    pub connect: Vec<String>,
    pub dataset_url: Option<String>,
    pub dataset_file: Option<PathBuf>,
    pub synthetic_users: Option<usize>,
    pub seed: Option<u64>,
    pub repeat: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: Engine,
    pub connect: ConnectOptions,
    pub dataset: DatasetSource,
    pub repeat: u32,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Merges the three layers. `env` looks up one variable; pass
/// `|k| std::env::var(k).ok()` in production.
pub fn resolve(
    cli: &Overrides,
    file: FileConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let store = cli
        .store
        .clone()
        .or(file.store)
        .unwrap_or_else(|| "cosmos".to_string());
    let engine = parse_engine(&store).ok_or(ConfigError::UnknownStore(store))?;

    let endpoint = non_empty(env(ENDPOINT_VAR)).or(non_empty(file.endpoint));
    let key = non_empty(env(KEY_VAR)).or(non_empty(file.primary_key));
    let (endpoint, key) = match engine {
        Engine::Cosmos => (
            endpoint.ok_or(ConfigError::Missing(ENDPOINT_VAR))?,
            key.ok_or(ConfigError::Missing(KEY_VAR))?,
        ),
        #[cfg(any(test, feature = "store-memory"))]
        Engine::Memory => (endpoint.unwrap_or_default(), key.unwrap_or_default()),
    };

    let mut params = file.connect;
    params.extend(parse_connect_kv(&cli.connect));
    let connect = ConnectOptions {
        endpoint,
        key,
        preferred_region: non_empty(cli.region.clone())
            .or(non_empty(env(REGION_VAR)))
            .or(non_empty(file.preferred_region)),
        application_name: Some(file.application_name.unwrap_or_else(|| APPLICATION_NAME.to_string())),
        allow_bulk: false,
        params,
    };

    let synthetic_users = cli.synthetic_users.or(file.synthetic_users);
    let dataset = if let Some(users) = synthetic_users {
        if users == 0 {
            return Err(ConfigError::Invalid("synthetic users must be positive".into()));
        }
        DatasetSource::Synthetic {
            users,
            seed: cli.seed.or(file.seed).unwrap_or(42),
        }
    } else if let Some(path) = cli.dataset_file.clone().or(file.dataset_file) {
        DatasetSource::File(path)
    } else {
        DatasetSource::Url(
            cli.dataset_url
                .clone()
                .or(file.dataset_url)
                .unwrap_or_else(|| DEFAULT_DATASET_URL.to_string()),
        )
    };

    let repeat = cli.repeat.or(file.repeat).unwrap_or(1);
    if repeat == 0 {
        return Err(ConfigError::Invalid("repeat must be at least 1".into()));
    }

    Ok(Settings {
        engine,
        connect,
        dataset,
        repeat,
    })
}

/// Loads `.env` from the working directory when present.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }
}
