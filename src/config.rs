//! Runtime settings shared by the `askdb` and `askdb-rest` binaries.
//!
//! Every setting is a clap argument that can also be supplied through the
//! environment, so containers can configure the service without flags.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::oracle::{GeminiOracle, Oracle};
use crate::Result;

pub const DEFAULT_UPLOADS_DIR: &str = "/app/uploads";
pub const DEFAULT_CONTAINER_HOST: &str = "host.docker.internal";
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";
pub const DEFAULT_ORACLE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TOP_K: usize = 1000;
pub const DEFAULT_SAMPLE_ROWS: usize = 3;

/// How connection descriptors are turned into readers
#[derive(Debug, Clone, Args)]
pub struct ResolverSettings {
    /// Directory holding uploaded CSV files; `csvPath` is looked up here by file name
    #[arg(long, env = "ASKDB_UPLOADS_DIR", default_value = DEFAULT_UPLOADS_DIR)]
    pub uploads_dir: PathBuf,

    /// Host that replaces `localhost`/`127.0.0.1` in MySQL descriptors (empty = keep loopback)
    #[arg(long, env = "ASKDB_CONTAINER_HOST", default_value = DEFAULT_CONTAINER_HOST)]
    pub container_host: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            container_host: DEFAULT_CONTAINER_HOST.to_string(),
        }
    }
}

/// Knobs for the question-to-SQL pipeline
#[derive(Debug, Clone, Args)]
pub struct QueryOptions {
    /// Row limit the model is asked to respect unless the question names one
    #[arg(long, env = "ASKDB_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Example rows per table shown to the model
    #[arg(long, env = "ASKDB_SAMPLE_ROWS", default_value_t = DEFAULT_SAMPLE_ROWS)]
    pub sample_rows: usize,

    /// Maximum rows returned in `data` (0 = unlimited)
    #[arg(long, env = "ASKDB_MAX_ROWS", default_value_t = 0)]
    pub max_rows: usize,

    /// Refuse generated statements that are not read-only queries
    #[arg(long, env = "ASKDB_READ_ONLY")]
    pub read_only: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_rows: 0,
            read_only: false,
        }
    }
}

/// Connection to the text-generation service
#[derive(Clone, Args)]
pub struct OracleSettings {
    /// API key for the Gemini API
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name
    #[arg(long, env = "ASKDB_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the Gemini REST API
    #[arg(long, env = "ASKDB_ORACLE_URL", default_value = DEFAULT_ORACLE_URL)]
    pub oracle_url: String,

    /// Timeout for a single oracle call in seconds (unset = no timeout)
    #[arg(long, env = "ASKDB_ORACLE_TIMEOUT_SECS")]
    pub oracle_timeout_secs: Option<u64>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            oracle_timeout_secs: None,
        }
    }
}

impl fmt::Debug for OracleSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("oracle_url", &self.oracle_url)
            .field("oracle_timeout_secs", &self.oracle_timeout_secs)
            .finish()
    }
}

impl OracleSettings {
    /// Build the process-wide oracle client
    pub fn build(&self) -> Result<Arc<dyn Oracle>> {
        let oracle = GeminiOracle::new(
            &self.oracle_url,
            &self.model,
            self.api_key.clone(),
            self.oracle_timeout_secs.map(Duration::from_secs),
        )?;
        Ok(Arc::new(oracle))
    }
}

/// All settings, flattened into each binary's argument parser
#[derive(Debug, Clone, Default, Args)]
pub struct Settings {
    #[command(flatten)]
    pub resolver: ResolverSettings,

    #[command(flatten)]
    pub query: QueryOptions,

    #[command(flatten)]
    pub oracle: OracleSettings,
}
