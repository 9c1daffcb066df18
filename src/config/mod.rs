use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Cases are kept in memory when unset.
    pub database_url: Option<String>,

    /// Base URL of the model-serving service. Simulated inference when unset.
    pub inference_url: Option<String>,

    /// Bearer token for the model-serving service
    pub inference_api_token: Option<String>,

    /// Per-request timeout for inference calls, in seconds
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    /// Number of worker labels cases are assigned across
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: u32,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Comma-separated allowed origins; any origin when empty
    #[serde(default)]
    pub cors_origins: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_inference_timeout_secs() -> u64 {
    120
}

fn default_worker_pool_size() -> u32 {
    4
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
