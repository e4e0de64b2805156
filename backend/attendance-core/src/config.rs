// src/config.rs

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// --- Configuration ---

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Deployed web-app endpoint; missing means every remote call fails with
    /// `NotConfigured`, startup still succeeds.
    #[serde(default)]
    pub sheet_api_url: Option<String>,

    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("./attendance_session")
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sheet_api_url: None,
            server_host: default_server_host(),
            server_port: default_server_port(),
            session_dir: default_session_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        envy::from_env::<Config>()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
