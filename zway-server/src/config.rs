//! Server configuration (`SPEC_FULL.md` §B.4): loaded from a TOML file via
//! `serdeconv` (the teacher's `game/core/src/config.rs` pattern), with CLI
//! flags layered on top in `main`.

use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    5557
}
fn default_num_workers() -> usize {
    20
}
fn default_working_dir() -> String {
    ".".to_string()
}
fn default_store_pool_size() -> usize {
    10
}
fn default_heartbeat_timeout_secs() -> u64 {
    40
}
fn default_stream_idle_timeout_secs() -> u64 {
    60
}

pub const MAX_WORKERS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub daemon: bool,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default = "default_store_pool_size")]
    pub store_pool_size: usize,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// The reference server comments out forced disconnect on heartbeat
    /// expiry; expiry is always logged, but only closes the session when
    /// this is set (`spec.md` §9).
    #[serde(default)]
    pub heartbeat_disconnect: bool,
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    #[serde(default)]
    pub fcm_key: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Config {
        serdeconv::from_toml_file(path).expect("error loading server configuration file")
    }

    /// `spec.md` §6: worker count is capped at 50 regardless of what the
    /// config file or CLI flag asked for.
    pub fn clamped_workers(&self) -> usize {
        self.num_workers.min(MAX_WORKERS).max(1)
    }

    pub fn tmp_dir(&self) -> String {
        format!("{}/tmp", self.working_dir)
    }

    pub fn cert_path(&self) -> String {
        format!("{}/certs/x509-server.pem", self.working_dir)
    }

    pub fn key_path(&self) -> String {
        format!("{}/certs/x509-server-key.pem", self.working_dir)
    }
}
