// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Configuration
//!
//! Typed configuration for every pipeline component, loaded by layering:
//!
//! 1. built-in defaults (the values below),
//! 2. an optional TOML file (`claims_pipeline.toml` or `--config PATH`),
//! 3. `CLAIMS_PIPELINE_*` environment overrides (`__` as section separator,
//!    e.g. `CLAIMS_PIPELINE_INGESTION__WORKERS=5`).
//!
//! Configuration is validated once at startup; components receive their
//! sections by value and never re-read files at runtime. Integration
//! toggles are deliberately *not* here: they live in the persistent
//! key/value table so they can flip without a redeploy.
//!
//! ## Example
//!
//! ```toml
//! [database]
//! url = "sqlite://data/claims.db"
//!
//! [source]
//! mode = "both"
//!
//! [soap]
//! poll_fixed_delay_ms = 1800000
//!
//! [ame]
//! enabled = true
//! key_id = "k1"
//!
//! [ame.keystore]
//! kind = "keyring"
//! path = "secrets/keyring.json"
//! password_env = "CLAIMS_AME_PASSWORD"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use claims_pipeline_domain::IngestError;

/// Which fetch adapters the composition root constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    LocalFs,
    Dhpo,
    Both,
}

impl SourceMode {
    pub fn localfs_enabled(self) -> bool {
        matches!(self, SourceMode::LocalFs | SourceMode::Both)
    }

    pub fn dhpo_enabled(self) -> bool {
        matches!(self, SourceMode::Dhpo | SourceMode::Both)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Worker count; the orchestrator enforces a floor of 1.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Deadline a worker grants one item's stage chain before abandoning it.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_mode")]
    pub mode: SourceMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalFsConfig {
    #[serde(default = "default_ready_dir")]
    pub ready_dir: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    #[serde(default = "default_error_dir")]
    pub error_dir: PathBuf,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoapConfig {
    #[serde(default = "default_poll_delay_ms")]
    pub poll_fixed_delay_ms: u64,
    #[serde(default = "default_search_window_days")]
    pub search_window_days: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
    /// Cap on facilities polled in parallel within one tick.
    #[serde(default = "default_facility_concurrency")]
    pub facility_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    #[serde(default)]
    pub force_disk: bool,
    #[serde(default = "default_size_threshold")]
    pub size_threshold_bytes: u64,
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,
    #[serde(default = "default_ready_dir")]
    pub ready_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefDataConfig {
    /// Unknown codes are inserted into the reference tables on first sight.
    #[serde(default)]
    pub auto_insert: bool,
    /// Master switch; disabling skips resolution (and auditing) entirely.
    #[serde(default = "default_true")]
    pub bootstrap_enabled: bool,
}

/// Where the AME key-encryption key comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeystoreKind {
    /// A file holding exactly 32 raw key bytes.
    Raw,
    /// A JSON keyring mapping key ids to base64 keys.
    Keyring,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreConfig {
    #[serde(default = "default_keystore_kind")]
    pub kind: KeystoreKind,
    #[serde(default = "default_keystore_path")]
    pub path: PathBuf,
    /// Name of the environment variable holding the keyring passphrase.
    #[serde(default)]
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keystore: KeystoreConfig,
    #[serde(default = "default_key_id")]
    pub key_id: String,
    #[serde(default = "default_gcm_tag_bits")]
    pub gcm_tag_bits: u32,
    #[serde(default = "default_rotation_interval_ms")]
    pub rotation_interval_ms: u64,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            kind: default_keystore_kind(),
            path: default_keystore_path(),
            password_env: None,
        }
    }
}

/// Root configuration object.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub localfs: LocalFsConfig,
    #[serde(default)]
    pub soap: SoapConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub refdata: RefDataConfig,
    #[serde(default)]
    pub ame: AmeConfig,
}

macro_rules! section_default {
    ($ty:ty) => {
        impl Default for $ty {
            fn default() -> Self {
                // Deserializing an empty map applies every field default.
                serde_json::from_value(serde_json::json!({})).expect("section defaults are total")
            }
        }
    };
}

section_default!(DatabaseConfig);
section_default!(IngestionConfig);
section_default!(SourceConfig);
section_default!(LocalFsConfig);
section_default!(SoapConfig);
section_default!(StagingConfig);
section_default!(RefDataConfig);
section_default!(AmeConfig);
section_default!(AppConfig);

impl AppConfig {
    /// Loads configuration from defaults, an optional file, and environment
    /// overrides, then validates it.
    pub fn load(config_file: Option<&Path>) -> Result<Self, IngestError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("claims_pipeline").required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("CLAIMS_PIPELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| IngestError::invalid_config(format!("failed to load configuration: {e}")))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| IngestError::invalid_config(format!("failed to deserialize configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation beyond what serde can express.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.database.url.trim().is_empty() {
            return Err(IngestError::invalid_config("database.url must not be empty"));
        }
        if self.ingestion.queue_capacity == 0 {
            return Err(IngestError::invalid_config("ingestion.queue_capacity must be at least 1"));
        }
        if self.soap.page_size <= 0 {
            return Err(IngestError::invalid_config("soap.page_size must be positive"));
        }
        if self.soap.search_window_days <= 0 {
            return Err(IngestError::invalid_config("soap.search_window_days must be positive"));
        }
        if self.ame.enabled {
            if self.ame.key_id.trim().is_empty() {
                return Err(IngestError::invalid_config("ame.key_id must be set when AME is enabled"));
            }
            if !matches!(self.ame.gcm_tag_bits, 96 | 104 | 112 | 120 | 128) {
                return Err(IngestError::invalid_config(format!(
                    "ame.gcm_tag_bits must be a valid GCM tag size, got {}",
                    self.ame.gcm_tag_bits
                )));
            }
        }
        Ok(())
    }
}

fn default_database_url() -> String {
    "sqlite://data/claims.db".to_string()
}
fn default_max_connections() -> u32 {
    10
}
fn default_workers() -> usize {
    3
}
fn default_queue_capacity() -> usize {
    64
}
fn default_stage_timeout_ms() -> u64 {
    120_000
}
fn default_source_mode() -> SourceMode {
    SourceMode::LocalFs
}
fn default_ready_dir() -> PathBuf {
    PathBuf::from("data/ready")
}
fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}
fn default_error_dir() -> PathBuf {
    PathBuf::from("data/error")
}
fn default_sweep_interval_ms() -> u64 {
    10_000
}
fn default_poll_delay_ms() -> u64 {
    1_800_000
}
fn default_search_window_days() -> i64 {
    100
}
fn default_page_size() -> i32 {
    100
}
fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_transport_retries() -> u32 {
    3
}
fn default_facility_concurrency() -> usize {
    4
}
fn default_size_threshold() -> u64 {
    26_214_400
}
fn default_latency_threshold_ms() -> u64 {
    8_000
}
fn default_true() -> bool {
    true
}
fn default_keystore_kind() -> KeystoreKind {
    KeystoreKind::Raw
}
fn default_keystore_path() -> PathBuf {
    PathBuf::from("secrets/ame.key")
}
fn default_key_id() -> String {
    "k1".to_string()
}
fn default_gcm_tag_bits() -> u32 {
    128
}
fn default_rotation_interval_ms() -> u64 {
    86_400_000
}
