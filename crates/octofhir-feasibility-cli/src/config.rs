use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use octofhir_feasibility::EvaluationConfig;
use octofhir_query_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "feasibility.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fhir: FhirServerConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.fhir.validate()?;
        self.cache.validate()?;
        self.evaluation.validate()
    }

    /// Copy safe to print: credentials are masked.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.fhir.bearer_token.is_some() {
            cfg.fhir.bearer_token = Some("***".to_string());
        }
        cfg
    }
}

/// FHIR server answering the searches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// `_count` requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Timeout of one page request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl FhirServerConfig {
    fn validate(&self) -> Result<(), String> {
        Url::parse(&self.base_url).map_err(|e| format!("fhir.base_url is invalid: {e}"))?;
        if self.page_size == 0 {
            return Err("fhir.page_size must be positive".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("fhir.timeout_secs must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for FhirServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            bearer_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default = "default_mapping_file")]
    pub mapping_file: PathBuf,

    /// Concept expansion tree; without it concepts are searched as given
    #[serde(default)]
    pub tree_file: Option<PathBuf>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            mapping_file: default_mapping_file(),
            tree_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/fhir".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_mapping_file() -> PathBuf {
    PathBuf::from("mapping/term_code_mapping.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load the configuration: TOML file, then `FEASIBILITY__*` environment overrides.
///
/// An explicit `path` must exist; the default `feasibility.toml` is optional.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    use ::config::{Config, Environment, File};

    let mut builder = Config::builder();
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path));
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }
    }
    // e.g. FEASIBILITY__CACHE__DISK__TTL_SECS=60
    builder = builder.add_source(
        Environment::with_prefix("FEASIBILITY")
            .try_parsing(true)
            .separator("__"),
    );

    let cfg: AppConfig = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;
    cfg.validate().map_err(anyhow::Error::msg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn toml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file_with_defaults() {
        let file = toml_file(
            r#"
            [fhir]
            base_url = "https://fhir.example.org/fhir"
            page_size = 200

            [mapping]
            mapping_file = "/etc/feasibility/mapping.json"
            tree_file = "/etc/feasibility/tree.json"

            [cache.disk]
            ttl_secs = 3600
            "#,
        );

        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.fhir.base_url, "https://fhir.example.org/fhir");
        assert_eq!(cfg.fhir.page_size, 200);
        assert_eq!(cfg.fhir.timeout_secs, 60);
        assert_eq!(
            cfg.mapping.tree_file,
            Some(PathBuf::from("/etc/feasibility/tree.json"))
        );
        assert_eq!(cfg.cache.disk.ttl_secs, 3600);
        assert!(cfg.cache.memory.enabled);
        assert_eq!(cfg.evaluation.max_concurrent_queries, 32);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = toml_file(
            r#"
            [cache.memory]
            expire_after_write_secs = 60
            refresh_after_write_secs = 120
            "#,
        );
        assert!(load_config(Some(file.path())).is_err());

        let file = toml_file("[fhir]\nbase_url = \"not a url\"\n");
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/feasibility.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_redacted_masks_token() {
        let mut cfg = AppConfig::default();
        cfg.fhir.bearer_token = Some("secret".to_string());
        assert_eq!(cfg.redacted().fhir.bearer_token.as_deref(), Some("***"));
        assert!(AppConfig::default().redacted().fhir.bearer_token.is_none());
    }
}
