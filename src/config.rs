//! Pipeline configuration file support
//!
//! Handles parsing of `warehouse.toml` configuration files and environment
//! variable overrides. The loaded [`PipelineConfig`] is handed to the
//! orchestrator explicitly; nothing in the crate reads it from global state.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::statement::Dialect;
use crate::warehouse::{WarehouseError, WarehouseResult};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "warehouse.toml";

/// Default DuckDB database filename
pub const DEFAULT_DUCKDB_FILENAME: &str = "warehouse.duckdb";

/// Default AWS region for bulk loads and provisioning
pub const DEFAULT_REGION: &str = "us-west-2";

/// Environment variable for the warehouse backend
pub const ENV_WAREHOUSE_BACKEND: &str = "SONGPLAY_WAREHOUSE_BACKEND";

/// Environment variable for the warehouse host
pub const ENV_DB_HOST: &str = "SONGPLAY_DB_HOST";

/// Environment variable for the warehouse password
pub const ENV_DB_PASSWORD: &str = "SONGPLAY_DB_PASSWORD";

/// Environment variable for the DuckDB path
pub const ENV_DUCKDB_PATH: &str = "SONGPLAY_DUCKDB_PATH";

/// Environment variable for the bulk-load IAM role
pub const ENV_IAM_ROLE_ARN: &str = "SONGPLAY_IAM_ROLE_ARN";

/// Warehouse backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackendType {
    /// Redshift cluster over the PostgreSQL protocol (default)
    #[default]
    Redshift,
    /// Local DuckDB file
    DuckDB,
}

impl WarehouseBackendType {
    /// SQL dialect statements must be rendered in
    pub fn dialect(&self) -> Dialect {
        match self {
            WarehouseBackendType::Redshift => Dialect::Redshift,
            WarehouseBackendType::DuckDB => Dialect::DuckDb,
        }
    }
}

impl std::str::FromStr for WarehouseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redshift" | "postgres" | "postgresql" => Ok(WarehouseBackendType::Redshift),
            "duckdb" => Ok(WarehouseBackendType::DuckDB),
            _ => Err(format!(
                "Unknown warehouse backend: {}. Use 'redshift' or 'duckdb'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for WarehouseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarehouseBackendType::Redshift => write!(f, "redshift"),
            WarehouseBackendType::DuckDB => write!(f, "duckdb"),
        }
    }
}

/// Warehouse connection section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSection {
    #[serde(default)]
    pub backend: WarehouseBackendType,

    /// Cluster endpoint (Redshift)
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Path to the DuckDB database file
    #[serde(default = "default_duckdb_path")]
    pub duckdb_path: String,
}

fn default_port() -> u16 {
    5439
}

fn default_db_name() -> String {
    "dwh".to_string()
}

fn default_user() -> String {
    "dwhuser".to_string()
}

fn default_duckdb_path() -> String {
    DEFAULT_DUCKDB_FILENAME.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            backend: WarehouseBackendType::default(),
            host: None,
            port: default_port(),
            db_name: default_db_name(),
            user: default_user(),
            password: None,
            duckdb_path: default_duckdb_path(),
        }
    }
}

/// Source data locations
///
/// For Redshift these are object-storage URI prefixes; for DuckDB they are
/// local paths or globs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesSection {
    #[serde(default)]
    pub song_data: String,

    #[serde(default)]
    pub log_data: String,

    /// JSONPaths mapping file for the event logs (Redshift only)
    #[serde(default)]
    pub log_jsonpath: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            song_data: String::new(),
            log_data: String::new(),
            log_jsonpath: None,
            region: default_region(),
        }
    }
}

/// Role the warehouse assumes to read the sources
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IamRoleSection {
    #[serde(default)]
    pub arn: Option<String>,
}

/// What to do with play events that match no catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPlays {
    /// Exclude them from `songplays` (inner join)
    #[default]
    Drop,
    /// Keep them with null song_id/artist_id (left join)
    Retain,
}

impl std::str::FromStr for UnmatchedPlays {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(UnmatchedPlays::Drop),
            "retain" => Ok(UnmatchedPlays::Retain),
            _ => Err(format!(
                "Unknown unmatched play policy: {}. Use 'drop' or 'retain'.",
                s
            )),
        }
    }
}

/// Load behaviour section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSection {
    #[serde(default)]
    pub unmatched_plays: UnmatchedPlays,

    /// Run the staging data-quality probes after the fact load
    #[serde(default = "default_quality_checks")]
    pub quality_checks: bool,
}

fn default_quality_checks() -> bool {
    true
}

impl Default for LoadSection {
    fn default() -> Self {
        Self {
            unmatched_plays: UnmatchedPlays::default(),
            quality_checks: default_quality_checks(),
        }
    }
}

/// Cluster and role provisioning section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSection {
    #[serde(default)]
    pub cluster_identifier: String,

    #[serde(default)]
    pub iam_role_name: String,

    #[serde(default = "default_cluster_type")]
    pub cluster_type: String,

    #[serde(default = "default_node_type")]
    pub node_type: String,

    #[serde(default = "default_num_nodes")]
    pub num_nodes: i32,

    #[serde(default = "default_region")]
    pub region: String,

    /// Access key; the default credential chain is used when unset
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub secret: Option<String>,
}

fn default_cluster_type() -> String {
    "multi-node".to_string()
}

fn default_node_type() -> String {
    "dc2.large".to_string()
}

fn default_num_nodes() -> i32 {
    4
}

impl Default for ProvisioningSection {
    fn default() -> Self {
        Self {
            cluster_identifier: String::new(),
            iam_role_name: String::new(),
            cluster_type: default_cluster_type(),
            node_type: default_node_type(),
            num_nodes: default_num_nodes(),
            region: default_region(),
            key: None,
            secret: None,
        }
    }
}

/// Main configuration structure
///
/// Represents the `warehouse.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub sources: SourcesSection,

    #[serde(default)]
    pub iam_role: IamRoleSection,

    #[serde(default)]
    pub load: LoadSection,

    #[serde(default)]
    pub provisioning: ProvisioningSection,
}

impl PipelineConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DuckDB configuration reading local JSON sources
    pub fn duckdb(
        path: impl Into<String>,
        song_data: impl Into<String>,
        log_data: impl Into<String>,
    ) -> Self {
        Self {
            warehouse: WarehouseSection {
                backend: WarehouseBackendType::DuckDB,
                duckdb_path: path.into(),
                ..Default::default()
            },
            sources: SourcesSection {
                song_data: song_data.into(),
                log_data: log_data.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn load(path: &Path) -> WarehouseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WarehouseError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> WarehouseResult<Self> {
        toml::from_str(content)
            .map_err(|e| WarehouseError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> WarehouseResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            WarehouseError::SerializationError(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var(ENV_WAREHOUSE_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.warehouse.backend = backend_type;
        }

        if let Ok(host) = std::env::var(ENV_DB_HOST) {
            self.warehouse.host = Some(host);
        }

        if let Ok(password) = std::env::var(ENV_DB_PASSWORD) {
            self.warehouse.password = Some(password);
        }

        if let Ok(path) = std::env::var(ENV_DUCKDB_PATH) {
            self.warehouse.duckdb_path = path;
        }

        if let Ok(arn) = std::env::var(ENV_IAM_ROLE_ARN) {
            self.iam_role.arn = Some(arn);
        }
    }

    /// Dialect of the configured backend
    pub fn dialect(&self) -> Dialect {
        self.warehouse.backend.dialect()
    }

    /// Check that the fields a load against the configured backend needs are set
    pub fn validate(&self) -> WarehouseResult<()> {
        let mut missing = Vec::new();

        if self.sources.song_data.trim().is_empty() {
            missing.push("sources.song_data");
        }
        if self.sources.log_data.trim().is_empty() {
            missing.push("sources.log_data");
        }

        match self.warehouse.backend {
            WarehouseBackendType::Redshift => {
                if self.warehouse.host.as_deref().is_none_or(str::is_empty) {
                    missing.push("warehouse.host");
                }
                if self.iam_role.arn.as_deref().is_none_or(str::is_empty) {
                    missing.push("iam_role.arn");
                }
                if self.sources.log_jsonpath.as_deref().is_none_or(str::is_empty) {
                    missing.push("sources.log_jsonpath");
                }
            }
            WarehouseBackendType::DuckDB => {
                if self.warehouse.duckdb_path.trim().is_empty() {
                    missing.push("warehouse.duckdb_path");
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(WarehouseError::ConfigError(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# songplay-warehouse configuration

[warehouse]
# Warehouse backend: "redshift" (default) or "duckdb"
backend = "redshift"
host = "dwhcluster.example.us-west-2.redshift.amazonaws.com"
port = 5439
db_name = "dwh"
user = "dwhuser"
# password = "..."   # or SONGPLAY_DB_PASSWORD

[sources]
song_data = "s3://udacity-dend/song_data"
log_data = "s3://udacity-dend/log_data"
log_jsonpath = "s3://udacity-dend/log_json_path.json"
region = "us-west-2"

[iam_role]
# arn = "arn:aws:iam::123456789012:role/dwhRole"

[load]
# "drop" excludes plays without a catalog match, "retain" keeps them with null keys
unmatched_plays = "drop"
quality_checks = true

[provisioning]
cluster_identifier = "dwhCluster"
iam_role_name = "dwhRole"
cluster_type = "multi-node"
node_type = "dc2.large"
num_nodes = 4
region = "us-west-2"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.warehouse.backend, WarehouseBackendType::Redshift);
        assert_eq!(config.warehouse.port, 5439);
        assert_eq!(config.sources.region, "us-west-2");
        assert_eq!(config.load.unmatched_plays, UnmatchedPlays::Drop);
        assert!(config.load.quality_checks);
    }

    #[test]
    fn test_parse_sample_config() {
        let config = PipelineConfig::parse(sample_config()).unwrap();
        assert_eq!(config.warehouse.backend, WarehouseBackendType::Redshift);
        assert_eq!(config.warehouse.db_name, "dwh");
        assert_eq!(config.sources.log_data, "s3://udacity-dend/log_data");
        assert_eq!(config.provisioning.num_nodes, 4);
        assert_eq!(config.dialect(), Dialect::Redshift);
    }

    #[test]
    fn test_parse_duckdb_retain() {
        let toml = r#"
[warehouse]
backend = "duckdb"
duckdb_path = "/tmp/dwh.duckdb"

[sources]
song_data = "data/song_data/**/*.json"
log_data = "data/log_data/*.json"

[load]
unmatched_plays = "retain"
"#;
        let config = PipelineConfig::parse(toml).unwrap();
        assert_eq!(config.warehouse.backend, WarehouseBackendType::DuckDB);
        assert_eq!(config.load.unmatched_plays, UnmatchedPlays::Retain);
        assert_eq!(config.dialect(), Dialect::DuckDb);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_redshift_settings() {
        let config = PipelineConfig::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sources.song_data"));
        assert!(err.contains("warehouse.host"));
        assert!(err.contains("iam_role.arn"));
        assert!(err.contains("sources.log_jsonpath"));
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!(
            "duckdb".parse::<WarehouseBackendType>().unwrap(),
            WarehouseBackendType::DuckDB
        );
        assert_eq!(
            "Redshift".parse::<WarehouseBackendType>().unwrap(),
            WarehouseBackendType::Redshift
        );
        assert!("mysql".parse::<WarehouseBackendType>().is_err());
        assert!("keep".parse::<UnmatchedPlays>().is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_policy() {
        let mut config = PipelineConfig::duckdb("dwh.duckdb", "songs/*.json", "logs/*.json");
        config.load.unmatched_plays = UnmatchedPlays::Retain;
        let parsed = PipelineConfig::parse(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.load.unmatched_plays, UnmatchedPlays::Retain);
        assert_eq!(parsed.sources.log_data, "logs/*.json");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = PipelineConfig::load(Path::new("/nonexistent/warehouse.toml")).unwrap_err();
        assert!(matches!(err, WarehouseError::IoError(_)));
    }
}
