//! Bulk loading of raw JSON into the staging relations
//!
//! The loader does not transform anything. It describes each load
//! declaratively ([`BulkLoadDescriptor`]) and renders it for the warehouse's
//! bulk-copy capability: `COPY` on Redshift, `read_json` on DuckDB.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::statement::{Dialect, Relation, Statement, StatementKind, quote_ident, quote_literal};
use crate::warehouse::schema::{ColumnType, WarehouseSchema};

/// How the source encodes timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    EpochMillis,
}

/// Input format of a staging source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFormat {
    /// JSON objects whose keys match the column names
    JsonAuto,
    /// JSON mapped to columns through a JSONPaths file
    JsonPaths {
        mapping: String,
        time_format: TimeFormat,
        /// Let the warehouse re-analyse column compression during the load
        compression_update: bool,
    },
}

/// Everything the bulk-copy capability needs to fill one staging relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLoadDescriptor {
    pub target: Relation,
    /// Object-storage URI prefix, or a local path/glob for DuckDB
    pub source: String,
    /// Role the warehouse assumes to read the source
    pub authorization: Option<String>,
    pub region: String,
    pub format: InputFormat,
}

impl BulkLoadDescriptor {
    /// Render the load for a dialect
    pub fn to_statement(&self, dialect: Dialect) -> Statement {
        let sql = match dialect {
            Dialect::Redshift => self.redshift_copy(),
            Dialect::DuckDb => self.duckdb_insert(),
        };
        Statement::new(StatementKind::Copy, self.target, dialect, sql)
    }

    fn redshift_copy(&self) -> String {
        let mut sql = format!(
            "COPY {}\nFROM {}\nCREDENTIALS {}\nREGION {}",
            self.target.table_name(),
            quote_literal(&self.source),
            quote_literal(&format!(
                "aws_iam_role={}",
                self.authorization.as_deref().unwrap_or_default()
            )),
            quote_literal(&self.region),
        );

        match &self.format {
            InputFormat::JsonAuto => sql.push_str("\nJSON 'auto'"),
            InputFormat::JsonPaths {
                mapping,
                time_format,
                compression_update,
            } => {
                if !compression_update {
                    sql.push_str("\nCOMPUPDATE OFF");
                }
                sql.push_str(&format!("\nFORMAT AS JSON {}", quote_literal(mapping)));
                match time_format {
                    TimeFormat::EpochMillis => sql.push_str("\nTIMEFORMAT 'epochmillisecs'"),
                }
            }
        }

        sql
    }

    /// `read_json` maps fields by name, so the JSONPaths file is not needed.
    /// Every field is read as text, empty strings become null, and anything
    /// else that does not parse as the column type fails the statement.
    fn duckdb_insert(&self) -> String {
        let table = WarehouseSchema::table(self.target);

        let read_columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{}: 'VARCHAR'", quote_literal(c.name)))
            .collect();

        let projections: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let field = quote_ident(c.name);
                match c.ty {
                    ColumnType::Varchar => field,
                    ColumnType::Integer => format!("CAST(NULLIF({}, '') AS INTEGER)", field),
                    ColumnType::Float => format!("CAST(NULLIF({}, '') AS DOUBLE)", field),
                    ColumnType::Numeric => format!("CAST(NULLIF({}, '') AS NUMERIC(18,0))", field),
                }
            })
            .collect();

        let target_columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c.name)).collect();

        format!(
            "INSERT INTO {} ({})\nSELECT {}\nFROM read_json({}, format = 'auto', columns = {{{}}})",
            self.target.quoted(),
            target_columns.join(", "),
            projections.join(",\n       "),
            quote_literal(&self.source),
            read_columns.join(", "),
        )
    }
}

/// Loads both staging relations, events first
#[derive(Debug, Clone)]
pub struct StagingLoader {
    dialect: Dialect,
    descriptors: Vec<BulkLoadDescriptor>,
}

impl StagingLoader {
    /// Build the two load descriptors from the configuration
    pub fn new(config: &PipelineConfig) -> Self {
        let events = BulkLoadDescriptor {
            target: Relation::EventsStaging,
            source: config.sources.log_data.clone(),
            authorization: config.iam_role.arn.clone(),
            region: config.sources.region.clone(),
            format: InputFormat::JsonPaths {
                mapping: config.sources.log_jsonpath.clone().unwrap_or_default(),
                time_format: TimeFormat::EpochMillis,
                compression_update: false,
            },
        };

        let catalog = BulkLoadDescriptor {
            target: Relation::SongsStaging,
            source: config.sources.song_data.clone(),
            authorization: config.iam_role.arn.clone(),
            region: config.sources.region.clone(),
            format: InputFormat::JsonAuto,
        };

        Self {
            dialect: config.dialect(),
            descriptors: vec![events, catalog],
        }
    }

    pub fn descriptors(&self) -> &[BulkLoadDescriptor] {
        &self.descriptors
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.descriptors
            .iter()
            .map(|d| d.to_statement(self.dialect))
            .collect()
    }
}
