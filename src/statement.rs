//! Typed statement catalog
//!
//! Every piece of SQL the pipeline sends to the warehouse is a [`Statement`]:
//! rendered once from parameters, tagged with what it does and which relation
//! it touches. Nothing executes a bare string.

use serde::{Deserialize, Serialize};

/// SQL flavour a statement is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Amazon Redshift (the production warehouse)
    #[default]
    Redshift,
    /// Embedded DuckDB (local runs and tests)
    DuckDb,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Redshift => write!(f, "redshift"),
            Dialect::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// What a statement does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Drop,
    Create,
    Copy,
    Insert,
    Probe,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementKind::Drop => write!(f, "drop"),
            StatementKind::Create => write!(f, "create"),
            StatementKind::Copy => write!(f, "copy"),
            StatementKind::Insert => write!(f, "insert"),
            StatementKind::Probe => write!(f, "probe"),
        }
    }
}

/// The seven relations of the warehouse
///
/// [`Relation::ALL`] lists them in the fixed order used for both drop and
/// create: staging first, then the fact table, then the dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    EventsStaging,
    SongsStaging,
    Songplays,
    Users,
    Songs,
    Artists,
    Time,
}

impl Relation {
    pub const ALL: [Relation; 7] = [
        Relation::EventsStaging,
        Relation::SongsStaging,
        Relation::Songplays,
        Relation::Users,
        Relation::Songs,
        Relation::Artists,
        Relation::Time,
    ];

    pub const STAGING: [Relation; 2] = [Relation::EventsStaging, Relation::SongsStaging];

    /// Table name in the warehouse
    pub fn table_name(&self) -> &'static str {
        match self {
            Relation::EventsStaging => "events_staging",
            Relation::SongsStaging => "songs_staging",
            Relation::Songplays => "songplays",
            Relation::Users => "users",
            Relation::Songs => "songs",
            Relation::Artists => "artists",
            Relation::Time => "time",
        }
    }

    /// Table name quoted as an identifier (`time` is a keyword in both dialects)
    pub fn quoted(&self) -> String {
        quote_ident(self.table_name())
    }

    pub fn is_staging(&self) -> bool {
        matches!(self, Relation::EventsStaging | Relation::SongsStaging)
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// A single SQL statement ready to execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub relation: Relation,
    pub dialect: Dialect,
    pub sql: String,
}

impl Statement {
    pub fn new(
        kind: StatementKind,
        relation: Relation,
        dialect: Dialect,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            relation,
            dialect,
            sql: sql.into(),
        }
    }

    /// Short human-readable label, e.g. `insert users`
    pub fn label(&self) -> String {
        format!("{} {}", self.kind, self.relation)
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier, doubling embedded double quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
