//! Songplay Warehouse - full-refresh star-schema loader
//!
//! Moves a song catalog and application play-event logs from object storage
//! into a star schema:
//! - Staging relations filled by the warehouse's bulk copy
//! - Dimensions: users, songs, artists, time
//! - Fact: songplays
//!
//! Every run drops and rebuilds everything. Statements execute one at a time
//! over a single connection.

pub mod config;
pub mod models;
pub mod pipeline;
pub mod provision;
pub mod statement;
pub mod warehouse;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use config::{PipelineConfig, UnmatchedPlays, WarehouseBackendType};
pub use models::{
    ArtistRow, SongRow, SongplayRow, StagingCatalogEntry, StagingEvent, TimeParts, TimeRow,
    UserRow,
};
pub use pipeline::{
    LoadOrchestrator, LoadStage, PipelineError, PipelineResult, RunPlan, RunReport,
    StatementOutcome,
};
pub use provision::{ProvisionError, ProvisionStep, Provisioner, StepOutcome};
pub use statement::{Dialect, Relation, Statement, StatementKind};
pub use warehouse::{QueryResult, WarehouseBackend, WarehouseError, WarehouseResult};

#[cfg(feature = "duckdb-backend")]
pub use warehouse::DuckDbWarehouse;
#[cfg(feature = "postgres-backend")]
pub use warehouse::PostgresWarehouse;
