//! Full-refresh load pipeline
//!
//! Stages run strictly in order against one warehouse connection:
//!
//! ```text
//! PENDING -> RESET -> STAGE_LOAD -> DIMENSION_LOAD -> FACT_LOAD -> DONE
//!                \-> DONE (reset only)
//! ```
//!
//! Any non-terminal stage can move to `FAILED`. Each statement commits on its
//! own; a failure aborts the remaining statements and leaves committed ones in
//! place.

pub mod dimensions;
pub mod facts;
pub mod quality;
pub mod schema;
pub mod staging;

pub use dimensions::DimensionExtractor;
pub use facts::FactBuilder;
pub use quality::{DataQualityReport, ProbeKind};
pub use schema::SchemaManager;
pub use staging::{BulkLoadDescriptor, InputFormat, StagingLoader, TimeFormat};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::statement::Statement;
use crate::warehouse::{WarehouseBackend, WarehouseError};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStage {
    /// Created, nothing executed yet
    #[default]
    Pending,
    /// Dropping and recreating every relation
    Reset,
    /// Bulk-loading the staging relations
    StageLoad,
    /// Filling users, songs, artists and time
    DimensionLoad,
    /// Filling songplays
    FactLoad,
    Done,
    Failed,
}

impl LoadStage {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(target, Self::Reset | Self::StageLoad | Self::Failed),
            Self::Reset => matches!(target, Self::StageLoad | Self::Done | Self::Failed),
            Self::StageLoad => matches!(target, Self::DimensionLoad | Self::Failed),
            Self::DimensionLoad => matches!(target, Self::FactLoad | Self::Failed),
            Self::FactLoad => matches!(target, Self::Done | Self::Failed),
            Self::Done | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Reset => write!(f, "RESET"),
            Self::StageLoad => write!(f, "STAGE_LOAD"),
            Self::DimensionLoad => write!(f, "DIMENSION_LOAD"),
            Self::FactLoad => write!(f, "FACT_LOAD"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Which part of the pipeline a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPlan {
    /// Drop and recreate every relation
    ResetOnly,
    /// Stage, then fill dimensions and facts into an existing schema
    LoadOnly,
    /// Reset followed by the load
    Full,
}

impl RunPlan {
    /// Stages the plan walks through before `DONE`
    pub fn stages(&self) -> &'static [LoadStage] {
        match self {
            RunPlan::ResetOnly => &[LoadStage::Reset],
            RunPlan::LoadOnly => &[
                LoadStage::StageLoad,
                LoadStage::DimensionLoad,
                LoadStage::FactLoad,
            ],
            RunPlan::Full => &[
                LoadStage::Reset,
                LoadStage::StageLoad,
                LoadStage::DimensionLoad,
                LoadStage::FactLoad,
            ],
        }
    }

    fn loads(&self) -> bool {
        !matches!(self, RunPlan::ResetOnly)
    }
}

impl std::fmt::Display for RunPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPlan::ResetOnly => write!(f, "reset"),
            RunPlan::LoadOnly => write!(f, "load"),
            RunPlan::Full => write!(f, "full"),
        }
    }
}

/// Error type for pipeline runs
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The warehouse could not be reached
    #[error("Connectivity error during {stage}: {message}")]
    Connectivity { stage: LoadStage, message: String },

    /// A statement was rejected; the run stopped there
    #[error("{stage}: statement '{label}' failed: {message}")]
    Statement {
        stage: LoadStage,
        label: String,
        message: String,
    },

    /// Illegal stage change
    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: LoadStage, to: LoadStage },

    /// Configuration does not fit the run
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stage the run was in when it failed, if any statement ran
    pub fn stage(&self) -> Option<LoadStage> {
        match self {
            PipelineError::Connectivity { stage, .. } | PipelineError::Statement { stage, .. } => {
                Some(*stage)
            }
            PipelineError::InvalidTransition { from, .. } => Some(*from),
            PipelineError::Config(_) => None,
        }
    }

    fn from_warehouse(stage: LoadStage, statement: &Statement, error: WarehouseError) -> Self {
        match error {
            WarehouseError::ConnectionFailed(message) => {
                PipelineError::Connectivity { stage, message }
            }
            WarehouseError::StatementFailed { label, message } => PipelineError::Statement {
                stage,
                label,
                message,
            },
            other => PipelineError::Statement {
                stage,
                label: statement.label(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;

/// One executed statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOutcome {
    pub stage: LoadStage,
    pub label: String,
    pub rows_affected: u64,
    pub elapsed_ms: u64,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub plan: RunPlan,
    pub final_stage: LoadStage,
    pub started_at: DateTime<Utc>,
    pub statements: Vec<StatementOutcome>,
    pub duration_ms: u64,
    /// Present when quality checks ran
    pub data_quality: Option<DataQualityReport>,
}

impl RunReport {
    /// Rows affected by the statements carrying `label`, e.g. `insert users`
    pub fn rows_loaded(&self, label: &str) -> u64 {
        self.statements
            .iter()
            .filter(|s| s.label == label)
            .map(|s| s.rows_affected)
            .sum()
    }
}

/// Runs the pipeline against one warehouse connection
///
/// The orchestrator is consumed by a run and closes the connection whichever
/// way the run ends. There is no locking against other runs: run at most one
/// instance at a time against the same warehouse.
pub struct LoadOrchestrator {
    backend: Box<dyn WarehouseBackend>,
    config: PipelineConfig,
    run_id: Uuid,
    stage: LoadStage,
    outcomes: Vec<StatementOutcome>,
}

impl LoadOrchestrator {
    pub fn new(backend: Box<dyn WarehouseBackend>, config: PipelineConfig) -> Self {
        Self {
            backend,
            config,
            run_id: Uuid::new_v4(),
            stage: LoadStage::Pending,
            outcomes: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    /// Drop and recreate every relation
    pub async fn reset_schema(self) -> PipelineResult<RunReport> {
        self.run(RunPlan::ResetOnly).await
    }

    /// Stage the sources and fill the warehouse relations
    pub async fn run_load(self) -> PipelineResult<RunReport> {
        self.run(RunPlan::LoadOnly).await
    }

    /// Reset, then load
    pub async fn run_full(self) -> PipelineResult<RunReport> {
        self.run(RunPlan::Full).await
    }

    /// Execute a plan and close the connection
    pub async fn run(mut self, plan: RunPlan) -> PipelineResult<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            "Starting {} run {} on {} warehouse",
            plan,
            self.run_id,
            self.backend.backend_type()
        );

        let result = self.execute_plan(plan).await;

        if let Err(e) = &result {
            tracing::error!("Run {} failed: {}", self.run_id, e);
            if !self.stage.is_terminal() {
                self.stage = LoadStage::Failed;
            }
        }

        if let Err(e) = self.backend.close().await {
            tracing::warn!("Failed to close warehouse connection: {}", e);
        }

        let data_quality = result?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Run {} finished in {} ms ({} statements)",
            self.run_id,
            duration_ms,
            self.outcomes.len()
        );

        Ok(RunReport {
            run_id: self.run_id,
            plan,
            final_stage: self.stage,
            started_at,
            statements: self.outcomes,
            duration_ms,
            data_quality,
        })
    }

    async fn execute_plan(&mut self, plan: RunPlan) -> PipelineResult<Option<DataQualityReport>> {
        let dialect = self.config.dialect();
        if dialect != self.backend.dialect() {
            return Err(PipelineError::Config(format!(
                "configured backend speaks {}, connection speaks {}",
                dialect,
                self.backend.dialect()
            )));
        }
        if plan.loads() {
            self.config
                .validate()
                .map_err(|e| PipelineError::Config(e.to_string()))?;
        }

        for &stage in plan.stages() {
            self.transition(stage)?;
            let statements = self.statements_for(stage);
            tracing::info!("{}: {} statements", stage, statements.len());
            for statement in &statements {
                self.execute_statement(statement).await?;
            }
        }

        let data_quality = if plan.loads() && self.config.load.quality_checks {
            Some(quality::run_probes(&*self.backend, self.config.load.unmatched_plays).await)
        } else {
            None
        };

        self.transition(LoadStage::Done)?;
        Ok(data_quality)
    }

    fn statements_for(&self, stage: LoadStage) -> Vec<Statement> {
        let dialect = self.config.dialect();
        match stage {
            LoadStage::Reset => SchemaManager::new(dialect).reset_statements(),
            LoadStage::StageLoad => StagingLoader::new(&self.config).statements(),
            LoadStage::DimensionLoad => DimensionExtractor::new(dialect).statements(),
            LoadStage::FactLoad => {
                let facts = FactBuilder::new(dialect, self.config.load.unmatched_plays);
                tracing::debug!("Unmatched plays: {:?}", facts.unmatched_policy());
                facts.statements()
            }
            LoadStage::Pending | LoadStage::Done | LoadStage::Failed => Vec::new(),
        }
    }

    fn transition(&mut self, to: LoadStage) -> PipelineResult<()> {
        if !self.stage.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        tracing::debug!("Run {}: {} -> {}", self.run_id, self.stage, to);
        self.stage = to;
        Ok(())
    }

    async fn execute_statement(&mut self, statement: &Statement) -> PipelineResult<()> {
        let label = statement.label();
        tracing::debug!("Executing {}:\n{}", label, statement.sql);

        let start = Instant::now();
        let rows_affected = self
            .backend
            .execute(statement)
            .await
            .map_err(|e| PipelineError::from_warehouse(self.stage, statement, e))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!("{}: {} ({} rows, {} ms)", self.stage, label, rows_affected, elapsed_ms);

        self.outcomes.push(StatementOutcome {
            stage: self.stage,
            label,
            rows_affected,
            elapsed_ms,
        });
        Ok(())
    }
}
