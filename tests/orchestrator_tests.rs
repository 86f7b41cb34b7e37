//! Orchestrator sequencing tests with a scripted warehouse

use async_trait::async_trait;
use songplay_warehouse::config::PipelineConfig;
use songplay_warehouse::pipeline::{LoadOrchestrator, LoadStage, PipelineError, RunPlan};
use songplay_warehouse::statement::{Dialect, Statement};
use songplay_warehouse::warehouse::{
    QueryResult, WarehouseBackend, WarehouseError, WarehouseResult,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Journal {
    executed: Vec<String>,
    queries: usize,
    closed: bool,
}

/// Records every call and fails on one statement label
struct ScriptedWarehouse {
    dialect: Dialect,
    fail_on: Option<(&'static str, fn(String) -> WarehouseError)>,
    journal: Arc<Mutex<Journal>>,
}

impl ScriptedWarehouse {
    fn new(dialect: Dialect) -> (Self, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        (
            Self {
                dialect,
                fail_on: None,
                journal: journal.clone(),
            },
            journal,
        )
    }

    fn failing_on(
        mut self,
        label: &'static str,
        error: fn(String) -> WarehouseError,
    ) -> Self {
        self.fail_on = Some((label, error));
        self
    }
}

#[async_trait(?Send)]
impl WarehouseBackend for ScriptedWarehouse {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, statement: &Statement) -> WarehouseResult<u64> {
        let label = statement.label();
        if let Some((fail_label, error)) = self.fail_on
            && fail_label == label
        {
            return Err(error(label));
        }
        self.journal.lock().unwrap().executed.push(label);
        Ok(1)
    }

    async fn query(&self, _sql: &str) -> WarehouseResult<QueryResult> {
        self.journal.lock().unwrap().queries += 1;
        Ok(QueryResult::new(
            vec!["n".to_string()],
            vec![serde_json::json!({"n": 0})],
        ))
    }

    async fn health_check(&self) -> WarehouseResult<bool> {
        Ok(true)
    }

    fn backend_type(&self) -> &'static str {
        "scripted"
    }

    async fn close(&self) -> WarehouseResult<()> {
        self.journal.lock().unwrap().closed = true;
        Ok(())
    }
}

fn statement_failure(label: String) -> WarehouseError {
    WarehouseError::StatementFailed {
        label,
        message: "permission denied".to_string(),
    }
}

fn connection_lost(_label: String) -> WarehouseError {
    WarehouseError::ConnectionFailed("server closed the connection".to_string())
}

fn config() -> PipelineConfig {
    PipelineConfig::duckdb("warehouse.duckdb", "songs/*.json", "logs/*.json")
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_full_run_statement_order() {
    runtime().block_on(async {
        let (warehouse, journal) = ScriptedWarehouse::new(Dialect::DuckDb);
        let report = LoadOrchestrator::new(Box::new(warehouse), config())
            .run_full()
            .await
            .unwrap();

        let journal = journal.lock().unwrap();
        let executed = &journal.executed;
        let tail: Vec<&str> = executed[executed.len() - 7..]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(
            tail,
            vec![
                "copy events_staging",
                "copy songs_staging",
                "insert users",
                "insert songs",
                "insert artists",
                "insert time",
                "insert songplays",
            ]
        );
        assert_eq!(executed[0], "drop events_staging");
        assert!(journal.closed);
        assert_eq!(journal.queries, 4);

        assert_eq!(report.final_stage, LoadStage::Done);
        assert_eq!(report.statements.len(), executed.len());
        assert_eq!(report.statements.last().unwrap().stage, LoadStage::FactLoad);
    });
}

#[test]
fn test_failure_stops_remaining_statements_and_closes() {
    runtime().block_on(async {
        let (warehouse, journal) = ScriptedWarehouse::new(Dialect::DuckDb);
        let warehouse = warehouse.failing_on("insert artists", statement_failure);

        let err = LoadOrchestrator::new(Box::new(warehouse), config())
            .run_full()
            .await
            .unwrap_err();

        match err {
            PipelineError::Statement {
                stage,
                label,
                message,
            } => {
                assert_eq!(stage, LoadStage::DimensionLoad);
                assert_eq!(label, "insert artists");
                assert_eq!(message, "permission denied");
            }
            other => panic!("unexpected error: {}", other),
        }

        let journal = journal.lock().unwrap();
        assert!(journal.closed);
        assert!(journal.executed.contains(&"insert songs".to_string()));
        assert!(!journal.executed.contains(&"insert time".to_string()));
        assert!(!journal.executed.contains(&"insert songplays".to_string()));
        assert_eq!(journal.queries, 0, "probes never run after a failure");
    });
}

#[test]
fn test_lost_connection_is_connectivity_error() {
    runtime().block_on(async {
        let (warehouse, journal) = ScriptedWarehouse::new(Dialect::DuckDb);
        let warehouse = warehouse.failing_on("copy events_staging", connection_lost);

        let err = LoadOrchestrator::new(Box::new(warehouse), config())
            .run_load()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Connectivity {
                stage: LoadStage::StageLoad,
                ..
            }
        ));
        assert!(journal.lock().unwrap().executed.is_empty());
        assert!(journal.lock().unwrap().closed);
    });
}

#[test]
fn test_reset_only_runs_ddl() {
    runtime().block_on(async {
        let (warehouse, journal) = ScriptedWarehouse::new(Dialect::Redshift);
        let mut config = PipelineConfig::new();
        config.load.quality_checks = true;

        let report = LoadOrchestrator::new(Box::new(warehouse), config)
            .reset_schema()
            .await
            .unwrap();

        assert_eq!(report.plan, RunPlan::ResetOnly);
        assert_eq!(report.statements.len(), 14);
        assert!(report.data_quality.is_none());

        let journal = journal.lock().unwrap();
        assert!(
            journal
                .executed
                .iter()
                .all(|l| l.starts_with("drop ") || l.starts_with("create "))
        );
        assert_eq!(journal.queries, 0);
    });
}

#[test]
fn test_dialect_mismatch_rejected_before_any_statement() {
    runtime().block_on(async {
        let (warehouse, journal) = ScriptedWarehouse::new(Dialect::Redshift);
        let err = LoadOrchestrator::new(Box::new(warehouse), config())
            .run_full()
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Config(_)));
        let journal = journal.lock().unwrap();
        assert!(journal.executed.is_empty());
        assert!(journal.closed);
    });
}

#[test]
fn test_load_validates_configuration() {
    runtime().block_on(async {
        let (warehouse, journal) = ScriptedWarehouse::new(Dialect::Redshift);
        // Redshift without host, role or sources
        let err = LoadOrchestrator::new(Box::new(warehouse), PipelineConfig::new())
            .run_load()
            .await
            .unwrap_err();

        match err {
            PipelineError::Config(message) => {
                assert!(message.contains("iam_role.arn"));
                assert!(message.contains("sources.log_data"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(journal.lock().unwrap().closed);
    });
}
