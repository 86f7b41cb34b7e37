//! reset-schema, run-load and run commands

use std::path::PathBuf;

use super::{load_config, open_warehouse, runtime};
use crate::cli::error::CliError;
use crate::pipeline::{LoadOrchestrator, RunPlan, RunReport};

/// Arguments shared by the pipeline commands
#[derive(Debug, Clone)]
pub struct PipelineArgs {
    /// Path to the configuration file
    pub config: PathBuf,
}

/// Drop and recreate every relation
pub fn handle_reset_schema(args: &PipelineArgs) -> Result<(), CliError> {
    execute(args, RunPlan::ResetOnly)
}

/// Stage the sources and fill dimensions and facts
pub fn handle_run_load(args: &PipelineArgs) -> Result<(), CliError> {
    execute(args, RunPlan::LoadOnly)
}

/// Reset, then load
pub fn handle_run(args: &PipelineArgs) -> Result<(), CliError> {
    execute(args, RunPlan::Full)
}

fn execute(args: &PipelineArgs, plan: RunPlan) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let rt = runtime()?;

    let report = rt.block_on(async {
        let backend = open_warehouse(&config).await?;
        let report = LoadOrchestrator::new(backend, config).run(plan).await?;
        Ok::<_, CliError>(report)
    })?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    for outcome in &report.statements {
        println!(
            "  {:<15} {:<24} {:>10} rows {:>8} ms",
            outcome.stage.to_string(),
            outcome.label,
            outcome.rows_affected,
            outcome.elapsed_ms
        );
    }

    if let Some(quality) = &report.data_quality {
        for finding in quality.findings.iter().filter(|f| f.count > 0) {
            println!("  ! {}", finding.message);
        }
        for error in &quality.errors {
            println!("  ! probe failed: {}", error);
        }
    }

    println!(
        "Run {} ({}) finished: {} in {} ms",
        report.run_id, report.plan, report.final_stage, report.duration_ms
    );
}
