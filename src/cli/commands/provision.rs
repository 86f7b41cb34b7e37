//! provision and teardown commands

use std::path::PathBuf;

use super::load_config;
use crate::cli::error::CliError;
#[cfg(feature = "aws")]
use crate::provision::{self, AwsProvisioner, ProvisionReport, StepOutcome};

/// Provisioning command arguments
#[derive(Debug, Clone)]
pub struct ProvisionArgs {
    /// Path to the configuration file
    pub config: PathBuf,
}

/// Create the role and the cluster
#[cfg(feature = "aws")]
pub fn handle_provision(args: &ProvisionArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let rt = super::runtime()?;

    let report = rt.block_on(async {
        let provisioner = AwsProvisioner::connect(&config.provisioning).await;
        provision::provision(&provisioner, &config).await
    })?;

    print_steps(&report);
    if let Some(arn) = &report.role_arn {
        println!("Set [iam_role] arn = \"{}\" before running a load", arn);
    }
    Ok(())
}

/// Delete the cluster and the role
#[cfg(feature = "aws")]
pub fn handle_teardown(args: &ProvisionArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let rt = super::runtime()?;

    let report = rt.block_on(async {
        let provisioner = AwsProvisioner::connect(&config.provisioning).await;
        provision::teardown(&provisioner, &config).await
    })?;

    print_steps(&report);
    Ok(())
}

#[cfg(feature = "aws")]
fn print_steps(report: &ProvisionReport) {
    for (step, outcome) in &report.steps {
        let status = match outcome {
            StepOutcome::Applied => "done",
            StepOutcome::AlreadySatisfied => "already in place",
        };
        println!("  {:<16} {}", step.to_string(), status);
    }
}

#[cfg(not(feature = "aws"))]
pub fn handle_provision(args: &ProvisionArgs) -> Result<(), CliError> {
    load_config(&args.config)?;
    Err(aws_disabled())
}

#[cfg(not(feature = "aws"))]
pub fn handle_teardown(args: &ProvisionArgs) -> Result<(), CliError> {
    load_config(&args.config)?;
    Err(aws_disabled())
}

#[cfg(not(feature = "aws"))]
fn aws_disabled() -> CliError {
    CliError::FeatureDisabled("AWS support not enabled. Build with --features aws".to_string())
}
