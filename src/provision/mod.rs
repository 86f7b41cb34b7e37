//! Warehouse provisioning
//!
//! Creates and tears down the cluster and the role the cluster assumes to read
//! the sources. Every step reports whether it changed something or found the
//! target state already in place; anything else is a [`ProvisionError`] and
//! stops the sequence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;

#[cfg(feature = "aws")]
pub mod aws;

#[cfg(feature = "aws")]
pub use self::aws::AwsProvisioner;

/// Managed policy granting read access to the source buckets
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Service principal allowed to assume the role
pub const REDSHIFT_SERVICE_PRINCIPAL: &str = "redshift.amazonaws.com";

/// Error type for provisioning steps
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The provider rejected a step
    #[error("{step} failed: {message}")]
    StepFailed { step: ProvisionStep, message: String },

    /// A step returned without data the next step needs
    #[error("{step} returned no {what}")]
    MissingOutput {
        step: ProvisionStep,
        what: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for provisioning
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step changed the provider's state
    Applied,
    /// The target state was already in place; safe to continue
    AlreadySatisfied,
}

/// Provisioning steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    CreateRole,
    AttachPolicy,
    GetRoleArn,
    CreateCluster,
    DeleteCluster,
    DetachPolicy,
    DeleteRole,
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionStep::CreateRole => write!(f, "create role"),
            ProvisionStep::AttachPolicy => write!(f, "attach policy"),
            ProvisionStep::GetRoleArn => write!(f, "get role arn"),
            ProvisionStep::CreateCluster => write!(f, "create cluster"),
            ProvisionStep::DeleteCluster => write!(f, "delete cluster"),
            ProvisionStep::DetachPolicy => write!(f, "detach policy"),
            ProvisionStep::DeleteRole => write!(f, "delete role"),
        }
    }
}

/// Cluster shape and master credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub identifier: String,
    pub cluster_type: String,
    pub node_type: String,
    pub num_nodes: i32,
    pub db_name: String,
    pub master_user: String,
    pub master_password: String,
}

impl ClusterSpec {
    /// Build the spec from the `[provisioning]` and `[warehouse]` sections
    pub fn from_config(config: &PipelineConfig) -> ProvisionResult<Self> {
        let master_password = config
            .warehouse
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ProvisionError::Config("warehouse.password is required to create a cluster".into())
            })?;

        let num_nodes = config.provisioning.num_nodes;
        if num_nodes < 1 {
            return Err(ProvisionError::Config(format!(
                "provisioning.num_nodes must be at least 1, got {}",
                num_nodes
            )));
        }
        if config.provisioning.cluster_identifier.is_empty() {
            return Err(ProvisionError::Config(
                "provisioning.cluster_identifier is required".into(),
            ));
        }

        Ok(Self {
            identifier: config.provisioning.cluster_identifier.clone(),
            cluster_type: config.provisioning.cluster_type.clone(),
            node_type: config.provisioning.node_type.clone(),
            num_nodes,
            db_name: config.warehouse.db_name.clone(),
            master_user: config.warehouse.user.clone(),
            master_password,
        })
    }
}

/// Provider of the cluster and role
#[async_trait(?Send)]
pub trait Provisioner {
    /// Create the role the cluster assumes
    async fn create_role(&self, role_name: &str) -> ProvisionResult<StepOutcome>;

    /// Grant the role read access to the sources
    async fn attach_policy(&self, role_name: &str, policy_arn: &str)
    -> ProvisionResult<StepOutcome>;

    /// Look up the role's ARN
    async fn role_arn(&self, role_name: &str) -> ProvisionResult<String>;

    /// Create the cluster with the role attached
    async fn create_cluster(
        &self,
        spec: &ClusterSpec,
        role_arn: &str,
    ) -> ProvisionResult<StepOutcome>;

    /// Delete the cluster without a final snapshot
    async fn delete_cluster(&self, identifier: &str) -> ProvisionResult<StepOutcome>;

    async fn detach_policy(&self, role_name: &str, policy_arn: &str)
    -> ProvisionResult<StepOutcome>;

    async fn delete_role(&self, role_name: &str) -> ProvisionResult<StepOutcome>;
}

/// Outcome of every step that ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub steps: Vec<(ProvisionStep, StepOutcome)>,
    /// Set by [`provision`]
    pub role_arn: Option<String>,
}

impl ProvisionReport {
    fn record(&mut self, step: ProvisionStep, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Applied => tracing::info!("{}: applied", step),
            StepOutcome::AlreadySatisfied => tracing::info!("{}: already in place", step),
        }
        self.steps.push((step, outcome));
    }
}

/// Create the role, grant it read access, then create the cluster
pub async fn provision(
    provisioner: &dyn Provisioner,
    config: &PipelineConfig,
) -> ProvisionResult<ProvisionReport> {
    let spec = ClusterSpec::from_config(config)?;
    let role_name = config.provisioning.iam_role_name.as_str();
    let mut report = ProvisionReport::default();

    let outcome = provisioner.create_role(role_name).await?;
    report.record(ProvisionStep::CreateRole, outcome);

    let outcome = provisioner
        .attach_policy(role_name, S3_READ_ONLY_POLICY_ARN)
        .await?;
    report.record(ProvisionStep::AttachPolicy, outcome);

    let role_arn = provisioner.role_arn(role_name).await?;
    tracing::info!("Role ARN: {}", role_arn);
    report.record(ProvisionStep::GetRoleArn, StepOutcome::Applied);

    let outcome = provisioner.create_cluster(&spec, &role_arn).await?;
    report.record(ProvisionStep::CreateCluster, outcome);

    report.role_arn = Some(role_arn);
    Ok(report)
}

/// Delete the cluster, then the role
///
/// Resources that are already gone count as [`StepOutcome::AlreadySatisfied`],
/// so teardown can be repeated.
pub async fn teardown(
    provisioner: &dyn Provisioner,
    config: &PipelineConfig,
) -> ProvisionResult<ProvisionReport> {
    let role_name = config.provisioning.iam_role_name.as_str();
    let mut report = ProvisionReport::default();

    let outcome = provisioner
        .delete_cluster(&config.provisioning.cluster_identifier)
        .await?;
    report.record(ProvisionStep::DeleteCluster, outcome);

    let outcome = provisioner
        .detach_policy(role_name, S3_READ_ONLY_POLICY_ARN)
        .await?;
    report.record(ProvisionStep::DetachPolicy, outcome);

    let outcome = provisioner.delete_role(role_name).await?;
    report.record(ProvisionStep::DeleteRole, outcome);

    Ok(report)
}

/// Trust policy letting the warehouse service assume the role
pub fn assume_role_policy_document() -> String {
    serde_json::json!({
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": {"Service": REDSHIFT_SERVICE_PRINCIPAL}
        }],
        "Version": "2012-10-17"
    })
    .to_string()
}
