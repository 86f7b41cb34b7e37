//! AWS provisioner: IAM role plus Redshift cluster

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_iam::error::SdkError;

use super::{
    ClusterSpec, ProvisionError, ProvisionResult, ProvisionStep, Provisioner, StepOutcome,
    assume_role_policy_document,
};
use crate::config::ProvisioningSection;

const ROLE_DESCRIPTION: &str = "Allows Redshift clusters to call AWS services on your behalf.";

/// Provisioner backed by the IAM and Redshift APIs
pub struct AwsProvisioner {
    iam: aws_sdk_iam::Client,
    redshift: aws_sdk_redshift::Client,
}

impl AwsProvisioner {
    /// Build clients for the configured region
    ///
    /// Uses the static key/secret when both are set, the default credential
    /// chain otherwise.
    pub async fn connect(section: &ProvisioningSection) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(section.region.clone()));

        if let (Some(key), Some(secret)) = (&section.key, &section.secret) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "songplay-warehouse-config",
            ));
        }

        let sdk_config = loader.load().await;
        tracing::debug!("AWS clients configured for region {}", section.region);

        Self {
            iam: aws_sdk_iam::Client::new(&sdk_config),
            redshift: aws_sdk_redshift::Client::new(&sdk_config),
        }
    }
}

fn step_failed<E: std::fmt::Display>(step: ProvisionStep, error: E) -> ProvisionError {
    ProvisionError::StepFailed {
        step,
        message: error.to_string(),
    }
}

#[async_trait(?Send)]
impl Provisioner for AwsProvisioner {
    async fn create_role(&self, role_name: &str) -> ProvisionResult<StepOutcome> {
        use aws_sdk_iam::operation::create_role::CreateRoleError;

        let result = self
            .iam
            .create_role()
            .path("/")
            .role_name(role_name)
            .description(ROLE_DESCRIPTION)
            .assume_role_policy_document(assume_role_policy_document())
            .send()
            .await;

        match result {
            Ok(_) => Ok(StepOutcome::Applied),
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), CreateRoleError::EntityAlreadyExistsException(_)) =>
            {
                Ok(StepOutcome::AlreadySatisfied)
            }
            Err(e) => Err(step_failed(ProvisionStep::CreateRole, e)),
        }
    }

    /// Attaching an already attached policy succeeds, so this always reports
    /// [`StepOutcome::Applied`]
    async fn attach_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> ProvisionResult<StepOutcome> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| step_failed(ProvisionStep::AttachPolicy, e))?;
        Ok(StepOutcome::Applied)
    }

    async fn role_arn(&self, role_name: &str) -> ProvisionResult<String> {
        let output = self
            .iam
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| step_failed(ProvisionStep::GetRoleArn, e))?;

        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or(ProvisionError::MissingOutput {
                step: ProvisionStep::GetRoleArn,
                what: "role",
            })
    }

    async fn create_cluster(
        &self,
        spec: &ClusterSpec,
        role_arn: &str,
    ) -> ProvisionResult<StepOutcome> {
        use aws_sdk_redshift::error::SdkError;
        use aws_sdk_redshift::operation::create_cluster::CreateClusterError;

        let result = self
            .redshift
            .create_cluster()
            .cluster_type(&spec.cluster_type)
            .node_type(&spec.node_type)
            .number_of_nodes(spec.num_nodes)
            .db_name(&spec.db_name)
            .cluster_identifier(&spec.identifier)
            .master_username(&spec.master_user)
            .master_user_password(&spec.master_password)
            .iam_roles(role_arn)
            .send()
            .await;

        match result {
            Ok(_) => Ok(StepOutcome::Applied),
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), CreateClusterError::ClusterAlreadyExistsFault(_)) =>
            {
                Ok(StepOutcome::AlreadySatisfied)
            }
            Err(e) => Err(step_failed(ProvisionStep::CreateCluster, e)),
        }
    }

    async fn delete_cluster(&self, identifier: &str) -> ProvisionResult<StepOutcome> {
        use aws_sdk_redshift::error::SdkError;
        use aws_sdk_redshift::operation::delete_cluster::DeleteClusterError;

        let result = self
            .redshift
            .delete_cluster()
            .cluster_identifier(identifier)
            .skip_final_cluster_snapshot(true)
            .send()
            .await;

        match result {
            Ok(_) => Ok(StepOutcome::Applied),
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), DeleteClusterError::ClusterNotFoundFault(_)) =>
            {
                Ok(StepOutcome::AlreadySatisfied)
            }
            Err(e) => Err(step_failed(ProvisionStep::DeleteCluster, e)),
        }
    }

    async fn detach_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> ProvisionResult<StepOutcome> {
        use aws_sdk_iam::operation::detach_role_policy::DetachRolePolicyError;

        let result = self
            .iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await;

        match result {
            Ok(_) => Ok(StepOutcome::Applied),
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), DetachRolePolicyError::NoSuchEntityException(_)) =>
            {
                Ok(StepOutcome::AlreadySatisfied)
            }
            Err(e) => Err(step_failed(ProvisionStep::DetachPolicy, e)),
        }
    }

    async fn delete_role(&self, role_name: &str) -> ProvisionResult<StepOutcome> {
        use aws_sdk_iam::operation::delete_role::DeleteRoleError;

        let result = self.iam.delete_role().role_name(role_name).send().await;

        match result {
            Ok(_) => Ok(StepOutcome::Applied),
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), DeleteRoleError::NoSuchEntityException(_)) =>
            {
                Ok(StepOutcome::AlreadySatisfied)
            }
            Err(e) => Err(step_failed(ProvisionStep::DeleteRole, e)),
        }
    }
}
