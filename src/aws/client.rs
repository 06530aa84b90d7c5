//! Seams to the STS and IAM services and to the SDK default chain.
//!
//! Everything that leaves the process goes through one of these traits. The
//! SDK-backed implementations live in [`super::sdk`]; tests substitute mocks.

use std::fmt;

use async_trait::async_trait;
use aws_smithy_types::DateTime;

use super::{CredentialOrigin, Credentials};
use crate::error::{ApiError, Result};

pub const OP_ASSUME_ROLE: &str = "AssumeRole";
pub const OP_ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "AssumeRoleWithWebIdentity";
pub const OP_GET_CALLER_IDENTITY: &str = "GetCallerIdentity";
pub const OP_GET_USER: &str = "GetUser";
pub const OP_LIST_ROLES: &str = "ListRoles";

/// Parameters of one AssumeRole call. `None` fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub external_id: Option<String>,
    pub policy: Option<String>,
    pub policy_arns: Option<Vec<String>>,
    pub tags: Option<Vec<(String, String)>>,
    pub transitive_tag_keys: Option<Vec<String>>,
    pub source_identity: Option<String>,
    pub duration_seconds: i32,
}

/// Parameters of one AssumeRoleWithWebIdentity call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AssumeRoleWithWebIdentityRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub web_identity_token: String,
    pub policy: Option<String>,
    pub policy_arns: Option<Vec<String>>,
    pub duration_seconds: i32,
}

impl fmt::Debug for AssumeRoleWithWebIdentityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleWithWebIdentityRequest")
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("web_identity_token", &"** redacted **")
            .field("policy", &self.policy)
            .field("policy_arns", &self.policy_arns)
            .field("duration_seconds", &self.duration_seconds)
            .finish()
    }
}

/// Temporary credentials returned by STS.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime,
    pub assumed_role_arn: Option<String>,
}

impl IssuedCredentials {
    pub fn into_credentials(self, origin: CredentialOrigin) -> Credentials {
        let creds = Credentials::new(
            self.access_key_id,
            self.secret_access_key,
            Some(self.session_token),
            origin,
        )
        .with_expiration(self.expiration);

        match self.assumed_role_arn {
            Some(arn) => creds.with_principal_arn(arn),
            None => creds,
        }
    }
}

impl fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .field("assumed_role_arn", &self.assumed_role_arn)
            .finish_non_exhaustive()
    }
}

/// Result of GetCallerIdentity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

#[async_trait]
pub trait StsApi: Send + Sync + fmt::Debug {
    async fn assume_role(
        &self,
        credentials: &Credentials,
        request: &AssumeRoleRequest,
    ) -> std::result::Result<IssuedCredentials, ApiError>;

    /// Unsigned: the token is the only proof of identity.
    async fn assume_role_with_web_identity(
        &self,
        request: &AssumeRoleWithWebIdentityRequest,
    ) -> std::result::Result<IssuedCredentials, ApiError>;

    async fn get_caller_identity(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<CallerIdentity, ApiError>;
}

#[async_trait]
pub trait IamApi: Send + Sync + fmt::Debug {
    /// ARN of the calling IAM user.
    async fn get_user(&self, credentials: &Credentials) -> std::result::Result<String, ApiError>;

    /// Role ARNs in the calling account, at most `max_items`.
    async fn list_roles(
        &self,
        credentials: &Credentials,
        max_items: i32,
    ) -> std::result::Result<Vec<String>, ApiError>;
}

/// Credential sources implemented by the SDK rather than by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateSource {
    /// Web identity from `AWS_WEB_IDENTITY_TOKEN_FILE`, then the container
    /// endpoint, then instance metadata.
    DefaultChain,
    Ec2InstanceMetadata,
    EcsContainer,
}

impl DelegateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefaultChain => "default chain",
            Self::Ec2InstanceMetadata => "Ec2InstanceMetadata",
            Self::EcsContainer => "EcsContainer",
        }
    }
}

#[async_trait]
pub trait DelegateProvider: Send + Sync + fmt::Debug {
    /// `Ok(None)` when the source has nothing to offer, which lets the chain
    /// report `NoValidCredentialSources`.
    async fn provide(&self, source: DelegateSource) -> Result<Option<Credentials>>;
}
