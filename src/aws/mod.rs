use std::{fmt, time::Duration, time::SystemTime};

use async_trait::async_trait;
use aws_smithy_types::DateTime;
use serde::Serialize;

use crate::error::Result;

pub mod cache;
pub mod chain;
pub mod client;
pub mod identity;
pub mod partition;
pub mod profile;
pub mod sdk;
pub mod sts;

#[cfg(test)]
pub(crate) mod testing;

/// Which credential source produced a set of credentials.
///
/// Role-derived origins always come after the base origins in declaration
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialOrigin {
    Static,
    Environment,
    SharedProfile,
    DefaultChain,
    AssumeRole,
    AssumeRoleWithWebIdentity,
}

impl CredentialOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Environment => "environment",
            Self::SharedProfile => "shared-profile",
            Self::DefaultChain => "default-chain",
            Self::AssumeRole => "assume-role",
            Self::AssumeRoleWithWebIdentity => "assume-role-with-web-identity",
        }
    }

    pub fn is_role_derived(&self) -> bool {
        matches!(self, Self::AssumeRole | Self::AssumeRoleWithWebIdentity)
    }
}

impl fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AWS credentials structure
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// `None` for long-lived keys, which never expire.
    pub expiration: Option<DateTime>,
    pub origin: CredentialOrigin,
    /// ARN of the principal, when the producing call reported one.
    pub principal_arn: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        origin: CredentialOrigin,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiration: None,
            origin,
            principal_arn: None,
        }
    }

    pub fn with_expiration(mut self, expiration: DateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_principal_arn(mut self, arn: impl Into<String>) -> Self {
        self.principal_arn = Some(arn.into());
        self
    }

    /// Whether the credentials are expired at `now`, treating anything within
    /// `buffer` of the expiry as already expired.
    pub fn is_expired_at(&self, now: SystemTime, buffer: Duration) -> bool {
        let Some(expiration) = self.expiration else {
            return false;
        };
        let threshold = DateTime::from(now + buffer);
        expiration <= threshold
    }

    pub fn to_sdk(&self) -> aws_credential_types::Credentials {
        aws_credential_types::Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            self.session_token.clone(),
            self.expiration.and_then(|e| SystemTime::try_from(e).ok()),
            "awsbase",
        )
    }

    pub fn from_sdk(creds: &aws_credential_types::Credentials, origin: CredentialOrigin) -> Self {
        Self {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().map(str::to_string),
            expiration: creds.expiry().map(DateTime::from),
            origin,
            principal_arn: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expiration", &self.expiration)
            .field("origin", &self.origin)
            .field("principal_arn", &self.principal_arn)
            .finish()
    }
}

/// Anything that can produce credentials on demand.
#[async_trait]
pub trait ProvideCredentials: Send + Sync + fmt::Debug {
    async fn provide_credentials(&self) -> Result<Credentials>;
}
