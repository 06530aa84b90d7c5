//! Identity validation and account discovery.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::Credentials;
use super::client::{CallerIdentity, IamApi, StsApi};
use super::partition::{Arn, partition_for_region};
use crate::error::{ApiError, Error, Result};
use crate::retry::RetryPolicy;

/// GetUser error codes that only say the caller is not an IAM user or may
/// not read itself.
const IGNORABLE_GET_USER_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "InvalidClientTokenId",
    "ValidationError",
];

/// Account and partition of the resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    /// Empty when the account could not be determined.
    pub account_id: String,
    pub partition: String,
}

/// Whether a GetUser failure just means "not an IAM user" (federated users,
/// assumed roles, or no `iam:GetUser` permission).
pub fn is_ignorable_get_user_error(error: &ApiError) -> bool {
    if error
        .code()
        .is_some_and(|code| IGNORABLE_GET_USER_CODES.contains(&code))
    {
        return true;
    }
    error
        .message
        .contains("Must specify userName when calling with non-User credentials")
}

#[derive(Debug, Clone)]
pub struct IdentityValidator {
    sts: Arc<dyn StsApi>,
    retry: RetryPolicy,
}

impl IdentityValidator {
    pub fn new(sts: Arc<dyn StsApi>, retry: RetryPolicy) -> Self {
        Self { sts, retry }
    }

    /// One GetCallerIdentity call; failure fails the resolution.
    pub async fn validate(&self, credentials: &Credentials) -> Result<CallerIdentity> {
        info!("Validating credentials with STS GetCallerIdentity");

        let identity = self
            .retry
            .execute(|| self.sts.get_caller_identity(credentials))
            .await
            .into_result()
            .map_err(Error::ValidationFailed)?;

        debug!("Caller identity: {}", identity.arn);
        Ok(identity)
    }
}

/// Account lookup outcome. `incomplete` is set when no step found an account.
#[derive(Debug)]
pub struct AccountLookup {
    pub identity: ResolvedIdentity,
    pub incomplete: Option<Error>,
}

#[derive(Debug, Clone)]
pub struct AccountResolver {
    iam: Arc<dyn IamApi>,
    retry: RetryPolicy,
}

impl AccountResolver {
    pub fn new(iam: Arc<dyn IamApi>, retry: RetryPolicy) -> Self {
        Self { iam, retry }
    }

    /// Find the account and partition, trying in order: the caller identity
    /// already in hand, IAM GetUser, IAM ListRoles, and the ARN carried by the
    /// credentials. With `skip_lookup` only data already in hand is used.
    pub async fn resolve(
        &self,
        credentials: &Credentials,
        region: &str,
        caller: Option<&CallerIdentity>,
        skip_lookup: bool,
    ) -> AccountLookup {
        if let Some(identity) = caller.and_then(|c| from_arn(&c.arn)) {
            return found(identity);
        }

        let mut errors = Vec::new();

        if !skip_lookup {
            match self.lookup_from_iam(credentials, &mut errors).await {
                Some(identity) => return found(identity),
                None => debug!("IAM account lookup found nothing"),
            }
        }

        if let Some(identity) = credentials.principal_arn.as_deref().and_then(from_arn) {
            return found(identity);
        }

        let identity = ResolvedIdentity {
            account_id: String::new(),
            partition: partition_for_region(region).to_string(),
        };

        if skip_lookup {
            debug!("Account lookup skipped, account id left empty");
            return AccountLookup {
                identity,
                incomplete: None,
            };
        }

        let error = Error::AccountLookupIncomplete { errors };
        warn!("{}", error);
        AccountLookup {
            identity,
            incomplete: Some(error),
        }
    }

    async fn lookup_from_iam(
        &self,
        credentials: &Credentials,
        errors: &mut Vec<ApiError>,
    ) -> Option<ResolvedIdentity> {
        debug!("Trying to get account information via iam:GetUser");
        match self
            .retry
            .execute(|| self.iam.get_user(credentials))
            .await
            .into_result()
        {
            Ok(arn) => {
                if let Some(identity) = from_arn(&arn) {
                    return Some(identity);
                }
                debug!("iam:GetUser returned unparseable ARN {:?}", arn);
            }
            Err(error) if is_ignorable_get_user_error(&error) => {
                debug!("Ignoring iam:GetUser error: {}", error);
                errors.push(error);
            }
            Err(error) => {
                warn!("Getting account information via iam:GetUser failed: {}", error);
                errors.push(error);
            }
        }

        debug!("Trying to get account information via iam:ListRoles");
        match self
            .retry
            .execute(|| self.iam.list_roles(credentials, 1))
            .await
            .into_result()
        {
            Ok(roles) => roles.first().and_then(|arn| from_arn(arn)),
            Err(error) => {
                warn!("Getting account information via iam:ListRoles failed: {}", error);
                errors.push(error);
                None
            }
        }
    }
}

fn from_arn(arn: &str) -> Option<ResolvedIdentity> {
    let arn = Arn::parse(arn).ok()?;
    let account_id = arn.account()?.to_string();
    Some(ResolvedIdentity {
        account_id,
        partition: arn.partition,
    })
}

fn found(identity: ResolvedIdentity) -> AccountLookup {
    debug!(
        "Resolved account {} in partition {}",
        identity.account_id, identity.partition
    );
    AccountLookup {
        identity,
        incomplete: None,
    }
}
