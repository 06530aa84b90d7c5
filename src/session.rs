//! Top-level credential resolution.
//!
//! A [`Resolver`] turns a [`Config`] into a [`Session`]: base credentials
//! from the chain, configured roles assumed in order, the identity validated
//! and the account looked up.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::aws::cache::CachedProvider;
use crate::aws::chain::CredentialChain;
use crate::aws::client::{CallerIdentity, DelegateProvider, IamApi, StsApi};
use crate::aws::identity::{AccountResolver, IdentityValidator, ResolvedIdentity};
use crate::aws::sdk::{SdkClients, SdkDelegate};
use crate::aws::sts::Authenticator;
use crate::aws::{CredentialOrigin, Credentials, ProvideCredentials};
use crate::config::{Config, ResolvedConfig};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::time::{SharedTimeSource, system_time_source};

/// The services resolution talks to.
#[derive(Debug, Clone)]
pub struct Clients {
    pub sts: Arc<dyn StsApi>,
    pub iam: Arc<dyn IamApi>,
    pub delegate: Arc<dyn DelegateProvider>,
}

impl Clients {
    pub fn from_sdk(config: &ResolvedConfig) -> Self {
        let sdk = Arc::new(SdkClients::new(config));
        Self {
            sts: sdk.clone(),
            iam: sdk,
            delegate: Arc::new(SdkDelegate::new(config)),
        }
    }
}

#[derive(Debug)]
pub struct Resolver {
    config: Config,
    env: Option<Env>,
    clients: Option<Clients>,
    time: SharedTimeSource,
    retry: Option<RetryPolicy>,
}

impl Resolver {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            env: None,
            clients: None,
            time: system_time_source(),
            retry: None,
        }
    }

    /// Resolve against this environment instead of the process environment.
    pub fn with_env(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn with_time_source(mut self, time: SharedTimeSource) -> Self {
        self.time = time;
        self
    }

    /// Override the retry policy otherwise built from the resolved
    /// `max_attempts`.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub async fn resolve(&self) -> Result<Session> {
        let env = self.env.clone().unwrap_or_else(Env::from_process);
        let config = ResolvedConfig::resolve(&self.config, env)?;

        for spec in &config.assume_role {
            spec.validate()?;
        }

        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::new(config.max_attempts));
        let clients = self
            .clients
            .clone()
            .unwrap_or_else(|| Clients::from_sdk(&config));

        info!("Resolving AWS credentials (region {})", config.region);

        let pipeline = CredentialPipeline {
            authenticator: Authenticator::new(clients.sts.clone(), retry, self.time.clone()),
            delegate: clients.delegate.clone(),
            config: Arc::new(config),
        };
        let credentials = pipeline.fetch().await?;
        let config = pipeline.config.clone();

        let caller_identity = if config.skip_credentials_validation {
            debug!("Skipping credentials validation");
            None
        } else {
            let validator = IdentityValidator::new(clients.sts.clone(), retry);
            Some(validator.validate(&credentials).await?)
        };

        let lookup = AccountResolver::new(clients.iam.clone(), retry)
            .resolve(
                &credentials,
                &config.region,
                caller_identity.as_ref(),
                config.skip_requesting_account_id,
            )
            .await;

        info!(
            "Resolved {} credentials for account {:?} in partition {}",
            credentials.origin, lookup.identity.account_id, lookup.identity.partition
        );

        let origin = credentials.origin;
        let provider = CachedProvider::new(Arc::new(pipeline))
            .with_time_source(self.time.clone())
            .with_initial(credentials);

        Ok(Session {
            region: config.region.clone(),
            provider: Arc::new(provider),
            origin,
            identity: lookup.identity,
            caller_identity,
            account_lookup_error: lookup.incomplete,
        })
    }

    /// [`Resolver::resolve`] with a deadline over the whole resolution.
    pub async fn resolve_with_timeout(&self, timeout: Duration) -> Result<Session> {
        tokio::time::timeout(timeout, self.resolve())
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }
}

/// The chain plus configured roles, run again whenever the cached
/// credentials expire.
#[derive(Debug)]
struct CredentialPipeline {
    config: Arc<ResolvedConfig>,
    authenticator: Authenticator,
    delegate: Arc<dyn DelegateProvider>,
}

impl CredentialPipeline {
    async fn fetch(&self) -> Result<Credentials> {
        let mut credentials =
            CredentialChain::new(&self.config, &self.authenticator, self.delegate.as_ref())
                .resolve()
                .await?;

        for spec in &self.config.assume_role {
            credentials = self.authenticator.assume_role(&credentials, spec).await?;
        }
        Ok(credentials)
    }
}

#[async_trait]
impl ProvideCredentials for CredentialPipeline {
    async fn provide_credentials(&self) -> Result<Credentials> {
        self.fetch().await
    }
}

/// A successfully resolved identity.
pub struct Session {
    region: String,
    provider: Arc<CachedProvider>,
    origin: CredentialOrigin,
    identity: ResolvedIdentity,
    caller_identity: Option<CallerIdentity>,
    account_lookup_error: Option<Error>,
}

impl Session {
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Current credentials, refreshed through the chain once expired.
    pub async fn credentials(&self) -> Result<Credentials> {
        self.provider.credentials().await
    }

    pub fn credentials_provider(&self) -> Arc<CachedProvider> {
        self.provider.clone()
    }

    /// Origin of the credentials obtained during resolution.
    pub fn origin(&self) -> CredentialOrigin {
        self.origin
    }

    pub fn identity(&self) -> &ResolvedIdentity {
        &self.identity
    }

    /// Empty when the account could not be determined.
    pub fn account_id(&self) -> &str {
        &self.identity.account_id
    }

    pub fn partition(&self) -> &str {
        &self.identity.partition
    }

    pub fn caller_identity(&self) -> Option<&CallerIdentity> {
        self.caller_identity.as_ref()
    }

    /// Set when account lookup was attempted and found nothing.
    pub fn account_lookup_error(&self) -> Option<&Error> {
        self.account_lookup_error.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("region", &self.region)
            .field("origin", &self.origin)
            .field("identity", &self.identity)
            .field("caller_identity", &self.caller_identity)
            .field("account_lookup_error", &self.account_lookup_error)
            .finish_non_exhaustive()
    }
}
