//! Configuration surface and its resolution against the environment and the
//! shared files.
//!
//! [`Config`] is what a caller hands in. [`ResolvedConfig`] is built from it
//! once per invocation, with every value field settled by the same precedence:
//! explicit field, then environment variable, then the active shared profile,
//! then the default.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use aws_smithy_types::retry::RetryConfig;
use tracing::{debug, info};

use crate::aws::profile::{Profile, SharedFiles};
use crate::constants::{
    self, DEFAULT_AWS_REGION, DEFAULT_PROFILE, ENV_DEFAULT_PROFILE, ENV_DEFAULT_REGION,
    ENV_ENDPOINT_URL, ENV_ENDPOINT_URL_IAM, ENV_ENDPOINT_URL_STS, ENV_MAX_ATTEMPTS, ENV_PROFILE,
    ENV_REGION, ENV_USE_DUALSTACK_ENDPOINT, ENV_USE_FIPS_ENDPOINT,
};
use crate::env::Env;
use crate::error::{Error, Result};

/// Parameters for a single AssumeRole call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssumeRoleSpec {
    pub role_arn: String,
    pub session_name: Option<String>,
    pub external_id: Option<String>,
    /// Inline session policy document (JSON).
    pub policy: Option<String>,
    pub policy_arns: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub transitive_tag_keys: Vec<String>,
    pub source_identity: Option<String>,
    /// Defaults to one hour when unset.
    pub duration: Option<Duration>,
}

impl AssumeRoleSpec {
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.role_arn.trim().is_empty() {
            return Err(Error::invalid_role(
                &self.role_arn,
                "role ARN must not be empty",
            ));
        }
        Ok(())
    }
}

/// Parameters for AssumeRoleWithWebIdentity.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AssumeRoleWithWebIdentitySpec {
    pub role_arn: String,
    pub session_name: Option<String>,
    pub web_identity_token: Option<String>,
    /// May contain `~` and `$VAR` placeholders.
    pub web_identity_token_file: Option<PathBuf>,
    pub policy: Option<String>,
    pub policy_arns: Vec<String>,
    pub duration: Option<Duration>,
}

impl AssumeRoleWithWebIdentitySpec {
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.role_arn.trim().is_empty() {
            return Err(Error::invalid_role(
                &self.role_arn,
                "role ARN must not be empty",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for AssumeRoleWithWebIdentitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleWithWebIdentitySpec")
            .field("role_arn", &self.role_arn)
            .field("session_name", &self.session_name)
            .field(
                "web_identity_token",
                &self.web_identity_token.as_ref().map(|_| "** redacted **"),
            )
            .field("web_identity_token_file", &self.web_identity_token_file)
            .field("policy", &self.policy)
            .field("policy_arns", &self.policy_arns)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Caller-supplied configuration.
#[derive(Clone, Default)]
pub struct Config {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub token: Option<String>,
    pub profile: Option<String>,
    pub region: Option<String>,
    pub shared_config_files: Vec<PathBuf>,
    pub shared_credentials_files: Vec<PathBuf>,
    /// Roles assumed in order, each with the previous role's credentials.
    pub assume_role: Vec<AssumeRoleSpec>,
    pub assume_role_with_web_identity: Option<AssumeRoleWithWebIdentitySpec>,
    pub skip_credentials_validation: bool,
    pub skip_requesting_account_id: bool,
    pub max_attempts: Option<u32>,
    pub sts_endpoint: Option<String>,
    pub iam_endpoint: Option<String>,
    pub use_fips_endpoint: Option<bool>,
    pub use_dual_stack_endpoint: Option<bool>,
    pub trace_http: bool,
}

impl Config {
    pub fn with_static_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self.token = token;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_assume_role(mut self, spec: AssumeRoleSpec) -> Self {
        self.assume_role.push(spec);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "** redacted **"))
            .field("token", &self.token.as_ref().map(|_| "** redacted **"))
            .field("profile", &self.profile)
            .field("region", &self.region)
            .field("shared_config_files", &self.shared_config_files)
            .field("shared_credentials_files", &self.shared_credentials_files)
            .field("assume_role", &self.assume_role)
            .field("assume_role_with_web_identity", &self.assume_role_with_web_identity)
            .field("skip_credentials_validation", &self.skip_credentials_validation)
            .field("skip_requesting_account_id", &self.skip_requesting_account_id)
            .field("max_attempts", &self.max_attempts)
            .field("sts_endpoint", &self.sts_endpoint)
            .field("iam_endpoint", &self.iam_endpoint)
            .field("use_fips_endpoint", &self.use_fips_endpoint)
            .field("use_dual_stack_endpoint", &self.use_dual_stack_endpoint)
            .field("trace_http", &self.trace_http)
            .finish()
    }
}

/// Explicitly configured long-lived keys.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticKeys {
    pub access_key: String,
    pub secret_key: String,
    pub token: Option<String>,
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeys")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub sts: Option<String>,
    pub iam: Option<String>,
}

/// Configuration with every precedence decision already made.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub static_keys: Option<StaticKeys>,
    pub env: Env,
    /// Profile named explicitly or through `AWS_PROFILE`; `None` means the
    /// `default` profile is used if it exists.
    pub profile: Option<String>,
    pub shared_files: SharedFiles,
    pub region: String,
    pub assume_role: Vec<AssumeRoleSpec>,
    pub assume_role_with_web_identity: Option<AssumeRoleWithWebIdentitySpec>,
    pub skip_credentials_validation: bool,
    pub skip_requesting_account_id: bool,
    pub max_attempts: u32,
    pub endpoints: Endpoints,
    pub use_fips_endpoint: bool,
    pub use_dual_stack_endpoint: bool,
    pub trace_http: bool,
}

impl ResolvedConfig {
    /// Resolve `config` against `env`, loading the shared files from disk.
    pub fn resolve(config: &Config, env: Env) -> Result<Self> {
        let config_files = if config.shared_config_files.is_empty() {
            constants::get_aws_config_path(&env).into_iter().collect()
        } else {
            config.shared_config_files.clone()
        };
        let credentials_files = if config.shared_credentials_files.is_empty() {
            constants::get_aws_credentials_path(&env).into_iter().collect()
        } else {
            config.shared_credentials_files.clone()
        };

        let config_files: Vec<PathBuf> = config_files.iter().map(|p| expand_path(p, &env)).collect();
        let credentials_files: Vec<PathBuf> = credentials_files
            .iter()
            .map(|p| expand_path(p, &env))
            .collect();

        let shared_files = SharedFiles::load(&config_files, &credentials_files)?;
        Self::from_parts(config, env, shared_files)
    }

    /// Resolve `config` against an already loaded view of the shared files.
    pub fn from_parts(config: &Config, env: Env, shared_files: SharedFiles) -> Result<Self> {
        let profile = config
            .profile
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| env.first(&[ENV_PROFILE, ENV_DEFAULT_PROFILE]).map(str::to_string));

        // A named profile that does not exist is reported before anything
        // else, including when explicit keys would otherwise win.
        if let Some(name) = &profile {
            if !shared_files.contains(name) {
                return Err(Error::InvalidProfile {
                    profile: name.clone(),
                    files: shared_files.paths().to_vec(),
                });
            }
        }

        let active = shared_files.profile(profile.as_deref().unwrap_or(DEFAULT_PROFILE));

        let static_keys = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => Some(StaticKeys {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                token: config.token.clone(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(Error::InvalidConfiguration(
                    "access key is set but secret key is missing".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(Error::InvalidConfiguration(
                    "secret key is set but access key is missing".to_string(),
                ));
            }
        };

        let region = match config
            .region
            .clone()
            .or_else(|| env.first(&[ENV_REGION, ENV_DEFAULT_REGION]).map(str::to_string))
            .or_else(|| profile_value(active, "region").map(str::to_string))
        {
            Some(region) => region,
            None => {
                info!(
                    "No region configured, using default {} for STS",
                    DEFAULT_AWS_REGION
                );
                DEFAULT_AWS_REGION.to_string()
            }
        };

        let max_attempts = match config.max_attempts {
            Some(n) => n,
            None => match env
                .get(ENV_MAX_ATTEMPTS)
                .map(|v| (ENV_MAX_ATTEMPTS, v))
                .or_else(|| profile_value(active, "max_attempts").map(|v| ("max_attempts", v)))
            {
                Some((name, value)) => parse_value(name, value)?,
                None => RetryConfig::standard().max_attempts(),
            },
        };

        let endpoints = Endpoints {
            sts: config
                .sts_endpoint
                .clone()
                .or_else(|| env.first(&[ENV_ENDPOINT_URL_STS, ENV_ENDPOINT_URL]).map(str::to_string))
                .or_else(|| profile_value(active, "endpoint_url").map(str::to_string)),
            iam: config
                .iam_endpoint
                .clone()
                .or_else(|| env.first(&[ENV_ENDPOINT_URL_IAM, ENV_ENDPOINT_URL]).map(str::to_string))
                .or_else(|| profile_value(active, "endpoint_url").map(str::to_string)),
        };

        let use_fips_endpoint = resolve_flag(
            config.use_fips_endpoint,
            &env,
            ENV_USE_FIPS_ENDPOINT,
            active,
            "use_fips_endpoint",
        )?;
        let use_dual_stack_endpoint = resolve_flag(
            config.use_dual_stack_endpoint,
            &env,
            ENV_USE_DUALSTACK_ENDPOINT,
            active,
            "use_dualstack_endpoint",
        )?;

        debug!(
            profile = ?profile,
            region = %region,
            max_attempts,
            "Resolved configuration"
        );

        Ok(Self {
            static_keys,
            env,
            profile,
            shared_files,
            region,
            assume_role: config.assume_role.clone(),
            assume_role_with_web_identity: config.assume_role_with_web_identity.clone(),
            skip_credentials_validation: config.skip_credentials_validation,
            skip_requesting_account_id: config.skip_requesting_account_id,
            max_attempts,
            endpoints,
            use_fips_endpoint,
            use_dual_stack_endpoint,
            trace_http: config.trace_http,
        })
    }

    /// Name of the profile the shared-profile source reads.
    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }
}

fn profile_value<'a>(profile: Option<&'a Profile>, key: &str) -> Option<&'a str> {
    profile.and_then(|p| p.get(key))
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidConfiguration(format!("invalid value for {name}: {value:?}")))
}

fn resolve_flag(
    explicit: Option<bool>,
    env: &Env,
    env_name: &str,
    profile: Option<&Profile>,
    key: &str,
) -> Result<bool> {
    if let Some(value) = explicit {
        return Ok(value);
    }
    if let Some(value) = env.get(env_name) {
        return parse_bool(env_name, value);
    }
    match profile_value(profile, key) {
        Some(value) => parse_bool(key, value),
        None => Ok(false),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::InvalidConfiguration(format!(
            "invalid value for {name}: {value:?} (expected true or false)"
        ))),
    }
}

/// Expand `~` and `$VAR`/`${VAR}` in a path using the environment snapshot.
/// Unknown variables are left as written.
pub fn expand_path(path: &Path, env: &Env) -> PathBuf {
    let raw = path.to_string_lossy();
    let home = env.home_dir().map(|h| h.to_string_lossy().into_owned());
    let expanded: Cow<'_, str> =
        shellexpand::full_with_context_no_errors(raw.as_ref(), || home, |var: &str| {
            env.get(var).map(str::to_string)
        });
    PathBuf::from(expanded.as_ref())
}
