//! Ordered credential source chain.
//!
//! [`sources`] lists every source that applies to a resolved configuration,
//! highest precedence first. [`CredentialChain::resolve`] walks that list and
//! stops at the first source that yields credentials. A source that fails is
//! a hard stop; only a source with nothing to offer falls through.

use std::{fmt, path::PathBuf};

use tracing::{debug, info};

use super::client::{DelegateProvider, DelegateSource};
use super::profile::{Profile, SharedFiles};
use super::sts::{Authenticator, materialize_web_identity_token};
use super::{CredentialOrigin, Credentials};
use crate::config::{AssumeRoleSpec, AssumeRoleWithWebIdentitySpec, ResolvedConfig};
use crate::constants::{
    ENV_ACCESS_KEY_ID, ENV_SECRET_ACCESS_KEY, ENV_SESSION_TOKEN, MAX_PROFILE_CHAIN_LENGTH,
};
use crate::env::Env;
use crate::error::{Error, Result};

#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Keys given directly in the configuration.
    Static {
        access_key: String,
        secret_key: String,
        token: Option<String>,
    },
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
    Environment,
    SharedProfile { name: String, files: Vec<PathBuf> },
    /// A web identity token already read from its inline value or file.
    InlineWebIdentityToken { jwt: String },
    DefaultChain,
}

impl CredentialSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Static { .. } => "static credentials",
            Self::Environment => "environment variables",
            Self::SharedProfile { .. } => "shared profile",
            Self::InlineWebIdentityToken { .. } => "web identity token",
            Self::DefaultChain => "default chain",
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .finish_non_exhaustive(),
            Self::Environment => f.write_str("Environment"),
            Self::SharedProfile { name, files } => f
                .debug_struct("SharedProfile")
                .field("name", name)
                .field("files", files)
                .finish(),
            Self::InlineWebIdentityToken { .. } => {
                f.debug_struct("InlineWebIdentityToken").finish_non_exhaustive()
            }
            Self::DefaultChain => f.write_str("DefaultChain"),
        }
    }
}

/// Sources applicable to `config`, highest precedence first.
///
/// A configured web identity role comes first: it needs no base credentials,
/// and its token is read here so that a missing token fails before any
/// network call.
pub async fn sources(config: &ResolvedConfig) -> Result<Vec<CredentialSource>> {
    let mut sources = Vec::new();

    if let Some(spec) = &config.assume_role_with_web_identity {
        spec.validate()?;
        let jwt = materialize_web_identity_token(spec, &config.env).await?;
        sources.push(CredentialSource::InlineWebIdentityToken { jwt });
    }

    if let Some(keys) = &config.static_keys {
        sources.push(CredentialSource::Static {
            access_key: keys.access_key.clone(),
            secret_key: keys.secret_key.clone(),
            token: keys.token.clone(),
        });
    }

    sources.push(CredentialSource::Environment);
    sources.push(CredentialSource::SharedProfile {
        name: config.profile_name().to_string(),
        files: config.shared_files.paths().to_vec(),
    });
    sources.push(CredentialSource::DefaultChain);

    Ok(sources)
}

pub struct CredentialChain<'a> {
    config: &'a ResolvedConfig,
    authenticator: &'a Authenticator,
    delegate: &'a dyn DelegateProvider,
}

impl<'a> CredentialChain<'a> {
    pub fn new(
        config: &'a ResolvedConfig,
        authenticator: &'a Authenticator,
        delegate: &'a dyn DelegateProvider,
    ) -> Self {
        Self {
            config,
            authenticator,
            delegate,
        }
    }

    /// Credentials from the first source that has any.
    pub async fn resolve(&self) -> Result<Credentials> {
        for source in sources(self.config).await? {
            debug!("Trying credential source: {}", source.name());
            if let Some(creds) = self.evaluate(&source).await? {
                info!("Using credentials from {} ({})", source.name(), creds.origin);
                return Ok(creds);
            }
        }

        Err(Error::NoValidCredentialSources { detail: None })
    }

    /// `Ok(None)` means the source has nothing to offer.
    pub async fn evaluate(&self, source: &CredentialSource) -> Result<Option<Credentials>> {
        match source {
            CredentialSource::Static {
                access_key,
                secret_key,
                token,
            } => Ok(Some(Credentials::new(
                access_key,
                secret_key,
                token.clone(),
                CredentialOrigin::Static,
            ))),
            CredentialSource::Environment => Ok(environment_credentials(&self.config.env)),
            CredentialSource::SharedProfile { name, .. } => self.evaluate_profile(name).await,
            CredentialSource::InlineWebIdentityToken { jwt } => {
                let Some(spec) = &self.config.assume_role_with_web_identity else {
                    return Ok(None);
                };
                let creds = self
                    .authenticator
                    .assume_role_with_web_identity(spec, jwt.clone())
                    .await?;
                Ok(Some(creds))
            }
            CredentialSource::DefaultChain => {
                self.delegate.provide(DelegateSource::DefaultChain).await
            }
        }
    }

    async fn evaluate_profile(&self, name: &str) -> Result<Option<Credentials>> {
        if !self.config.shared_files.contains(name) {
            debug!("Profile {} not present in shared files", name);
            return Ok(None);
        }

        let chain = plan_profile(&self.config.shared_files, name)?;
        let mut creds = match chain.base {
            ProfileBase::Empty => {
                debug!("Profile {} has no credentials", name);
                return Ok(None);
            }
            ProfileBase::Static(creds) => creds,
            ProfileBase::Environment { profile } => environment_credentials(&self.config.env)
                .ok_or_else(|| {
                    Error::session_configuration(
                        profile,
                        "credential_source is Environment but no credentials are set in the environment",
                    )
                })?,
            ProfileBase::Delegate { profile, source } => {
                self.delegate.provide(source).await?.ok_or_else(|| {
                    Error::NoValidCredentialSources {
                        detail: Some(format!(
                            "credential_source {} of profile {profile:?} provided no credentials",
                            source.as_str()
                        )),
                    }
                })?
            }
            ProfileBase::WebIdentity(spec) => {
                let token = materialize_web_identity_token(&spec, &self.config.env).await?;
                self.authenticator
                    .assume_role_with_web_identity(&spec, token)
                    .await?
            }
        };

        for role in &chain.roles {
            creds = self.authenticator.assume_role(&creds, role).await?;
        }

        Ok(Some(creds))
    }
}

fn environment_credentials(env: &Env) -> Option<Credentials> {
    let access_key = env.get(ENV_ACCESS_KEY_ID);
    let secret_key = env.get(ENV_SECRET_ACCESS_KEY);

    match (access_key, secret_key) {
        (Some(access_key), Some(secret_key)) => Some(Credentials::new(
            access_key,
            secret_key,
            env.get(ENV_SESSION_TOKEN).map(str::to_string),
            CredentialOrigin::Environment,
        )),
        (Some(_), None) | (None, Some(_)) => {
            debug!("Ignoring incomplete credentials in environment");
            None
        }
        (None, None) => None,
    }
}

/// Where a profile chain gets its first credentials.
#[derive(Debug, Clone, PartialEq)]
enum ProfileBase {
    Static(Credentials),
    Environment { profile: String },
    Delegate { profile: String, source: DelegateSource },
    WebIdentity(AssumeRoleWithWebIdentitySpec),
    Empty,
}

/// A profile reduced to its base credentials plus the roles to assume on
/// top of them, innermost first.
#[derive(Debug, Clone, PartialEq)]
struct ProfileChain {
    base: ProfileBase,
    roles: Vec<AssumeRoleSpec>,
}

fn plan_profile(files: &SharedFiles, name: &str) -> Result<ProfileChain> {
    let mut visited: Vec<&str> = Vec::new();
    let mut roles = Vec::new();
    let mut current = name;

    let base = loop {
        if visited.contains(&current) {
            visited.push(current);
            return Err(Error::session_configuration(
                name,
                format!("source_profile cycle: {}", visited.join(" -> ")),
            ));
        }
        if visited.len() >= MAX_PROFILE_CHAIN_LENGTH {
            return Err(Error::session_configuration(
                name,
                format!("source_profile chain longer than {MAX_PROFILE_CHAIN_LENGTH} profiles"),
            ));
        }
        visited.push(current);

        let profile = files.profile(current).ok_or_else(|| Error::InvalidProfile {
            profile: current.to_string(),
            files: files.paths().to_vec(),
        })?;
        let is_source = current != name;

        let Some(role_arn) = profile.get("role_arn") else {
            if profile.get("source_profile").is_some() || profile.get("credential_source").is_some()
            {
                return Err(Error::session_configuration(
                    current,
                    "source_profile and credential_source require role_arn",
                ));
            }
            if profile.get("web_identity_token_file").is_some() {
                return Err(Error::session_configuration(
                    current,
                    "web_identity_token_file requires role_arn",
                ));
            }
            match static_credentials(profile)? {
                Some(creds) => break ProfileBase::Static(creds),
                None if is_source => {
                    return Err(Error::session_configuration(
                        current,
                        "source profile has no credentials",
                    ));
                }
                None => break ProfileBase::Empty,
            }
        };

        let source_profile = profile.get("source_profile");
        let credential_source = profile.get("credential_source");
        let token_file = profile.get("web_identity_token_file");

        if [source_profile.is_some(), credential_source.is_some(), token_file.is_some()]
            .iter()
            .filter(|set| **set)
            .count()
            > 1
        {
            return Err(Error::session_configuration(
                current,
                "only one of source_profile, credential_source and web_identity_token_file may be set",
            ));
        }

        if let Some(token_file) = token_file {
            break ProfileBase::WebIdentity(AssumeRoleWithWebIdentitySpec {
                role_arn: role_arn.to_string(),
                session_name: profile.get("role_session_name").map(str::to_string),
                web_identity_token_file: Some(PathBuf::from(token_file)),
                duration: profile_duration(profile)?,
                ..Default::default()
            });
        }

        roles.push(profile_role(profile, role_arn)?);

        if let Some(source) = credential_source {
            let profile = current.to_string();
            break match source {
                "Environment" => ProfileBase::Environment { profile },
                "Ec2InstanceMetadata" => ProfileBase::Delegate {
                    profile,
                    source: DelegateSource::Ec2InstanceMetadata,
                },
                "EcsContainer" => ProfileBase::Delegate {
                    profile,
                    source: DelegateSource::EcsContainer,
                },
                other => {
                    return Err(Error::session_configuration(
                        current,
                        format!("unsupported credential_source {other:?}"),
                    ));
                }
            };
        }

        match source_profile {
            // A profile may name itself to use its own keys as the base.
            Some(source) if source == current => match static_credentials(profile)? {
                Some(creds) => break ProfileBase::Static(creds),
                None => {
                    return Err(Error::session_configuration(
                        current,
                        "profile is its own source_profile but has no credentials",
                    ));
                }
            },
            Some(source) => current = source,
            None => {
                return Err(Error::session_configuration(
                    current,
                    "role_arn requires source_profile, credential_source or web_identity_token_file",
                ));
            }
        }
    };

    roles.reverse();
    Ok(ProfileChain { base, roles })
}

fn static_credentials(profile: &Profile) -> Result<Option<Credentials>> {
    match (
        profile.get("aws_access_key_id"),
        profile.get("aws_secret_access_key"),
    ) {
        (Some(access_key), Some(secret_key)) => Ok(Some(Credentials::new(
            access_key,
            secret_key,
            profile.get("aws_session_token").map(str::to_string),
            CredentialOrigin::SharedProfile,
        ))),
        (None, None) => Ok(None),
        _ => Err(Error::session_configuration(
            profile.name(),
            "aws_access_key_id and aws_secret_access_key must be set together",
        )),
    }
}

fn profile_role(profile: &Profile, role_arn: &str) -> Result<AssumeRoleSpec> {
    Ok(AssumeRoleSpec {
        role_arn: role_arn.to_string(),
        session_name: profile.get("role_session_name").map(str::to_string),
        external_id: profile.get("external_id").map(str::to_string),
        duration: profile_duration(profile)?,
        ..Default::default()
    })
}

fn profile_duration(profile: &Profile) -> Result<Option<std::time::Duration>> {
    profile
        .get("duration_seconds")
        .map(|value| {
            value
                .parse::<u64>()
                .map(std::time::Duration::from_secs)
                .map_err(|_| {
                    Error::session_configuration(
                        profile.name(),
                        format!("invalid duration_seconds {value:?}"),
                    )
                })
        })
        .transpose()
}
