use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;

use crate::commands::{CompletionsCommand, CredentialsCommand, WhoamiCommand};
use crate::config::{AssumeRoleSpec, AssumeRoleWithWebIdentitySpec, Config};
use crate::session::{Resolver, Session};

#[derive(Debug, Clone, Parser)]
#[command(name = "awsbase", version, about = "Resolve AWS credentials and show who you are", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub session: SessionArgs,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Show the resolved account, partition and caller identity")]
    Whoami(WhoamiCommand),
    #[command(about = "Print the resolved credentials")]
    Credentials(CredentialsCommand),
    #[command(about = "Generate shell completion scripts for awsbase")]
    Completions(CompletionsCommand),
}

/// Flags shared by every command that resolves a session.
#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
    #[arg(short = 'p', long, global = true, help = "AWS profile name")]
    pub profile: Option<String>,

    #[arg(long, global = true, help = "AWS region")]
    pub region: Option<String>,

    #[arg(long, global = true, help = "Static access key id")]
    pub access_key_id: Option<String>,

    #[arg(long, global = true, help = "Static secret access key")]
    pub secret_access_key: Option<String>,

    #[arg(long, global = true, help = "Static session token")]
    pub session_token: Option<String>,

    #[arg(long, global = true, help = "IAM role to assume after resolving base credentials")]
    pub role_arn: Option<String>,

    #[arg(long, global = true, requires = "role_arn", help = "Session name for --role-arn")]
    pub role_session_name: Option<String>,

    #[arg(long, global = true, requires = "role_arn", help = "External id for --role-arn")]
    pub external_id: Option<String>,

    #[arg(long, global = true, requires = "role_arn", help = "Session duration for --role-arn")]
    pub duration_seconds: Option<u64>,

    #[arg(long, global = true, help = "IAM role to assume with a web identity token")]
    pub web_identity_role_arn: Option<String>,

    #[arg(long, global = true, requires = "web_identity_role_arn", conflicts_with = "web_identity_token_file", help = "Web identity token (JWT)")]
    pub web_identity_token: Option<String>,

    #[arg(long, global = true, requires = "web_identity_role_arn", help = "File holding the web identity token")]
    pub web_identity_token_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Shared config file (repeatable)")]
    pub shared_config_file: Vec<PathBuf>,

    #[arg(long, global = true, help = "Shared credentials file (repeatable)")]
    pub shared_credentials_file: Vec<PathBuf>,

    #[arg(long, global = true, help = "Custom STS endpoint URL")]
    pub sts_endpoint: Option<String>,

    #[arg(long, global = true, help = "Custom IAM endpoint URL")]
    pub iam_endpoint: Option<String>,

    #[arg(long, global = true, help = "Maximum attempts per network call")]
    pub max_attempts: Option<u32>,

    #[arg(long, global = true, help = "Skip STS GetCallerIdentity validation")]
    pub skip_validation: bool,

    #[arg(long, global = true, help = "Skip IAM account id lookups")]
    pub skip_account_lookup: bool,

    #[arg(long, global = true, help = "Log redacted STS/IAM HTTP traffic")]
    pub trace_http: bool,

    #[arg(long, global = true, help = "Give up resolving after this many seconds")]
    pub timeout_seconds: Option<u64>,
}

impl SessionArgs {
    pub fn to_config(&self) -> Result<Config> {
        let mut config = Config {
            profile: self.profile.clone(),
            region: self.region.clone(),
            shared_config_files: self.shared_config_file.clone(),
            shared_credentials_files: self.shared_credentials_file.clone(),
            skip_credentials_validation: self.skip_validation,
            skip_requesting_account_id: self.skip_account_lookup,
            max_attempts: self.max_attempts,
            sts_endpoint: self.sts_endpoint.clone(),
            iam_endpoint: self.iam_endpoint.clone(),
            trace_http: self.trace_http,
            ..Default::default()
        };

        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                config = config.with_static_credentials(
                    access_key,
                    secret_key,
                    self.session_token.clone(),
                );
            }
            (None, None) => {}
            _ => bail!("--access-key-id and --secret-access-key must be given together"),
        }

        if let Some(role_arn) = &self.role_arn {
            config = config.with_assume_role(AssumeRoleSpec {
                session_name: self.role_session_name.clone(),
                external_id: self.external_id.clone(),
                duration: self.duration_seconds.map(Duration::from_secs),
                ..AssumeRoleSpec::new(role_arn)
            });
        }

        if let Some(role_arn) = &self.web_identity_role_arn {
            if self.web_identity_token.is_none() && self.web_identity_token_file.is_none() {
                bail!("--web-identity-role-arn needs --web-identity-token or --web-identity-token-file");
            }
            config.assume_role_with_web_identity = Some(AssumeRoleWithWebIdentitySpec {
                web_identity_token: self.web_identity_token.clone(),
                web_identity_token_file: self.web_identity_token_file.clone(),
                ..AssumeRoleWithWebIdentitySpec::new(role_arn)
            });
        }

        Ok(config)
    }

    /// Resolve a session from the flags and the process environment.
    pub async fn resolve(&self) -> Result<Session> {
        let config = self.to_config()?;
        debug!("Resolving session with {:?}", config);

        let resolver = Resolver::new(config);
        let session = match self.timeout_seconds {
            Some(seconds) => {
                resolver
                    .resolve_with_timeout(Duration::from_secs(seconds))
                    .await
            }
            None => resolver.resolve().await,
        };
        session.context("Failed to resolve AWS credentials")
    }
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let command = self
            .command
            .unwrap_or(Commands::Whoami(WhoamiCommand::default()));

        match command {
            Commands::Whoami(cmd) => cmd.execute(&self.session).await,
            Commands::Credentials(cmd) => cmd.execute(&self.session).await,
            Commands::Completions(cmd) => cmd.execute(),
        }
    }
}
