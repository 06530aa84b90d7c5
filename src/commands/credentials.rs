use anyhow::{Context, Result};
use aws_smithy_types::date_time::Format;
use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::aws::Credentials;
use crate::cli::SessionArgs;

/// `credential_process` output schema version.
const PROCESS_OUTPUT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CredentialsFormat {
    /// Shell `export` lines
    #[default]
    Env,
    /// JSON for `credential_process`
    Process,
}

#[derive(Debug, Clone, Default, Args)]
pub struct CredentialsCommand {
    #[arg(short = 'f', long, value_enum, default_value_t = CredentialsFormat::Env, help = "Output format")]
    pub format: CredentialsFormat,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessOutput<'a> {
    version: u8,
    access_key_id: &'a str,
    secret_access_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration: Option<String>,
}

fn expiration(credentials: &Credentials) -> Result<Option<String>> {
    credentials
        .expiration
        .map(|e| e.fmt(Format::DateTime))
        .transpose()
        .context("Failed to format credential expiration")
}

pub fn render(credentials: &Credentials, region: &str, format: CredentialsFormat) -> Result<String> {
    let expiration = expiration(credentials)?;

    match format {
        CredentialsFormat::Env => {
            let mut lines = vec![
                format!("export AWS_ACCESS_KEY_ID={}", credentials.access_key_id),
                format!("export AWS_SECRET_ACCESS_KEY={}", credentials.secret_access_key),
            ];
            if let Some(token) = &credentials.session_token {
                lines.push(format!("export AWS_SESSION_TOKEN={token}"));
            }
            if let Some(expiration) = expiration {
                lines.push(format!("export AWS_CREDENTIAL_EXPIRATION={expiration}"));
            }
            lines.push(format!("export AWS_REGION={region}"));
            Ok(lines.join("\n"))
        }
        CredentialsFormat::Process => {
            let output = ProcessOutput {
                version: PROCESS_OUTPUT_VERSION,
                access_key_id: &credentials.access_key_id,
                secret_access_key: &credentials.secret_access_key,
                session_token: credentials.session_token.as_deref(),
                expiration,
            };
            serde_json::to_string_pretty(&output).context("Failed to serialize credentials")
        }
    }
}

impl CredentialsCommand {
    pub async fn execute(self, args: &SessionArgs) -> Result<()> {
        let session = args.resolve().await?;
        let credentials = session
            .credentials()
            .await
            .context("Failed to read resolved credentials")?;

        println!("{}", render(&credentials, session.region(), self.format)?);
        Ok(())
    }
}
