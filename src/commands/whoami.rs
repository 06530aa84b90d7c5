use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tracing::warn;

use crate::aws::CredentialOrigin;
use crate::cli::SessionArgs;
use crate::session::Session;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Args)]
pub struct WhoamiCommand {
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text, help = "Output format")]
    pub output: OutputFormat,
}

/// What `whoami` prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhoamiReport {
    pub account_id: String,
    pub partition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub region: String,
    pub origin: CredentialOrigin,
}

impl WhoamiReport {
    pub fn from_session(session: &Session) -> Self {
        let caller = session.caller_identity();
        Self {
            account_id: session.account_id().to_string(),
            partition: session.partition().to_string(),
            arn: caller.map(|c| c.arn.clone()),
            user_id: caller.map(|c| c.user_id.clone()),
            region: session.region().to_string(),
            origin: session.origin(),
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize identity")
            }
            OutputFormat::Text => {
                let mut lines = vec![
                    format!("Account:   {}", display_or_unknown(&self.account_id)),
                    format!("Partition: {}", self.partition),
                ];
                if let Some(arn) = &self.arn {
                    lines.push(format!("ARN:       {arn}"));
                }
                if let Some(user_id) = &self.user_id {
                    lines.push(format!("UserId:    {user_id}"));
                }
                lines.push(format!("Region:    {}", self.region));
                lines.push(format!("Origin:    {}", self.origin));
                Ok(lines.join("\n"))
            }
        }
    }
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() { "(unknown)" } else { value }
}

impl WhoamiCommand {
    pub async fn execute(self, args: &SessionArgs) -> Result<()> {
        let session = args.resolve().await?;

        if let Some(error) = session.account_lookup_error() {
            warn!("{}", error);
        }

        println!("{}", WhoamiReport::from_session(&session).render(self.output)?);
        Ok(())
    }
}
