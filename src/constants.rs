use std::{path::PathBuf, time::Duration};

use crate::env::Env;

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// AWS credentials file name
pub const AWS_CREDENTIALS_FILE_NAME: &str = "credentials";

/// Profile used when none is named
pub const DEFAULT_PROFILE: &str = "default";

/// Default AWS region for STS operations when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Default role session duration
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(3600);

/// Prefix of generated role session names
pub const SESSION_NAME_PREFIX: &str = "awsbase";

/// Longest `source_profile` chain followed before giving up
pub const MAX_PROFILE_CHAIN_LENGTH: usize = 16;

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ENV_PROFILE: &str = "AWS_PROFILE";
pub const ENV_DEFAULT_PROFILE: &str = "AWS_DEFAULT_PROFILE";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_CONFIG_FILE: &str = "AWS_CONFIG_FILE";
pub const ENV_SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";
pub const ENV_MAX_ATTEMPTS: &str = "AWS_MAX_ATTEMPTS";
pub const ENV_ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";
pub const ENV_ENDPOINT_URL_STS: &str = "AWS_ENDPOINT_URL_STS";
pub const ENV_ENDPOINT_URL_IAM: &str = "AWS_ENDPOINT_URL_IAM";
pub const ENV_USE_FIPS_ENDPOINT: &str = "AWS_USE_FIPS_ENDPOINT";
pub const ENV_USE_DUALSTACK_ENDPOINT: &str = "AWS_USE_DUALSTACK_ENDPOINT";

/// Get the AWS config file path
/// Respects AWS_CONFIG_FILE if set
pub fn get_aws_config_path(env: &Env) -> Option<PathBuf> {
    if let Some(path) = env.get(ENV_CONFIG_FILE) {
        return Some(PathBuf::from(path));
    }

    env.home_dir()
        .map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CONFIG_FILE_NAME))
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE if set
pub fn get_aws_credentials_path(env: &Env) -> Option<PathBuf> {
    if let Some(path) = env.get(ENV_SHARED_CREDENTIALS_FILE) {
        return Some(PathBuf::from(path));
    }

    env.home_dir()
        .map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CREDENTIALS_FILE_NAME))
}
