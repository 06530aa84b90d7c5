//! SDK-backed implementations of the collaborator traits.
//!
//! Clients are built per call from the credentials being used, with the SDK's
//! own retries disabled: every call already runs inside
//! [`RetryPolicy`](crate::retry::RetryPolicy).

use async_trait::async_trait;
use aws_config::{
    BehaviorVersion, Region, ecs::EcsCredentialsProvider,
    imds::credentials::ImdsCredentialsProvider, meta::credentials::CredentialsProviderChain,
    provider_config::ProviderConfig, web_identity_token::WebIdentityTokenCredentialsProvider,
};
use aws_credential_types::provider::{ProvideCredentials, error::CredentialsError};
use aws_sdk_sts::types::{PolicyDescriptorType, Tag};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use aws_smithy_types::retry::RetryConfig;
use tracing::debug;

use super::client::{
    AssumeRoleRequest, AssumeRoleWithWebIdentityRequest, CallerIdentity, DelegateProvider,
    DelegateSource, IamApi, IssuedCredentials, OP_ASSUME_ROLE, OP_ASSUME_ROLE_WITH_WEB_IDENTITY,
    OP_GET_CALLER_IDENTITY, OP_GET_USER, OP_LIST_ROLES, StsApi,
};
use super::{CredentialOrigin, Credentials};
use crate::config::{Endpoints, ResolvedConfig};
use crate::error::{ApiError, Error, Result};
use crate::trace::TraceInterceptor;

/// STS and IAM clients configured from a [`ResolvedConfig`].
#[derive(Debug, Clone)]
pub struct SdkClients {
    region: String,
    endpoints: Endpoints,
    use_fips: bool,
    use_dual_stack: bool,
    trace_http: bool,
}

impl SdkClients {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            region: config.region.clone(),
            endpoints: config.endpoints.clone(),
            use_fips: config.use_fips_endpoint,
            use_dual_stack: config.use_dual_stack_endpoint,
            trace_http: config.trace_http,
        }
    }

    fn sts(&self, credentials: Option<&Credentials>) -> aws_sdk_sts::Client {
        let mut builder = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .retry_config(RetryConfig::disabled())
            .use_fips(self.use_fips)
            .use_dual_stack(self.use_dual_stack);

        if let Some(creds) = credentials {
            builder = builder.credentials_provider(creds.to_sdk());
        }
        if let Some(endpoint) = &self.endpoints.sts {
            builder = builder.endpoint_url(endpoint);
        }
        if self.trace_http {
            builder = builder.interceptor(TraceInterceptor);
        }

        aws_sdk_sts::Client::from_conf(builder.build())
    }

    fn iam(&self, credentials: &Credentials) -> aws_sdk_iam::Client {
        let mut builder = aws_sdk_iam::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .retry_config(RetryConfig::disabled())
            .use_fips(self.use_fips)
            .use_dual_stack(self.use_dual_stack)
            .credentials_provider(credentials.to_sdk());

        if let Some(endpoint) = &self.endpoints.iam {
            builder = builder.endpoint_url(endpoint);
        }
        if self.trace_http {
            builder = builder.interceptor(TraceInterceptor);
        }

        aws_sdk_iam::Client::from_conf(builder.build())
    }
}

#[async_trait]
impl StsApi for SdkClients {
    async fn assume_role(
        &self,
        credentials: &Credentials,
        request: &AssumeRoleRequest,
    ) -> std::result::Result<IssuedCredentials, ApiError> {
        let tags = request
            .tags
            .as_ref()
            .map(|tags| {
                tags.iter()
                    .map(|(key, value)| {
                        Tag::builder()
                            .key(key)
                            .value(value)
                            .build()
                            .map_err(|e| ApiError::construction(OP_ASSUME_ROLE, e.to_string()))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .transpose()?;

        let output = self
            .sts(Some(credentials))
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.role_session_name)
            .duration_seconds(request.duration_seconds)
            .set_external_id(request.external_id.clone())
            .set_policy(request.policy.clone())
            .set_policy_arns(policy_descriptors(request.policy_arns.as_deref()))
            .set_tags(tags)
            .set_transitive_tag_keys(request.transitive_tag_keys.clone())
            .set_source_identity(request.source_identity.clone())
            .send()
            .await
            .map_err(|e| api_error(OP_ASSUME_ROLE, e))?;

        issued(
            OP_ASSUME_ROLE,
            output.credentials(),
            output.assumed_role_user().map(|u| u.arn().to_string()),
        )
    }

    async fn assume_role_with_web_identity(
        &self,
        request: &AssumeRoleWithWebIdentityRequest,
    ) -> std::result::Result<IssuedCredentials, ApiError> {
        let output = self
            .sts(None)
            .assume_role_with_web_identity()
            .role_arn(&request.role_arn)
            .role_session_name(&request.role_session_name)
            .web_identity_token(&request.web_identity_token)
            .duration_seconds(request.duration_seconds)
            .set_policy(request.policy.clone())
            .set_policy_arns(policy_descriptors(request.policy_arns.as_deref()))
            .send()
            .await
            .map_err(|e| api_error(OP_ASSUME_ROLE_WITH_WEB_IDENTITY, e))?;

        issued(
            OP_ASSUME_ROLE_WITH_WEB_IDENTITY,
            output.credentials(),
            output.assumed_role_user().map(|u| u.arn().to_string()),
        )
    }

    async fn get_caller_identity(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<CallerIdentity, ApiError> {
        let output = self
            .sts(Some(credentials))
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| api_error(OP_GET_CALLER_IDENTITY, e))?;

        Ok(CallerIdentity {
            account: output.account().unwrap_or_default().to_string(),
            arn: output.arn().unwrap_or_default().to_string(),
            user_id: output.user_id().unwrap_or_default().to_string(),
        })
    }
}

#[async_trait]
impl IamApi for SdkClients {
    async fn get_user(&self, credentials: &Credentials) -> std::result::Result<String, ApiError> {
        let output = self
            .iam(credentials)
            .get_user()
            .send()
            .await
            .map_err(|e| api_error(OP_GET_USER, e))?;

        output
            .user()
            .map(|user| user.arn().to_string())
            .ok_or_else(|| ApiError::response(OP_GET_USER, "response contained no user"))
    }

    async fn list_roles(
        &self,
        credentials: &Credentials,
        max_items: i32,
    ) -> std::result::Result<Vec<String>, ApiError> {
        let output = self
            .iam(credentials)
            .list_roles()
            .max_items(max_items)
            .send()
            .await
            .map_err(|e| api_error(OP_LIST_ROLES, e))?;

        Ok(output.roles().iter().map(|role| role.arn().to_string()).collect())
    }
}

fn policy_descriptors(arns: Option<&[String]>) -> Option<Vec<PolicyDescriptorType>> {
    arns.map(|arns| {
        arns.iter()
            .map(|arn| PolicyDescriptorType::builder().arn(arn).build())
            .collect()
    })
}

fn issued(
    operation: &'static str,
    credentials: Option<&aws_sdk_sts::types::Credentials>,
    assumed_role_arn: Option<String>,
) -> std::result::Result<IssuedCredentials, ApiError> {
    let creds = credentials
        .ok_or_else(|| ApiError::response(operation, "AWS STS returned no credentials"))?;

    Ok(IssuedCredentials {
        access_key_id: creds.access_key_id().to_string(),
        secret_access_key: creds.secret_access_key().to_string(),
        session_token: creds.session_token().to_string(),
        expiration: *creds.expiration(),
        assumed_role_arn,
    })
}

/// Detach an SDK error from its operation types.
pub(crate) fn api_error<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let meta = service.err();
            ApiError::service(
                operation,
                meta.code().unwrap_or("Unknown"),
                meta.message().map(str::to_string).unwrap_or(message),
            )
            .with_status(status)
        }
        SdkError::TimeoutError(_) => ApiError::timeout(operation, message),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            ApiError::timeout(operation, message)
        }
        SdkError::DispatchFailure(_) => ApiError::dispatch(operation, message),
        // The connection broke while the response was read; worth another try.
        SdkError::ResponseError(_) => ApiError::dispatch(operation, message),
        _ => ApiError::construction(operation, message),
    }
}

/// Credential sources implemented by `aws-config`.
#[derive(Debug, Clone)]
pub struct SdkDelegate {
    region: String,
}

impl SdkDelegate {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            region: config.region.clone(),
        }
    }

    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::without_region().with_region(Some(Region::new(self.region.clone())))
    }
}

#[async_trait]
impl DelegateProvider for SdkDelegate {
    async fn provide(&self, source: DelegateSource) -> Result<Option<Credentials>> {
        let conf = self.provider_config();
        debug!("Loading credentials from {}", source.as_str());

        let result = match source {
            DelegateSource::DefaultChain => {
                CredentialsProviderChain::first_try(
                    "WebIdentityToken",
                    WebIdentityTokenCredentialsProvider::builder()
                        .configure(&conf)
                        .build(),
                )
                .or_else(
                    "EcsContainer",
                    EcsCredentialsProvider::builder().configure(&conf).build(),
                )
                .or_else(
                    "Ec2InstanceMetadata",
                    ImdsCredentialsProvider::builder().configure(&conf).build(),
                )
                .provide_credentials()
                .await
            }
            DelegateSource::EcsContainer => {
                EcsCredentialsProvider::builder()
                    .configure(&conf)
                    .build()
                    .provide_credentials()
                    .await
            }
            DelegateSource::Ec2InstanceMetadata => {
                ImdsCredentialsProvider::builder()
                    .configure(&conf)
                    .build()
                    .provide_credentials()
                    .await
            }
        };

        match result {
            Ok(creds) => Ok(Some(Credentials::from_sdk(&creds, CredentialOrigin::DefaultChain))),
            Err(CredentialsError::CredentialsNotLoaded(_)) => {
                debug!("{} provided no credentials", source.as_str());
                Ok(None)
            }
            Err(e) => Err(Error::NoValidCredentialSources {
                detail: Some(format!(
                    "{}: {}",
                    source.as_str(),
                    DisplayErrorContext(&e)
                )),
            }),
        }
    }
}
