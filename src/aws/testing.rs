//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use aws_smithy_types::DateTime;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{EnvFilter, fmt::MakeWriter};

use super::client::{
    AssumeRoleRequest, AssumeRoleWithWebIdentityRequest, CallerIdentity, DelegateProvider,
    DelegateSource, IamApi, IssuedCredentials, OP_GET_USER, StsApi,
};
use super::partition::Arn;
use super::{CredentialOrigin, Credentials};
use crate::error::{ApiError, Result};
use crate::time::TimeSource;

pub(crate) const MOCK_USER_ARN: &str = "arn:aws:iam::123456789012:user/tester";

#[derive(Debug, Default)]
struct StsCalls {
    assume_role: Vec<(String, AssumeRoleRequest)>,
    web_identity: Vec<AssumeRoleWithWebIdentityRequest>,
    caller_identity: Vec<String>,
}

/// STS stand-in. Issued credentials report an assumed-role ARN in the role's
/// account, and GetCallerIdentity echoes the principal of the credentials it
/// is called with.
#[derive(Debug, Default)]
pub(crate) struct MockSts {
    assume_role_error: Option<ApiError>,
    web_identity_error: Option<ApiError>,
    caller_identity_errors: Mutex<Vec<ApiError>>,
    caller_identity_error: Option<ApiError>,
    expiration: Option<DateTime>,
    issued: AtomicUsize,
    calls: Mutex<StsCalls>,
}

impl MockSts {
    pub(crate) fn fail_assume_role(mut self, error: ApiError) -> Self {
        self.assume_role_error = Some(error);
        self
    }

    pub(crate) fn fail_web_identity(mut self, error: ApiError) -> Self {
        self.web_identity_error = Some(error);
        self
    }

    pub(crate) fn fail_caller_identity(mut self, error: ApiError) -> Self {
        self.caller_identity_error = Some(error);
        self
    }

    /// Fail the next calls with these errors, in order, then succeed.
    pub(crate) fn fail_caller_identity_times(self, errors: Vec<ApiError>) -> Self {
        *self.caller_identity_errors.lock().unwrap() = errors;
        self
    }

    pub(crate) fn with_expiration(mut self, expiration: DateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub(crate) fn assume_role_calls(&self) -> usize {
        self.calls.lock().unwrap().assume_role.len()
    }

    pub(crate) fn assume_role_requests(&self) -> Vec<AssumeRoleRequest> {
        let calls = self.calls.lock().unwrap();
        calls.assume_role.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Access key the last AssumeRole call was signed with.
    pub(crate) fn last_assume_role_base(&self) -> Option<String> {
        let calls = self.calls.lock().unwrap();
        calls.assume_role.last().map(|(akid, _)| akid.clone())
    }

    pub(crate) fn web_identity_calls(&self) -> usize {
        self.calls.lock().unwrap().web_identity.len()
    }

    pub(crate) fn last_web_identity_token(&self) -> Option<String> {
        let calls = self.calls.lock().unwrap();
        calls
            .web_identity
            .last()
            .map(|r| r.web_identity_token.clone())
    }

    pub(crate) fn caller_identity_calls(&self) -> usize {
        self.calls.lock().unwrap().caller_identity.len()
    }

    fn issue(&self, role_arn: &str, session_name: &str) -> IssuedCredentials {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let assumed_role_arn = Arn::parse(role_arn).ok().map(|arn| {
            let role_name = arn.resource.rsplit('/').next().unwrap_or_default().to_string();
            format!(
                "arn:{}:sts::{}:assumed-role/{}/{}",
                arn.partition, arn.account_id, role_name, session_name
            )
        });

        IssuedCredentials {
            access_key_id: format!("ASIAMOCK{n:012}"),
            secret_access_key: format!("mock-secret-{n}"),
            session_token: format!("mock-session-token-{n}"),
            expiration: self
                .expiration
                .unwrap_or_else(|| DateTime::from_secs(4_102_444_800)),
            assumed_role_arn,
        }
    }
}

#[async_trait]
impl StsApi for MockSts {
    async fn assume_role(
        &self,
        credentials: &Credentials,
        request: &AssumeRoleRequest,
    ) -> std::result::Result<IssuedCredentials, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .assume_role
            .push((credentials.access_key_id.clone(), request.clone()));

        if let Some(error) = &self.assume_role_error {
            return Err(error.clone());
        }
        Ok(self.issue(&request.role_arn, &request.role_session_name))
    }

    async fn assume_role_with_web_identity(
        &self,
        request: &AssumeRoleWithWebIdentityRequest,
    ) -> std::result::Result<IssuedCredentials, ApiError> {
        self.calls.lock().unwrap().web_identity.push(request.clone());

        if let Some(error) = &self.web_identity_error {
            return Err(error.clone());
        }
        Ok(self.issue(&request.role_arn, &request.role_session_name))
    }

    async fn get_caller_identity(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<CallerIdentity, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .caller_identity
            .push(credentials.access_key_id.clone());

        {
            let mut queued = self.caller_identity_errors.lock().unwrap();
            if !queued.is_empty() {
                return Err(queued.remove(0));
            }
        }
        if let Some(error) = &self.caller_identity_error {
            return Err(error.clone());
        }

        let arn = credentials
            .principal_arn
            .clone()
            .unwrap_or_else(|| MOCK_USER_ARN.to_string());
        let account = Arn::parse(&arn)
            .ok()
            .and_then(|a| a.account().map(str::to_string))
            .unwrap_or_default();

        Ok(CallerIdentity {
            account,
            arn,
            user_id: "AIDAMOCKUSERID000001".to_string(),
        })
    }
}

/// IAM stand-in with fixed answers.
#[derive(Debug)]
pub(crate) struct MockIam {
    user: std::result::Result<String, ApiError>,
    roles: std::result::Result<Vec<String>, ApiError>,
    get_user_calls: AtomicUsize,
    list_roles_calls: AtomicUsize,
    list_roles_max_items: Mutex<Option<i32>>,
}

impl Default for MockIam {
    fn default() -> Self {
        Self {
            user: Ok(MOCK_USER_ARN.to_string()),
            roles: Ok(vec!["arn:aws:iam::123456789012:role/first".to_string()]),
            get_user_calls: AtomicUsize::new(0),
            list_roles_calls: AtomicUsize::new(0),
            list_roles_max_items: Mutex::new(None),
        }
    }
}

impl MockIam {
    pub(crate) fn with_user(mut self, user: std::result::Result<String, ApiError>) -> Self {
        self.user = user;
        self
    }

    pub(crate) fn with_roles(mut self, roles: std::result::Result<Vec<String>, ApiError>) -> Self {
        self.roles = roles;
        self
    }

    pub(crate) fn denied() -> Self {
        Self::default()
            .with_user(Err(ApiError::service(OP_GET_USER, "AccessDenied", "not authorized").with_status(403)))
            .with_roles(Err(ApiError::service("ListRoles", "AccessDenied", "not authorized").with_status(403)))
    }

    pub(crate) fn get_user_calls(&self) -> usize {
        self.get_user_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_roles_calls(&self) -> usize {
        self.list_roles_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_roles_max_items(&self) -> Option<i32> {
        *self.list_roles_max_items.lock().unwrap()
    }
}

#[async_trait]
impl IamApi for MockIam {
    async fn get_user(&self, _credentials: &Credentials) -> std::result::Result<String, ApiError> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        self.user.clone()
    }

    async fn list_roles(
        &self,
        _credentials: &Credentials,
        max_items: i32,
    ) -> std::result::Result<Vec<String>, ApiError> {
        self.list_roles_calls.fetch_add(1, Ordering::SeqCst);
        *self.list_roles_max_items.lock().unwrap() = Some(max_items);
        self.roles.clone()
    }
}

/// Default-chain stand-in keyed by source.
#[derive(Debug, Default)]
pub(crate) struct MockDelegate {
    credentials: HashMap<&'static str, Credentials>,
    calls: Mutex<Vec<DelegateSource>>,
}

impl MockDelegate {
    pub(crate) fn with(mut self, source: DelegateSource, access_key_id: &str) -> Self {
        self.credentials.insert(
            source.as_str(),
            Credentials::new(access_key_id, "delegate-secret", None, CredentialOrigin::DefaultChain),
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<DelegateSource> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DelegateProvider for MockDelegate {
    async fn provide(&self, source: DelegateSource) -> Result<Option<Credentials>> {
        self.calls.lock().unwrap().push(source);
        Ok(self.credentials.get(source.as_str()).cloned())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualTimeSource {
    now: Mutex<SystemTime>,
}

impl ManualTimeSource {
    pub(crate) fn new(now: SystemTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}

/// Collects formatted log lines written while its guard is held.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this crate's events at DEBUG and above, on this thread, into
    /// the buffer.
    pub(crate) fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_env_filter(EnvFilter::new("awsbase=debug"))
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
