//! Layered AWS credential resolution.
//!
//! Build a [`Config`], hand it to a [`Resolver`] and get back a [`Session`]
//! holding cached credentials, the region, and the account and partition
//! they belong to.

pub mod aws;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod retry;
pub mod session;
pub mod time;
pub mod trace;

pub use aws::identity::ResolvedIdentity;
pub use aws::{CredentialOrigin, Credentials, ProvideCredentials};
pub use config::{AssumeRoleSpec, AssumeRoleWithWebIdentitySpec, Config};
pub use env::Env;
pub use error::{ApiError, ApiErrorKind, Error, ErrorKind, Result};
pub use retry::RetryPolicy;
pub use session::{Clients, Resolver, Session};
