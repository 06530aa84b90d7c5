pub mod completions;
pub mod credentials;
pub mod whoami;

pub use completions::CompletionsCommand;
pub use credentials::{CredentialsCommand, CredentialsFormat};
pub use whoami::{OutputFormat, WhoamiCommand};
