//! Key/value view of the shared AWS config and credentials files.
//!
//! Parsing is delegated to `rust-ini`; this module only maps sections onto
//! profile names and merges the files in precedence order.

use std::{collections::HashMap, path::PathBuf};

use ini::Ini;
use tracing::debug;

use crate::constants::DEFAULT_PROFILE;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Config,
    Credentials,
}

/// A single named profile, merged from every file that mentions it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    name: String,
    properties: HashMap<String, String>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Empty values are treated as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }
}

/// Every profile found in the shared files, plus the files that were consulted.
#[derive(Debug, Clone, Default)]
pub struct SharedFiles {
    profiles: HashMap<String, Profile>,
    paths: Vec<PathBuf>,
}

impl SharedFiles {
    /// Load the given files. Later files override earlier ones and credentials
    /// files override config files. Missing files are skipped.
    pub fn load(config_files: &[PathBuf], credentials_files: &[PathBuf]) -> Result<Self> {
        let mut files = Self::default();

        let ordered = config_files
            .iter()
            .map(|p| (p, FileKind::Config))
            .chain(credentials_files.iter().map(|p| (p, FileKind::Credentials)));

        for (path, kind) in ordered {
            files.paths.push(path.clone());

            if !path.exists() {
                debug!("Shared file not found, skipping: {}", path.display());
                continue;
            }

            let ini = Ini::load_from_file(path).map_err(|source| Error::SharedFile {
                path: path.clone(),
                source,
            })?;
            debug!("Loaded shared file: {}", path.display());
            files.merge(&ini, kind);
        }

        Ok(files)
    }

    /// Build the view from in-memory file contents.
    pub fn parse(config: &str, credentials: &str) -> Result<Self> {
        let mut files = Self::default();

        for (contents, kind, label) in [
            (config, FileKind::Config, "<config>"),
            (credentials, FileKind::Credentials, "<credentials>"),
        ] {
            let ini = Ini::load_from_str(contents).map_err(|e| Error::SharedFile {
                path: PathBuf::from(label),
                source: ini::Error::Parse(e),
            })?;
            files.merge(&ini, kind);
        }

        Ok(files)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn merge(&mut self, ini: &Ini, kind: FileKind) {
        for (section, properties) in ini.iter() {
            let Some(name) = section.and_then(|s| profile_name(s, kind)) else {
                continue;
            };

            let profile = self
                .profiles
                .entry(name.to_string())
                .or_insert_with(|| Profile::new(name));

            for (key, value) in properties.iter() {
                profile.set(key.trim(), value.trim());
            }
        }
    }
}

/// Map a section header onto a profile name.
///
/// The config file uses `[default]` and `[profile NAME]`; other prefixed
/// sections (`sso-session`, `services`) are not profiles. The credentials file
/// uses bare names.
fn profile_name(section: &str, kind: FileKind) -> Option<&str> {
    let section = section.trim();
    match kind {
        FileKind::Credentials => Some(section).filter(|s| !s.is_empty()),
        FileKind::Config if section == DEFAULT_PROFILE => Some(section),
        FileKind::Config => section
            .strip_prefix("profile")
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(str::trim)
            .filter(|s| !s.is_empty()),
    }
}
