use std::{collections::HashMap, env, fmt, path::PathBuf};

/// Snapshot of the process environment.
///
/// Captured once at the start of resolution so that precedence decisions never
/// observe a variable changing mid-flight. Tests build one from a slice instead
/// of mutating the real environment.
#[derive(Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl Env {
    pub fn from_process() -> Self {
        Self {
            vars: env::vars().collect(),
            home: dirs::home_dir(),
        }
    }

    /// Build an environment from explicit pairs. `HOME` (or `USERPROFILE`)
    /// in the slice becomes the home directory.
    pub fn from_slice(vars: &[(&str, &str)]) -> Self {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let home = vars
            .get("HOME")
            .or_else(|| vars.get("USERPROFILE"))
            .map(PathBuf::from);

        Self { vars, home }
    }

    /// Empty values are treated as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First variable in `keys` that is set.
    pub fn first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn home_dir(&self) -> Option<&PathBuf> {
        self.home.as_ref()
    }
}

// Values are never printed: the snapshot holds secret keys.
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Env")
            .field("keys", &keys)
            .field("home", &self.home)
            .finish()
    }
}
