//! Expansion of `%NAME%` / `${NAME}` placeholders in rule path templates.

use crate::paths::normalize;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::path::PathBuf;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"%([^%]+)%|\$\{([^}]+)\}").unwrap();
}

/// The fixed set of environment roots a template may reference.
///
/// Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvRoots {
    pub program_files: Option<String>,
    pub program_files_x86: Option<String>,
    pub local_app_data: Option<String>,
    pub roaming_app_data: Option<String>,
    pub user_profile: Option<String>,
}

impl EnvRoots {
    /// Read the roots from the process environment, falling back to the
    /// platform's conventional directories where a variable is missing.
    pub fn from_env() -> Self {
        let user_profile = env_var(&["USERPROFILE"])
            .or_else(|| match (env_var(&["HOMEDRIVE"]), env_var(&["HOMEPATH"])) {
                (Some(drive), Some(home)) => Some(format!("{}{}", drive, home)),
                _ => None,
            })
            .or_else(|| dirs::home_dir().map(|p| p.display().to_string()));

        let local_app_data = env_var(&["LOCALAPPDATA"])
            .or_else(|| fallback_app_data(user_profile.as_deref(), "Local"));
        let roaming_app_data = env_var(&["APPDATA"])
            .or_else(|| fallback_app_data(user_profile.as_deref(), "Roaming"));

        Self {
            program_files: env_var(&["ProgramFiles", "PROGRAMFILES"]),
            program_files_x86: env_var(&["ProgramFiles(x86)", "PROGRAMFILES(X86)"]),
            local_app_data,
            roaming_app_data,
            user_profile,
        }
    }

    /// Look up a placeholder name, case-insensitively.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        let value = match key.trim().to_ascii_uppercase().as_str() {
            "PROGRAMFILES" => &self.program_files,
            "PROGRAMFILES(X86)" | "PROGRAMFILES_X86" => &self.program_files_x86,
            "LOCALAPPDATA" => &self.local_app_data,
            "APPDATA" | "ROAMINGAPPDATA" => &self.roaming_app_data,
            "USERPROFILE" | "HOME" => &self.user_profile,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }
}

fn env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|value| !value.trim().is_empty())
}

#[cfg(windows)]
fn fallback_app_data(user_profile: Option<&str>, leaf: &str) -> Option<String> {
    user_profile.map(|home| {
        PathBuf::from(home)
            .join("AppData")
            .join(leaf)
            .display()
            .to_string()
    })
}

#[cfg(not(windows))]
fn fallback_app_data(_user_profile: Option<&str>, leaf: &str) -> Option<String> {
    let dir = if leaf == "Local" {
        dirs::data_local_dir()
    } else {
        dirs::config_dir()
    };
    dir.map(|p| p.display().to_string())
}

/// Turns rule templates into absolute paths.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    roots: EnvRoots,
}

impl PathResolver {
    pub fn new(roots: EnvRoots) -> Self {
        Self { roots }
    }

    pub fn from_env() -> Self {
        Self::new(EnvRoots::from_env())
    }

    pub fn roots(&self) -> &EnvRoots {
        &self.roots
    }

    /// Substitute every placeholder in `template`.
    ///
    /// Returns `None` when the template is empty or any placeholder is
    /// unknown or unset; a template is never partially expanded.
    pub fn expand(&self, template: &str) -> Option<String> {
        if template.trim().is_empty() {
            return None;
        }

        let mut unresolved = false;
        let expanded = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            match self.roots.lookup(key) {
                Some(value) => value.to_string(),
                None => {
                    unresolved = true;
                    String::new()
                }
            }
        });

        if unresolved {
            tracing::debug!("Unresolvable path template: {}", template);
            return None;
        }

        Some(expanded.into_owned())
    }

    /// Expand and normalize a template into a filesystem path.
    pub fn resolve(&self, template: &str) -> Option<PathBuf> {
        let expanded = self.expand(template)?;
        Some(normalize(&PathBuf::from(native_separators(&expanded))))
    }
}

#[cfg(windows)]
fn native_separators(raw: &str) -> String {
    raw.to_string()
}

#[cfg(not(windows))]
fn native_separators(raw: &str) -> String {
    raw.replace('\\', "/")
}
