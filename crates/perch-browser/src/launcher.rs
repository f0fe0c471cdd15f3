use crate::{Error, Result};
use lazy_static::lazy_static;
use perch_core::rules::LaunchRule;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use url::Url;

pub const HTML_EXTENSIONS: [&str; 4] = [".html", ".htm", ".mshtml", ".xhtml"];

lazy_static! {
    static ref URL_SCHEME: Regex = Regex::new(r"(?i)^(https?:|file:)").unwrap();
}

/// Turn a launch target into something a browser accepts on its command
/// line. URLs pass through; local paths and HTML files become `file://` URLs.
pub fn normalize_target(target: &str) -> String {
    let target = target.trim();
    if target.is_empty() || URL_SCHEME.is_match(target) {
        return target.to_string();
    }

    let lower = target.to_lowercase();
    let path = Path::new(target);
    let looks_like_path =
        path.is_absolute() || HTML_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
    if !looks_like_path {
        return target.to_string();
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => return target.to_string(),
        }
    };
    Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| target.to_string())
}

/// Starts a browser with a profile selected.
#[derive(Debug)]
pub struct BrowserLauncher {
    executable: PathBuf,
    args: Vec<String>,
}

impl BrowserLauncher {
    pub fn new(executable: PathBuf, launch: &LaunchRule, profile_id: Option<&str>, target: &str) -> Self {
        Self {
            executable,
            args: build_args(launch, profile_id, target),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Spawn the browser without waiting for it or keeping its output.
    pub fn launch(&self) -> Result<Child> {
        if let Ok(current) = std::env::current_exe() {
            if current == self.executable {
                return Err(Error::Launch("refusing to launch ourselves".to_string()));
            }
        }

        tracing::info!(
            "Launching {} {}",
            self.executable.display(),
            self.args.join(" ")
        );
        Command::new(&self.executable)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Launch(format!("{}: {}", self.executable.display(), e)))
    }
}

/// Profile selector arguments followed by the target, if any.
///
/// `profileArg` wins when set. Otherwise the path form is used when the
/// profile id names an existing path, and the name form when it does not.
pub fn build_args(launch: &LaunchRule, profile_id: Option<&str>, target: &str) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(profile_id) = profile_id.map(str::trim).filter(|id| !id.is_empty()) {
        if let Some(template) = launch.profile_arg.as_deref().filter(|t| !t.is_empty()) {
            args.push(template.replace("{profileId}", profile_id));
        } else {
            let templates = if Path::new(profile_id).exists() {
                &launch.profile_arg_path
            } else {
                &launch.profile_arg_name
            };
            args.extend(
                templates
                    .iter()
                    .map(|item| item.replace("{profileId}", profile_id)),
            );
        }
    }

    let url = normalize_target(target);
    if !url.is_empty() {
        args.push(url);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chromium_launch() -> LaunchRule {
        LaunchRule {
            profile_arg: Some("--profile-directory={profileId}".to_string()),
            ..Default::default()
        }
    }

    fn firefox_launch() -> LaunchRule {
        LaunchRule {
            profile_arg: None,
            profile_arg_name: vec!["-P".to_string(), "{profileId}".to_string()],
            profile_arg_path: vec!["-profile".to_string(), "{profileId}".to_string()],
        }
    }

    #[test]
    fn test_builds_chromium_args() {
        let args = build_args(&chromium_launch(), Some("Profile 2"), "https://example.com");
        assert_eq!(args, vec!["--profile-directory=Profile 2", "https://example.com"]);
    }

    #[test]
    fn test_firefox_uses_path_form_for_existing_dir() {
        let temp = tempfile::tempdir().unwrap();
        let profile = temp.path().display().to_string();

        let args = build_args(&firefox_launch(), Some(&profile), "");
        assert_eq!(args, vec!["-profile".to_string(), profile]);

        let args = build_args(&firefox_launch(), Some("work"), "");
        assert_eq!(args, vec!["-P", "work"]);
    }

    #[test]
    fn test_no_profile_only_target() {
        let args = build_args(&chromium_launch(), None, "http://a.test");
        assert_eq!(args, vec!["http://a.test"]);
        assert!(build_args(&chromium_launch(), Some(""), "").is_empty());
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("HTTPS://x.test/a"), "HTTPS://x.test/a");
        assert_eq!(normalize_target("file:///tmp/a.html"), "file:///tmp/a.html");
        assert_eq!(normalize_target("example.com"), "example.com");
        assert_eq!(normalize_target(""), "");

        #[cfg(unix)]
        assert_eq!(normalize_target("/tmp/my page.htm"), "file:///tmp/my%20page.htm");
    }

    #[test]
    fn test_relative_html_becomes_file_url() {
        let url = normalize_target("page.XHTML");
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/page.XHTML"));
    }

    #[test]
    fn test_launcher_keeps_args() {
        let launcher = BrowserLauncher::new(
            PathBuf::from("/usr/bin/google-chrome"),
            &chromium_launch(),
            Some("Default"),
            "",
        );
        assert_eq!(launcher.executable(), Path::new("/usr/bin/google-chrome"));
        assert_eq!(launcher.args(), ["--profile-directory=Default"]);
    }
}
