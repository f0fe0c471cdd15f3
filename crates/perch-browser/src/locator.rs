use perch_core::resolver::PathResolver;
use perch_core::rules::{BrowserRule, Platform};
use std::path::{Path, PathBuf};

/// Locates a browser executable from a rule's candidate templates.
pub struct ExecutableLocator<'a> {
    resolver: &'a PathResolver,
    platform: Platform,
}

impl<'a> ExecutableLocator<'a> {
    pub fn new(resolver: &'a PathResolver) -> Self {
        Self::with_platform(resolver, Platform::current())
    }

    /// Use another platform's candidate list.
    pub fn with_platform(resolver: &'a PathResolver, platform: Platform) -> Self {
        Self { resolver, platform }
    }

    /// Find the executable, checking the override first, then the rule's
    /// candidates in order.
    ///
    /// A candidate containing a path separator is checked on disk. A bare
    /// name is looked up on `PATH`, and a miss there ends the search even
    /// if later candidates remain.
    pub fn locate(&self, rule: Option<&BrowserRule>, override_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = override_path.filter(|p| !p.as_os_str().is_empty()) {
            if path.exists() {
                return Some(path.to_path_buf());
            }
            tracing::debug!("Override path does not exist: {}", path.display());
        }

        let rule = rule?;
        for template in rule.exe_candidates.for_platform(self.platform) {
            let Some(candidate) = self.resolver.expand(template) else {
                continue;
            };

            if has_separator(&candidate) {
                let path = match self.resolver.resolve(template) {
                    Some(path) => path,
                    None => continue,
                };
                if path.exists() {
                    tracing::debug!("Found {} at {}", rule.id, path.display());
                    return Some(path);
                }
                continue;
            }

            return match which::which(candidate.trim()) {
                Ok(path) => {
                    tracing::debug!("Found {} on PATH at {}", rule.id, path.display());
                    Some(path)
                }
                Err(_) => {
                    tracing::debug!("{} not on PATH, giving up on {}", candidate, rule.id);
                    None
                }
            };
        }

        None
    }
}

fn has_separator(candidate: &str) -> bool {
    candidate.contains('/') || candidate.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_core::resolver::EnvRoots;
    use perch_core::rules::{PlatformPaths, RuleDefinition};

    fn rule_with(candidates: Vec<String>) -> BrowserRule {
        BrowserRule::try_from(RuleDefinition {
            id: "test".to_string(),
            exe_candidates: Some(PlatformPaths {
                linux: candidates,
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap()
    }

    fn resolver_for(home: &Path) -> PathResolver {
        PathResolver::new(EnvRoots {
            user_profile: Some(home.display().to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_locator_prefers_existing_override() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let resolver = PathResolver::default();
        let locator = ExecutableLocator::with_platform(&resolver, Platform::Linux);

        let found = locator.locate(None, Some(temp.path()));
        assert_eq!(found.as_deref(), Some(temp.path()));
    }

    #[test]
    fn test_locator_skips_missing_override() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("browser");
        std::fs::write(&exe, "").unwrap();

        let resolver = resolver_for(dir.path());
        let locator = ExecutableLocator::with_platform(&resolver, Platform::Linux);
        let rule = rule_with(vec!["${USERPROFILE}/browser".to_string()]);

        let found = locator.locate(Some(&rule), Some(Path::new("/nonexistent/browser")));
        assert_eq!(found, Some(exe));
    }

    #[test]
    fn test_locator_returns_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("second"), "").unwrap();
        std::fs::write(dir.path().join("third"), "").unwrap();

        let resolver = resolver_for(dir.path());
        let locator = ExecutableLocator::with_platform(&resolver, Platform::Linux);
        let rule = rule_with(vec![
            "${USERPROFILE}/first".to_string(),
            "%UNKNOWN%/second".to_string(),
            "${USERPROFILE}/second".to_string(),
            "${USERPROFILE}/third".to_string(),
        ]);

        for _ in 0..3 {
            assert_eq!(
                locator.locate(Some(&rule), None),
                Some(dir.path().join("second"))
            );
        }
    }

    #[test]
    fn test_bare_name_miss_stops_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("browser"), "").unwrap();

        let resolver = resolver_for(dir.path());
        let locator = ExecutableLocator::with_platform(&resolver, Platform::Linux);
        let rule = rule_with(vec![
            "perch-no-such-browser-binary".to_string(),
            "${USERPROFILE}/browser".to_string(),
        ]);

        assert_eq!(locator.locate(Some(&rule), None), None);
    }

    #[test]
    fn test_other_platform_candidates_are_ignored() {
        let resolver = PathResolver::default();
        let locator = ExecutableLocator::with_platform(&resolver, Platform::Other);
        let rule = rule_with(vec!["/bin/sh".to_string()]);

        assert_eq!(locator.locate(Some(&rule), None), None);
    }
}
