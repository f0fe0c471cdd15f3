use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
        }
    }
}

/// Operating systems a rule can carry templates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

/// Ordered path templates per platform, keyed the way rule files spell them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformPaths {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub win32: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub darwin: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linux: Vec<String>,
}

impl PlatformPaths {
    pub fn for_platform(&self, platform: Platform) -> &[String] {
        match platform {
            Platform::Windows => &self.win32,
            Platform::MacOs => &self.darwin,
            Platform::Linux => &self.linux,
            Platform::Other => &[],
        }
    }

    pub fn current(&self) -> &[String] {
        self.for_platform(Platform::current())
    }
}

/// How a profile selector is injected into a launch command line.
///
/// `{profileId}` in any template is replaced with the profile id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_arg: Option<String>,
    /// Used when the profile id is a name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile_arg_name: Vec<String>,
    /// Used when the profile id is an existing path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile_arg_path: Vec<String>,
}

/// Where to look for a Chromium profile's picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileImageRule {
    pub picture_files: Vec<String>,
    pub icon_files: Vec<String>,
    pub avatars_dir: String,
    pub avatars_extensions: Vec<String>,
}

impl Default for ProfileImageRule {
    fn default() -> Self {
        Self {
            picture_files: vec!["Profile Picture.png".to_string()],
            icon_files: vec!["Profile Picture.ico".to_string()],
            avatars_dir: "Avatars".to_string(),
            avatars_extensions: vec![".png".to_string()],
        }
    }
}

/// Engine-specific part of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEngine {
    Chromium { profile_image: ProfileImageRule },
    Firefox,
}

impl RuleEngine {
    fn new(kind: BrowserKind, profile_image: ProfileImageRule) -> Self {
        match kind {
            BrowserKind::Chromium => RuleEngine::Chromium { profile_image },
            BrowserKind::Firefox => RuleEngine::Firefox,
        }
    }
}

/// A validated description of how to find and drive one browser product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserRule {
    pub id: String,
    pub name: String,
    pub exe_candidates: PlatformPaths,
    pub user_data_dir: PlatformPaths,
    pub launch: LaunchRule,
    pub engine: RuleEngine,
}

impl BrowserRule {
    pub fn kind(&self) -> BrowserKind {
        match self.engine {
            RuleEngine::Chromium { .. } => BrowserKind::Chromium,
            RuleEngine::Firefox => BrowserKind::Firefox,
        }
    }

    pub fn profile_image(&self) -> Option<&ProfileImageRule> {
        match &self.engine {
            RuleEngine::Chromium { profile_image } => Some(profile_image),
            RuleEngine::Firefox => None,
        }
    }

    /// Layer a custom definition over this rule, one top-level key at a time.
    pub fn layered(&self, custom: &RuleDefinition) -> BrowserRule {
        let kind = custom.kind.unwrap_or_else(|| self.kind());
        let profile_image = custom
            .profile_image
            .clone()
            .or_else(|| self.profile_image().cloned())
            .unwrap_or_default();

        BrowserRule {
            id: self.id.clone(),
            name: custom.name.clone().unwrap_or_else(|| self.name.clone()),
            exe_candidates: custom
                .exe_candidates
                .clone()
                .unwrap_or_else(|| self.exe_candidates.clone()),
            user_data_dir: custom
                .user_data_dir
                .clone()
                .unwrap_or_else(|| self.user_data_dir.clone()),
            launch: custom.launch.clone().unwrap_or_else(|| self.launch.clone()),
            engine: RuleEngine::new(kind, profile_image),
        }
    }
}

/// A rule as written in JSON, either built-in or user supplied.
///
/// Everything except `id` may be omitted; omitted keys inherit from a
/// built-in rule with the same id, or take defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<BrowserKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe_candidates: Option<PlatformPaths>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data_dir: Option<PlatformPaths>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<ProfileImageRule>,
}

impl TryFrom<RuleDefinition> for BrowserRule {
    type Error = Error;

    fn try_from(def: RuleDefinition) -> Result<Self> {
        let id = def.id.trim().to_string();
        if id.is_empty() {
            return Err(Error::InvalidRule("missing-id".to_string()));
        }

        let kind = def.kind.unwrap_or_default();
        Ok(BrowserRule {
            name: def.name.unwrap_or_default(),
            exe_candidates: def.exe_candidates.unwrap_or_default(),
            user_data_dir: def.user_data_dir.unwrap_or_default(),
            launch: def.launch.unwrap_or_default(),
            engine: RuleEngine::new(kind, def.profile_image.unwrap_or_default()),
            id,
        })
    }
}
