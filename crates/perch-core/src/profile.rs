use serde::{Deserialize, Serialize};

/// One user identity inside a browser installation.
///
/// For Chromium browsers `id` is the storage directory name (`Default`,
/// `Profile 3`); for Firefox it is the profile's absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    /// Inline `data:` URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaia_name: Option<String>,
}

/// Which image a Chromium profile should be shown with first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarPreference {
    #[default]
    Picture,
    Icon,
}

impl AvatarPreference {
    /// Anything other than `icon` (case-insensitive) means `picture`.
    pub fn parse_lossy(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("icon") {
            AvatarPreference::Icon
        } else {
            AvatarPreference::Picture
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AvatarPreference::Picture => "picture",
            AvatarPreference::Icon => "icon",
        }
    }
}
