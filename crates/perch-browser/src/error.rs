use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown browser: {0}")]
    UnknownBrowser(String),

    #[error("User data directory not found")]
    MissingUserDataDir,

    #[error("Missing profile id")]
    MissingProfileId,

    #[error("Source profile directory not found: {}", .0.display())]
    MissingSourceProfileDir(PathBuf),

    #[error("Source profile directory is outside its root: {}", .0.display())]
    InvalidSourceProfileDir(PathBuf),

    #[error("Profile directory not found: {}", .0.display())]
    MissingProfileDir(PathBuf),

    #[error("Profile directory is outside its root: {}", .0.display())]
    InvalidProfileDir(PathBuf),

    #[error("Profile name must not be empty")]
    MissingName,

    #[error("Profile path and name are required")]
    MissingInput,

    #[error("Could not read Preferences in: {}", .0.display())]
    InvalidPreferences(PathBuf),

    #[error("No Firefox profiles.ini found above: {}", .0.display())]
    MissingFirefoxBaseDir(PathBuf),

    #[error("profiles.ini not found in: {}", .0.display())]
    MissingProfilesIni(PathBuf),

    #[error("No profiles.ini entry for: {}", .0.display())]
    ProfileNotFound(PathBuf),

    #[error("Root and target paths are required")]
    MissingPath,

    #[error("Target is not inside its root: {}", .0.display())]
    InvalidTarget(PathBuf),

    #[error("Cannot restore, path already exists: {}", .0.display())]
    RestoreConflict(PathBuf),

    #[error("Trashed profile data not found: {}", .0.display())]
    MissingTrash(PathBuf),

    #[error("Nothing to undo: token unknown, already used or expired")]
    MissingUndo,

    #[error("Bookmarks file is not valid JSON: {}", .0.display())]
    InvalidBookmarks(PathBuf),

    #[error("Not supported for {0} profiles")]
    Unsupported(String),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] perch_core::Error),
}

impl Error {
    /// Stable kebab-case code reported to callers alongside per-item results.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnknownBrowser(_) => "unknown-browser",
            Error::MissingUserDataDir => "missing-user-data-dir",
            Error::MissingProfileId => "missing-profile-id",
            Error::MissingSourceProfileDir(_) => "missing-source-profile-dir",
            Error::InvalidSourceProfileDir(_) => "invalid-source-profile-dir",
            Error::MissingProfileDir(_) => "missing-profile-dir",
            Error::InvalidProfileDir(_) => "invalid-profile-dir",
            Error::MissingName => "missing-name",
            Error::MissingInput => "missing-input",
            Error::InvalidPreferences(_) => "invalid-preferences",
            Error::MissingFirefoxBaseDir(_) => "missing-firefox-base-dir",
            Error::MissingProfilesIni(_) => "missing-profiles-ini",
            Error::ProfileNotFound(_) => "profile-not-found",
            Error::MissingPath => "missing-path",
            Error::InvalidTarget(_) => "invalid-target",
            Error::RestoreConflict(_) => "restore-conflict",
            Error::MissingTrash(_) => "missing-trash",
            Error::MissingUndo => "missing-undo",
            Error::InvalidBookmarks(_) => "invalid-bookmarks-json",
            Error::Unsupported(_) => "unsupported",
            Error::Launch(_) => "launch-failed",
            Error::Io(_) => "io-failure",
            Error::Json(_) => "parse-failure",
            Error::Core(_) => "invalid-rule",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
