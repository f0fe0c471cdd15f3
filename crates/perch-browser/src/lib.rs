pub mod bookmarks;
pub mod chromium;
pub mod copy;
pub mod engine;
pub mod error;
pub mod firefox;
pub mod ini;
pub mod launcher;
pub mod lifecycle;
pub mod locator;
pub mod size;
pub mod size_cache;
pub mod size_worker;
pub mod undo;

pub use bookmarks::{Bookmark, BookmarkList, DEFAULT_BOOKMARK_LIMIT};
pub use engine::{
    DeleteReport, DeletedItem, DuplicateOutcome, Engine, ProfileRef, RestoreReport, RestoredItem,
    RulePreview, RuleValidation,
};
pub use error::{Error, Result};
pub use launcher::BrowserLauncher;
pub use lifecycle::CopyOptions;
pub use size_cache::SizeReport;
pub use undo::DEFAULT_UNDO_TTL;
