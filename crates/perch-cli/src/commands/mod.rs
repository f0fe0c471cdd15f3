pub mod bookmarks;
pub mod completion;
pub mod delete;
pub mod locate;
pub mod open;
pub mod profiles;
pub mod rules;
pub mod scan;
pub mod size;
