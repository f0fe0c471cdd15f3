pub mod config;
pub mod error;
pub mod paths;
pub mod profile;
pub mod resolver;
pub mod rules;

pub use error::{Error, Result};
