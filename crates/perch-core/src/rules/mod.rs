mod registry;
mod types;

pub use registry::{EffectiveRules, RuleRegistry};
pub use types::*;
