use super::types::{BrowserRule, RuleDefinition};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

const BUILTIN_RULES: &str = include_str!("browsers.json");

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    browsers: Vec<RuleDefinition>,
}

/// Owns the immutable built-in rule set.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    builtin: Vec<BrowserRule>,
}

impl RuleRegistry {
    /// Load the rules embedded in the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_RULES)
    }

    /// Parse and validate a `{"browsers": [...]}` rule file.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(content)?;
        let mut seen = HashSet::new();
        let mut builtin = Vec::with_capacity(file.browsers.len());

        for def in file.browsers {
            let rule = BrowserRule::try_from(def)?;
            if !seen.insert(rule.id.clone()) {
                return Err(Error::InvalidRule(format!("duplicate id '{}'", rule.id)));
            }
            builtin.push(rule);
        }

        tracing::debug!("Loaded {} built-in browser rules", builtin.len());
        Ok(Self { builtin })
    }

    pub fn rules(&self) -> &[BrowserRule] {
        &self.builtin
    }

    /// Combine the built-ins with user rules.
    ///
    /// Custom rules are appended after the built-ins. A custom rule whose id
    /// matches a built-in is layered over it, and the layered rule replaces
    /// the built-in in the lookup map. The ordered list keeps both entries.
    pub fn effective_rules(&self, custom: &[RuleDefinition]) -> EffectiveRules {
        let mut ordered: Vec<BrowserRule> = self.builtin.clone();
        let mut by_id: HashMap<String, BrowserRule> = self
            .builtin
            .iter()
            .map(|rule| (rule.id.clone(), rule.clone()))
            .collect();

        for def in custom {
            let id = def.id.trim();
            let rule = match by_id.get(id) {
                Some(existing) => existing.layered(def),
                None => match BrowserRule::try_from(def.clone()) {
                    Ok(rule) => rule,
                    Err(e) => {
                        tracing::warn!("Skipping custom browser rule: {}", e);
                        continue;
                    }
                },
            };
            ordered.push(rule.clone());
            by_id.insert(rule.id.clone(), rule);
        }

        EffectiveRules { ordered, by_id }
    }
}

/// An owned snapshot of the rules in force for one configuration.
#[derive(Debug, Clone, Default)]
pub struct EffectiveRules {
    pub ordered: Vec<BrowserRule>,
    pub by_id: HashMap<String, BrowserRule>,
}

impl EffectiveRules {
    pub fn get(&self, id: &str) -> Option<&BrowserRule> {
        self.by_id.get(id)
    }

    /// Every id once, in first-seen order.
    pub fn ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.ordered
            .iter()
            .filter(|rule| seen.insert(rule.id.as_str()))
            .map(|rule| rule.id.clone())
            .collect()
    }
}
