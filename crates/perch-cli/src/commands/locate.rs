use crate::{OutputFormat, Session, print_json};
use anyhow::{Result, anyhow};
use serde_json::json;
use std::path::Path;

/// Find a browser's executable. An existing `--path` wins.
pub fn execute(
    session: &Session,
    browser_id: &str,
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let rules = session.engine.rules(&session.config);
    if rules.get(browser_id).is_none() && path.is_none() {
        return Err(anyhow!("Unknown browser: {}", browser_id));
    }

    let found = session.engine.locate_executable(browser_id, path, &rules);
    if format == OutputFormat::Json {
        return print_json(&json!({ "browserId": browser_id, "path": found }));
    }

    match found {
        Some(exe) => {
            println!("{}", exe.display());
            Ok(())
        }
        None => Err(anyhow!("No executable found for {}", browser_id)),
    }
}
