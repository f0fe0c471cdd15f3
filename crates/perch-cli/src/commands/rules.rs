use crate::{OutputFormat, Session, print_json};
use anyhow::{Context, Result};
use perch_browser::RuleValidation;
use perch_core::rules::RuleDefinition;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleRow {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    custom: bool,
    executable: Option<PathBuf>,
    user_data_dir: Option<PathBuf>,
}

/// List every rule in force, built-in and custom
pub fn list(session: &Session, format: OutputFormat) -> Result<()> {
    let engine = &session.engine;
    let rules = engine.rules(&session.config);

    let rows: Vec<RuleRow> = rules
        .ids()
        .into_iter()
        .filter_map(|id| rules.get(&id))
        .map(|rule| RuleRow {
            id: rule.id.clone(),
            name: rule.name.clone(),
            kind: rule.kind().as_str(),
            custom: session
                .config
                .custom_browsers
                .iter()
                .any(|def| def.id.trim() == rule.id),
            executable: engine.locate_executable(&rule.id, None, &rules),
            user_data_dir: engine.user_data_dir(rule),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            println!("id,name,type,custom,executable");
            for row in &rows {
                println!(
                    "{},{},{},{},{}",
                    row.id,
                    row.name,
                    row.kind,
                    row.custom,
                    row.executable
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                );
            }
        }
        OutputFormat::Pretty => {
            use console::style;

            println!("\n{}", style("Browser Rules").bold().cyan());
            for row in &rows {
                let marker = if row.executable.is_some() {
                    style("●").green()
                } else {
                    style("○").dim()
                };
                let custom = if row.custom { " (custom)" } else { "" };
                println!(
                    "  {} {:<12} {}{} [{}]",
                    marker,
                    row.id,
                    row.name,
                    style(custom).yellow(),
                    row.kind
                );
                if let Some(exe) = &row.executable {
                    println!("      exe:  {}", style(exe.display()).dim());
                }
                if let Some(dir) = &row.user_data_dir {
                    println!("      data: {}", style(dir.display()).dim());
                }
            }
            println!();
        }
    }

    Ok(())
}

/// Dry-run a custom rule from a JSON file without saving it
pub fn validate(session: &Session, file: &Path, format: OutputFormat) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read rule file {}", file.display()))?;
    let def: RuleDefinition = serde_json::from_str(&raw)
        .with_context(|| format!("Rule file {} is not a valid rule", file.display()))?;
    let id = def.id.trim().to_string();

    let validation = session.engine.validate_rule(&session.config, def)?;

    match format {
        OutputFormat::Json => print_json(&validation)?,
        OutputFormat::Table => {
            println!("id,name,hasAvatar");
            for profile in &validation.profiles {
                println!("{},{},{}", profile.id, profile.name, profile.has_avatar);
            }
        }
        OutputFormat::Pretty => output_pretty(&id, &validation),
    }

    Ok(())
}

fn output_pretty(id: &str, validation: &RuleValidation) {
    use console::style;

    println!("\n{}", style(format!("Rule: {}", id)).bold().cyan());
    match &validation.executable_path {
        Some(path) => println!("  Executable: {}", style(path.display()).green()),
        None => println!("  Executable: {}", style("not found").yellow()),
    }
    println!("  Profiles:   {}", validation.profile_count);
    println!(
        "  Avatars:    {}",
        if validation.avatar_detected { "yes" } else { "no" }
    );
    for profile in &validation.profiles {
        println!("    {:<16} {}", profile.id, profile.name);
    }
    println!();
}
