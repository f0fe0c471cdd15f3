use crate::{OutputFormat, Session, print_json};
use anyhow::{Result, anyhow};
use perch_browser::{CopyOptions, ProfileRef};
use perch_core::profile::{AvatarPreference, Profile};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRow {
    #[serde(flatten)]
    profile: Profile,
    hidden: bool,
}

/// List the profiles a browser has on disk, hidden ones included
pub fn list(session: &Session, browser_id: &str, avatar: bool, format: OutputFormat) -> Result<()> {
    let engine = &session.engine;
    let rules = engine.rules(&session.config);
    if rules.get(browser_id).is_none() {
        return Err(anyhow!("Unknown browser: {}", browser_id));
    }

    let preference = AvatarPreference::parse_lossy(&session.config.avatar_preference);
    let state = session.config.browsers.get(browser_id);
    let rows: Vec<ProfileRow> = engine
        .discover_profiles(browser_id, preference, &rules)
        .into_iter()
        .map(|mut profile| {
            let hidden = state
                .map(|s| s.is_excluded(&profile.id) || s.is_excluded(&profile.name))
                .unwrap_or(false);
            if !avatar {
                profile.avatar_data = None;
            }
            ProfileRow { profile, hidden }
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            println!("id,name,default,hidden");
            for row in &rows {
                println!(
                    "{},{},{},{}",
                    row.profile.id, row.profile.name, row.profile.is_default, row.hidden
                );
            }
        }
        OutputFormat::Pretty => {
            use console::style;

            if rows.is_empty() {
                println!("No profiles found for {}.", browser_id);
                return Ok(());
            }
            println!("\n{}", style(format!("Profiles: {}", browser_id)).bold().cyan());
            for row in &rows {
                let marker = if row.profile.is_default { "* " } else { "  " };
                let hidden = if row.hidden { " (hidden)" } else { "" };
                println!(
                    "{}{:<24} {}{}",
                    marker,
                    row.profile.name,
                    style(&row.profile.id).dim(),
                    style(hidden).yellow()
                );
                if avatar && row.profile.avatar_data.is_some() {
                    println!("    avatar: yes");
                }
            }
            println!();
        }
    }

    Ok(())
}

/// Copy a profile under a new name
pub fn duplicate(
    session: &mut Session,
    browser_id: &str,
    profile_id: &str,
    name: &str,
    options: &CopyOptions,
    format: OutputFormat,
) -> Result<()> {
    let outcome =
        session
            .engine
            .duplicate_profile(&mut session.config, browser_id, profile_id, name, options)?;
    session.save()?;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        _ => println!("✅ Created profile {}", outcome.profile_id),
    }
    Ok(())
}

/// Change a profile's display name
pub fn rename(
    session: &mut Session,
    browser_id: &str,
    profile_id: &str,
    name: &str,
) -> Result<()> {
    session
        .engine
        .rename_profile(&mut session.config, browser_id, profile_id, name)?;
    session.save()?;
    println!("✅ Renamed {} to '{}'", profile_id, name.trim());
    Ok(())
}

/// Hide profiles from listings without touching their data
pub fn hide(session: &mut Session, browser_id: &str, profile_ids: &[String]) -> Result<()> {
    let items: Vec<ProfileRef> = profile_ids
        .iter()
        .map(|id| ProfileRef::new(browser_id, id))
        .collect();
    session.engine.hide_profiles(&mut session.config, &items);
    session.save()?;
    println!("✅ Hid {} profile(s)", items.len());
    Ok(())
}
