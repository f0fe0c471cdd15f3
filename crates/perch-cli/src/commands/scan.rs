use crate::{OutputFormat, Session, print_json};
use anyhow::Result;
use perch_core::config::BrowserState;

/// Rescan every browser and save the result
pub fn execute(session: &mut Session, format: OutputFormat) -> Result<()> {
    session.config = session.engine.scan(&session.config);
    session.save()?;

    let browsers = &session.config.browsers;
    match format {
        OutputFormat::Json => print_json(browsers)?,
        OutputFormat::Table => {
            println!("browser,detected,enabled,profiles,path");
            for (id, state) in browsers {
                println!(
                    "{},{},{},{},{}",
                    id,
                    state.detected,
                    state.enabled,
                    state.profiles.len(),
                    state.path
                );
            }
        }
        OutputFormat::Pretty => {
            use console::style;

            println!("\n{}", style("Browsers").bold().cyan());
            for (id, state) in browsers {
                print_browser(id, state);
            }
            println!();
        }
    }

    Ok(())
}

fn print_browser(id: &str, state: &BrowserState) {
    use console::style;

    let status = if state.detected {
        style("detected").green()
    } else if !state.path.is_empty() {
        style("stored path").yellow()
    } else {
        style("not found").dim()
    };
    let name = if state.display_name.is_empty() {
        id
    } else {
        state.display_name.as_str()
    };
    println!("  {:<24} {} ({} profiles)", name, status, state.profiles.len());

    for profile in &state.profiles {
        let marker = if profile.id == state.last_profile_id {
            "*"
        } else {
            " "
        };
        println!("    {} {}  {}", marker, profile.name, style(&profile.id).dim());
    }
    if !state.excluded_profiles.is_empty() {
        println!(
            "    {}",
            style(format!("{} hidden", state.excluded_profiles.len())).dim()
        );
    }
}
