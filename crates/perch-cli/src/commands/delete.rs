use crate::{OutputFormat, Session, print_json};
use anyhow::{Result, anyhow};
use console::{Term, style};
use perch_browser::{DeleteReport, ProfileRef, RestoreReport};

/// Move profiles to the trash.
///
/// On a terminal the user gets one chance to press `u` to put everything
/// back. Once the command ends the trashed data is purged unless
/// `keep_trash` is set.
pub fn execute(
    session: &mut Session,
    browser_id: &str,
    profile_ids: &[String],
    yes: bool,
    keep_trash: bool,
    format: OutputFormat,
) -> Result<()> {
    let term = Term::stdout();
    let interactive = term.is_term() && format != OutputFormat::Json;

    if !yes {
        if !interactive {
            return Err(anyhow!(
                "Refusing to delete without confirmation. Re-run with --yes"
            ));
        }
        term.write_str(&format!(
            "⚠️  Move {} profile(s) of {} to the trash? [y/N] ",
            profile_ids.len(),
            browser_id
        ))?;
        let answer = term.read_char()?;
        term.write_line("")?;
        if !answer.eq_ignore_ascii_case(&'y') {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    let items: Vec<ProfileRef> = profile_ids
        .iter()
        .map(|id| ProfileRef::new(browser_id, id))
        .collect();
    let report = session.engine.delete_profiles(&mut session.config, &items);
    session.save()?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => output_table(&report),
        OutputFormat::Pretty => output_pretty(&report),
    }

    if !report.ok {
        return Err(anyhow!("No profiles were deleted"));
    }
    let Some(token) = report.undo_token else {
        return Ok(());
    };

    if interactive {
        term.write_line(&format!(
            "Press {} to undo, any other key to finish.",
            style("u").bold()
        ))?;
        if term.read_char()?.eq_ignore_ascii_case(&'u') {
            let restored = session.engine.undo_delete(&mut session.config, &token)?;
            session.save()?;
            print_restored(&restored);
            return Ok(());
        }
    }

    if keep_trash {
        println!(
            "Trashed data kept in {}",
            session.engine.lifecycle().trash_root().display()
        );
    } else {
        session.engine.discard_undo(&token);
    }
    Ok(())
}

fn output_pretty(report: &DeleteReport) {
    for item in &report.deleted {
        if item.ok {
            println!("✅ Deleted {}", item.profile_id);
        } else {
            println!(
                "{} {} ({})",
                style("✗").red(),
                item.profile_id,
                item.error.as_deref().unwrap_or("unknown")
            );
        }
    }
    if let Some(token) = &report.undo_token {
        println!("Undo token: {}", style(token).dim());
    }
}

fn output_table(report: &DeleteReport) {
    println!("profile,ok,error,trashedPath");
    for item in &report.deleted {
        println!(
            "{},{},{},{}",
            item.profile_id,
            item.ok,
            item.error.as_deref().unwrap_or(""),
            item.trashed_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
    }
}

fn print_restored(report: &RestoreReport) {
    for item in &report.restored {
        match &item.error {
            None => println!("↩️  Restored {}", item.profile_id),
            Some(code) => println!(
                "{} Could not restore {} ({})",
                style("✗").red(),
                item.profile_id,
                code
            ),
        }
    }
}
