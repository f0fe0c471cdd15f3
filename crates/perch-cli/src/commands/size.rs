use crate::{OutputFormat, Session, print_json};
use anyhow::{Result, anyhow};

/// Measure a profile folder, reusing the cached answer when unchanged
pub fn execute(
    session: &mut Session,
    browser_id: &str,
    profile_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(session.engine.measure_size(
        &mut session.config,
        browser_id,
        profile_id,
    ));
    session.save()?;

    let entry = &report.entry;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("bytes,files,dirs,partial,cached");
            println!(
                "{},{},{},{},{}",
                entry.bytes, entry.files, entry.dirs, entry.partial, report.cached
            );
        }
        OutputFormat::Pretty if entry.ok => {
            let partial = if entry.partial { " (partial)" } else { "" };
            let cached = if report.cached { " [cached]" } else { "" };
            println!(
                "{:.1} MB in {} files, {} folders{}{}",
                entry.bytes as f64 / 1_048_576.0,
                entry.files,
                entry.dirs,
                partial,
                cached
            );
        }
        OutputFormat::Pretty => {}
    }

    if entry.ok {
        Ok(())
    } else {
        Err(anyhow!(
            "Could not measure {}: {}",
            profile_id,
            entry.error.as_deref().unwrap_or("unknown")
        ))
    }
}
