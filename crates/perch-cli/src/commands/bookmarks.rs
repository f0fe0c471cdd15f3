use crate::{OutputFormat, Session, print_json};
use anyhow::Result;

/// Print a Chromium profile's bookmarks
pub fn execute(
    session: &Session,
    browser_id: &str,
    profile_id: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let list = session
        .engine
        .read_bookmarks(&session.config, browser_id, profile_id, limit)?;

    match format {
        OutputFormat::Json => print_json(&list)?,
        OutputFormat::Table => {
            println!("folder,title,url");
            for item in &list.items {
                println!("{},{},{}", item.folder, item.title, item.url);
            }
        }
        OutputFormat::Pretty => {
            use console::style;

            if list.items.is_empty() {
                println!("No bookmarks in {}.", list.file_path.display());
                return Ok(());
            }
            let mut folder = None;
            for item in &list.items {
                if folder != Some(&item.folder) {
                    println!("\n{}", style(&item.folder).bold());
                    folder = Some(&item.folder);
                }
                println!("  {}  {}", item.title, style(&item.url).dim());
            }
            println!();
        }
    }

    Ok(())
}
