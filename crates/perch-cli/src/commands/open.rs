use crate::Session;
use anyhow::Result;

/// Open a URL or local file in a browser profile
pub fn execute(
    session: &mut Session,
    browser_id: &str,
    profile_id: Option<&str>,
    target: &str,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        let launcher =
            session
                .engine
                .prepare_launch(&session.config, browser_id, profile_id, target)?;
        println!(
            "{} {}",
            launcher.executable().display(),
            launcher.args().join(" ")
        );
        return Ok(());
    }

    let pid = session
        .engine
        .open_in_browser(&session.config, browser_id, profile_id, target)?;
    tracing::debug!("Browser started with pid {}", pid);

    if let Some(profile_id) = profile_id {
        session.config.last_selection.browser_id = browser_id.to_string();
        session.config.last_selection.profile_id = profile_id.to_string();
        if let Some(state) = session.config.browsers.get_mut(browser_id) {
            state.last_profile_id = profile_id.to_string();
        }
        session.save()?;
    }
    Ok(())
}
