//! Info commands - firmware version and settings snapshot

use anyhow::Result;
use handy_client::HandyClient;

use crate::output::{OutputContext, SettingsRow};

/// Show installed and latest firmware versions
pub async fn version(client: &HandyClient, ctx: &OutputContext) -> Result<()> {
    let version = client.get_version().await?;
    let update_available = version.update_available();

    ctx.print_kv(&[
        ("Current", version.current),
        (
            "Latest",
            if version.latest.is_empty() {
                "-".to_string()
            } else {
                version.latest
            },
        ),
        ("Update available", update_available.to_string()),
    ]);
    Ok(())
}

/// Show mode, position, speed and stroke
pub async fn settings(client: &HandyClient, ctx: &OutputContext) -> Result<()> {
    let settings = client.get_settings().await?;
    ctx.print_one(&SettingsRow::from(settings));
    Ok(())
}
