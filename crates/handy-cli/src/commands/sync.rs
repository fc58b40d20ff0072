//! Sync commands - clock synchronization and synchronized playback

use anyhow::{Context, Result};
use handy_client::{HandyClient, PublishedFile};

use crate::output::{OutputContext, PlaybackRow};

/// Estimate the server clock offset
pub async fn sync_time(client: &HandyClient, trips: u32, ctx: &OutputContext) -> Result<()> {
    let offset = client
        .synchronize_clock(trips)
        .await
        .context("Clock synchronization failed")?;

    ctx.print_kv(&[
        ("Offset (ms)", offset.to_string()),
        ("Trips", trips.to_string()),
    ]);
    Ok(())
}

/// Load a hosted control file onto the device
pub async fn prepare(
    client: &HandyClient,
    url: &str,
    name: Option<&str>,
    size: Option<u64>,
    ctx: &OutputContext,
) -> Result<()> {
    let file = PublishedFile {
        url: url.to_string(),
        name: name.unwrap_or_default().to_string(),
        size_bytes: size,
    };
    client.sync_prepare(&file).await?;

    ctx.success(&format!("Prepared {}", url));
    Ok(())
}

/// Start synchronized playback, optionally syncing the clock first
pub async fn play(
    client: &HandyClient,
    time_ms: u32,
    sync_trips: Option<u32>,
    ctx: &OutputContext,
) -> Result<()> {
    if let Some(trips) = sync_trips {
        let offset = client
            .synchronize_clock(trips)
            .await
            .context("Clock synchronization failed")?;
        ctx.info(&format!("Server offset: {} ms", offset));
    } else if client.server_time_offset() == 0 {
        ctx.warn("Clock not synchronized; playback starts without a server time");
    }

    let state = client.sync_play(time_ms).await?;
    ctx.print_one(&PlaybackRow::from(state));
    Ok(())
}

/// Pause synchronized playback
pub async fn pause(client: &HandyClient, ctx: &OutputContext) -> Result<()> {
    let state = client.sync_pause().await?;
    ctx.print_one(&PlaybackRow::from(state));
    Ok(())
}

/// Adjust the playback offset
pub async fn offset(client: &HandyClient, offset_ms: i64, ctx: &OutputContext) -> Result<()> {
    let applied = client.sync_offset(offset_ms).await?;
    ctx.success(&format!("Sync offset set to {} ms", applied));
    Ok(())
}
