//! Mode commands - set, toggle and query the device mode

use anyhow::Result;
use handy_client::{HandyClient, Mode};

use crate::output::OutputContext;

/// Set the device mode, or toggle between Off and `mode`
pub async fn mode(
    client: &HandyClient,
    mode: Mode,
    toggle: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let reached = if toggle {
        client.toggle_mode(mode).await?
    } else {
        client.set_mode(mode).await?
    };

    ctx.success(&format!("Mode set to {}", reached));
    Ok(())
}

/// Show the current device mode
pub async fn status(client: &HandyClient, ctx: &OutputContext) -> Result<()> {
    let mode = client.get_status().await?;

    ctx.print_kv(&[("Mode", mode.to_string()), ("Code", mode.code().to_string())]);
    Ok(())
}
