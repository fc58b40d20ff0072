//! Upload command - publish a control file and optionally load it

use anyhow::{anyhow, Context, Result};
use handy_client::publish::parse_pattern;
use handy_client::{ControlFileKind, HandyClient};
use std::path::Path;

use crate::output::{OutputContext, PublishedRow};

/// Upload a control file.
///
/// With `pattern` the file is read as `time,position` lines and re-serialized;
/// otherwise it is uploaded as-is and its kind comes from the extension.
pub async fn upload(
    client: &HandyClient,
    file_path: &Path,
    name: Option<&str>,
    pattern: bool,
    prepare: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read control file: {}", file_path.display()))?;

    let file = if pattern {
        let points = parse_pattern(&content)
            .with_context(|| format!("Invalid pattern file: {}", file_path.display()))?;
        ctx.info(&format!("Uploading pattern with {} points...", points.len()));
        client.publish_pattern(&points, name).await?
    } else {
        let kind = ControlFileKind::from_path(file_path).ok_or_else(|| {
            anyhow!(
                "Unknown control file type: {}. Use a .csv or .funscript file, or --pattern",
                file_path.display()
            )
        })?;
        let file_name = file_path.file_name().and_then(|n| n.to_str());
        client
            .publish_file(&content, kind, name.or(file_name))
            .await?
    };

    if file.url.is_empty() {
        ctx.warn("Upload service returned no URL");
    }
    ctx.print_one(&PublishedRow::from(&file));

    if prepare {
        client.sync_prepare(&file).await?;
        ctx.success("Control file loaded onto device");
    }
    Ok(())
}
