//! Motion commands - speed and stroke

use anyhow::Result;
use clap::ValueEnum;
use handy_client::HandyClient;

use crate::output::{OutputContext, ReadingRow};

/// Step direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn is_up(self) -> bool {
        self == Direction::Up
    }
}

/// Percentage argument as the device expects it
fn percent(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}

/// Set speed in percent, or in mm/s with `mm`
pub async fn speed(
    client: &HandyClient,
    value: f64,
    mm: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let status = if mm {
        client.set_speed_mm(value).await?
    } else {
        client.set_speed_percent(percent(value)).await?
    };

    let unit = if mm { "mm/s" } else { "%" };
    ctx.success(&format!(
        "Speed set to {}{} (position {:.1})",
        value, unit, status.current_position
    ));
    Ok(())
}

/// Step speed by 10%
pub async fn step_speed(
    client: &HandyClient,
    direction: Direction,
    ctx: &OutputContext,
) -> Result<()> {
    let reading = client.step_speed(direction.is_up()).await?;
    ctx.print_one(&ReadingRow::new(reading, "mm/s"));
    Ok(())
}

/// Set stroke in percent, or in mm with `mm`
pub async fn stroke(
    client: &HandyClient,
    value: f64,
    mm: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let status = if mm {
        client.set_stroke_mm(value).await?
    } else {
        client.set_stroke_percent(percent(value)).await?
    };

    let unit = if mm { "mm" } else { "%" };
    ctx.success(&format!(
        "Stroke set to {}{} (position {:.1})",
        value, unit, status.current_position
    ));
    Ok(())
}

/// Step stroke by 10%
pub async fn step_stroke(
    client: &HandyClient,
    direction: Direction,
    ctx: &OutputContext,
) -> Result<()> {
    let reading = client.step_stroke(direction.is_up()).await?;
    ctx.print_one(&ReadingRow::new(reading, "mm"));
    Ok(())
}
