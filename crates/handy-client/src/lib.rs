//! Handy Client Library
//!
//! Typed async client for the Handy device HTTP API: mode control, speed and
//! stroke, device information, server clock synchronization, control-file
//! publishing and synchronized playback.
//!
//! # Example
//!
//! ```rust,no_run
//! use handy_client::{HandyClient, Mode, PatternPoint, DEFAULT_SYNC_TRIPS};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = HandyClient::new("my-connection-key")?;
//!
//!     // Check the device is online
//!     let mode = client.get_status().await?;
//!
//!     // Automatic stroking at 40% speed (switches mode if needed)
//!     client.set_speed_percent(40).await?;
//!
//!     // Synchronized playback of a generated pattern
//!     client.synchronize_clock(DEFAULT_SYNC_TRIPS).await?;
//!     let points = [PatternPoint::new(0, 0), PatternPoint::new(500, 100)];
//!     let file = client.publish_pattern(&points, None).await?;
//!     client.sync_prepare(&file).await?;
//!     client.sync_play(0).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Notifications
//!
//! Every command emits [`SessionEvent::CommandStarted`] first and
//! [`SessionEvent::CommandEnded`] last. [`SessionEvent::ModeChanged`] fires
//! whenever the cached mode changes. Subscribe with [`HandyClient::subscribe`].
//!
//! # Testing
//!
//! The `testing` module provides a scripted transport and an in-process fake
//! device:
//!
//! ```rust,ignore
//! use handy_client::testing::{FakeDevice, TestServer};
//!
//! let server = TestServer::start(FakeDevice::new("key"), "key").await?;
//! let mode = server.client.get_status().await?;
//! ```

mod client;
pub mod config;
mod error;
pub mod publish;
pub mod response;
pub mod session;
pub mod sync;
pub mod testing;
pub mod transport;
mod types;

pub use client::{HandyClient, MAX_SPEED_MM_S, MAX_STROKE_MM, STEP_SPEED_RAW_FACTOR};
pub use config::{ConfigError, HandyConfig, HandyConfigBuilder};
pub use error::{HandyError, Result};
pub use session::{LogLevel, Mode, SessionEvent};
pub use sync::DEFAULT_SYNC_TRIPS;
pub use transport::{HttpTransport, Transport};
pub use types::*;
