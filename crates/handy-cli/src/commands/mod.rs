//! Command implementations for handy-cli

pub mod info;
pub mod mode;
pub mod motion;
pub mod sync;
pub mod upload;

pub use info::{settings, version};
pub use mode::{mode, status};
pub use motion::{speed, step_speed, step_stroke, stroke};
pub use sync::{offset, pause, play, prepare, sync_time};
pub use upload::upload;
