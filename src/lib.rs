pub mod calibration;
pub mod camera;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod events;
pub mod pose;
pub mod quality;
pub mod tracker;
pub mod transport;
pub mod vmc;
pub mod vmt;

pub use error::{Result, TrackerError};

pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Package version plus the `git describe` of the build
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("WEBHTC_BUILD_VERSION"), ")");
