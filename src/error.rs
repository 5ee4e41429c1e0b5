//! Error types for the tracking core

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    ReadFile { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid transform scale {0}: scale must be finite and > 0")]
    InvalidScale(f32),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Frame source errors
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Frame source unavailable: {0}")]
    Unavailable(String),

    #[error("Frame source released")]
    Released,

    #[error("No frame received")]
    NoFrame,

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),
}

/// Output transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind output socket: {0}")]
    Bind(String),

    #[error("OSC encode failed: {0}")]
    Encode(String),

    #[error("Send to {addr} failed: {message}")]
    Send { addr: String, message: String },
}

/// Result type alias for the tracking core
pub type Result<T> = std::result::Result<T, TrackerError>;
