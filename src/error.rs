//! Error types for the simulation engine
//!
//! Every error in the core is fatal. Device failures are reported by the
//! [`GraphicsDevice`](crate::gfx::device::GraphicsDevice) collaborator as
//! [`DeviceError`] and classified by the caller as either an initialization
//! failure or a runtime device loss.

/// Errors reported by a graphics device backend.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No suitable GPU adapter found: {0}")]
    NoAdapter(String),

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Device lost: {0}")]
    Lost(String),

    #[error("Device out of memory")]
    OutOfMemory,

    #[error("Invalid {kind} handle {index}")]
    InvalidHandle { kind: &'static str, index: usize },

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Errors surfaced by the engine to its caller.
#[derive(Debug, thiserror::Error)]
pub enum LifeError {
    /// Device, surface or resource setup failed before the first tick.
    #[error("Initialization failed: {0}")]
    Initialization(#[source] DeviceError),

    #[error("Invalid grid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The device failed while a tick was being issued. The scheduler halts.
    #[error("Device lost while issuing work: {0}")]
    DeviceLost(#[source] DeviceError),
}

pub type Result<T, E = LifeError> = std::result::Result<T, E>;
