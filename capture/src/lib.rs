//! Capture providers: render a target and hand back a decoded raster image.

pub mod chrome;
pub mod error;
pub mod provider;

pub use chrome::ChromeSession;
pub use error::CaptureError;
pub use provider::CaptureProvider;
