mod backend;
mod engine;
mod error;
mod preview;
mod sample;
pub mod simulated;
mod types;

#[cfg(target_vendor = "apple")]
pub mod avfoundation;

pub use backend::*;
pub use engine::*;
pub use error::*;
pub use preview::Surface;
pub use sample::*;
pub use simulated::{
    SimulatedBackend, SimulatedConfig, SimulatedDeviceSpec, SimulatedSession, SimulatedSurface,
};
pub use types::*;

/// The capture framework of the platform this binary runs on, or the
/// simulated one where there is none.
pub fn platform_backend() -> CaptureBackend {
    #[cfg(target_vendor = "apple")]
    {
        CaptureBackend::new(avfoundation::AvFoundation)
    }
    #[cfg(not(target_vendor = "apple"))]
    {
        CaptureBackend::new(SimulatedBackend::new(SimulatedConfig::default()))
    }
}

#[cfg(all(test, not(target_vendor = "apple")))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn platform_backend_is_simulated_off_apple() {
        let engine = CaptureEngine::new(
            platform_backend(),
            Config::default(),
            Arc::new(LoggingDelegate),
        );
        assert_eq!(engine.configure().position, DevicePosition::Front);
    }
}
