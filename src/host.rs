use std::sync::Arc;

use crate::capture::{CaptureEngine, DevicePosition, Result, Surface};

/// Presentation glue: shows the preview on one surface and flips between the
/// front and back camera whenever the user touches it.
pub struct HostController {
    engine: Arc<CaptureEngine>,
    surface: Arc<dyn Surface>,
}

impl HostController {
    pub fn new(engine: Arc<CaptureEngine>, surface: Arc<dyn Surface>) -> Self {
        Self { engine, surface }
    }

    pub fn engine(&self) -> &Arc<CaptureEngine> {
        &self.engine
    }

    pub fn view_did_load(&self) {
        self.engine.attach_preview(Some(self.surface.clone()));
        self.engine.start();
    }

    /// `None` when there is no camera to switch away from.
    pub fn interaction_began(&self) -> Option<Result<DevicePosition>> {
        let target = self.engine.current_device_position().toggled()?;
        log::debug!("interaction began, switching to {target} camera");
        Some(self.engine.switch_camera(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::*;

    fn host(config: SimulatedConfig) -> (Arc<SimulatedSurface>, HostController) {
        let backend = CaptureBackend::new(SimulatedBackend::new(config));
        let engine = Arc::new(CaptureEngine::with_defaults(backend));
        let surface = SimulatedSurface::new("screen", Rect::new(0.0, 0.0, 390.0, 844.0));
        let host = HostController::new(engine, surface.clone());
        (surface, host)
    }

    #[test]
    fn load_attaches_preview_and_starts() {
        let (surface, host) = host(SimulatedConfig::default());
        host.view_did_load();

        assert!(host.engine().is_running());
        assert!(surface.hosts(&host.engine().preview_layer()));
        assert_eq!(host.engine().preview_layer().frame(), surface.bounds());
    }

    #[test]
    fn touches_toggle_camera() {
        let (_surface, host) = host(SimulatedConfig::default());
        host.view_did_load();

        assert_eq!(host.interaction_began(), Some(Ok(DevicePosition::Back)));
        assert_eq!(host.interaction_began(), Some(Ok(DevicePosition::Front)));
        assert!(host.engine().is_running());
    }

    #[test]
    fn touches_ignored_without_camera() {
        let (_surface, host) = host(SimulatedConfig {
            cameras: Vec::new(),
            ..SimulatedConfig::default()
        });
        host.view_did_load();
        assert_eq!(host.interaction_began(), None);
    }
}
