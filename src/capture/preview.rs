use std::sync::{Arc, Weak};

use super::*;

/// A display surface owned by the host UI that can host the preview layer.
pub trait Surface: Send + Sync {
    fn bounds(&self) -> Rect;
    fn add_sublayer(&self, layer: &CapturePreviewLayer);
    fn remove_sublayer(&self, layer: &CapturePreviewLayer);
}

/// Non-owning association between the preview layer and the surface it is
/// currently attached to.
pub(crate) struct PreviewBinding {
    layer: CapturePreviewLayer,
    surface: Option<Weak<dyn Surface>>,
}

impl PreviewBinding {
    pub fn new(layer: CapturePreviewLayer) -> Self {
        Self {
            layer,
            surface: None,
        }
    }

    pub fn layer(&self) -> &CapturePreviewLayer {
        &self.layer
    }

    pub fn surface(&self) -> Option<Arc<dyn Surface>> {
        self.surface.as_ref().and_then(Weak::upgrade)
    }

    /// Detaches from the previous surface, then attaches to `surface` sized to
    /// its bounds. The size is not kept in sync with later resizes.
    pub fn rebind(&mut self, surface: Option<Arc<dyn Surface>>) {
        if let Some(previous) = self.surface.take().and_then(|weak| weak.upgrade()) {
            previous.remove_sublayer(&self.layer);
        }

        let Some(surface) = surface else {
            log::debug!("preview detached");
            return;
        };

        let bounds = surface.bounds();
        self.layer.set_frame(bounds);
        surface.add_sublayer(&self.layer);
        log::debug!("preview attached with frame {:?}", bounds);
        self.surface = Some(Arc::downgrade(&surface));
    }
}
