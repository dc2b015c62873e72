//! Object-safe view of a platform capture framework.
//!
//! Each trait has a matching handle type (`CaptureDevice`, `CaptureInput`, ...)
//! that wraps an `Arc<dyn Trait>` and implements the trait itself, so the
//! engine never names a concrete backend type.

use std::any::Any;
use std::sync::Arc;

use super::*;

#[derive(Clone)]
pub struct CaptureBackend {
    inner: Arc<dyn Backend>,
}

#[derive(Clone)]
pub struct CaptureDevice {
    inner: Arc<dyn Device>,
}

#[derive(Clone)]
pub struct CaptureInput {
    inner: Arc<dyn Input>,
}

#[derive(Clone)]
pub struct CaptureOutput {
    inner: Arc<dyn Output>,
}

#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<dyn Session>,
}

#[derive(Clone)]
pub struct CaptureConnection {
    inner: Arc<dyn Connection>,
}

#[derive(Clone)]
pub struct CapturePreviewLayer {
    inner: Arc<dyn PreviewLayer>,
}

pub trait Backend: Any + Send + Sync {
    /// Devices of the given kinds, media type and position, in the
    /// framework's preference order.
    fn discover(
        &self,
        types: DeviceTypes,
        media: MediaType,
        position: DevicePosition,
    ) -> Vec<CaptureDevice>;
    /// Every device able to capture `media`.
    fn devices(&self, media: MediaType) -> Vec<CaptureDevice>;
    fn default_device(&self, media: MediaType) -> Option<CaptureDevice>;
    fn open_input(&self, device: &CaptureDevice) -> Result<CaptureInput>;
    fn new_session(&self) -> CaptureSession;
    /// A data output delivering samples of `media` to `delegate` on a
    /// dedicated background queue.
    fn new_data_output(&self, media: MediaType, delegate: SharedDelegate) -> CaptureOutput;
    fn new_preview_layer(&self, session: &CaptureSession) -> CapturePreviewLayer;
}

pub trait Device: Any + Send + Sync {
    fn unique_id(&self) -> String;
    fn name(&self) -> String;
    fn position(&self) -> DevicePosition;
    fn device_type(&self) -> DeviceTypes;
    fn as_any(&self) -> &dyn Any;
}

pub trait Input: Any + Send + Sync {
    fn device(&self) -> CaptureDevice;
    fn as_any(&self) -> &dyn Any;
}

pub trait Output: Any + Send + Sync {
    fn media_type(&self) -> MediaType;
    fn as_any(&self) -> &dyn Any;
}

pub trait Session: Any + Send + Sync {
    fn can_set_preset(&self, preset: SessionPreset) -> bool;
    fn set_preset(&self, preset: SessionPreset);
    fn begin_configuration(&self);
    fn commit_configuration(&self);
    fn can_add_input(&self, input: &CaptureInput) -> bool;
    fn add_input(&self, input: &CaptureInput);
    fn remove_input(&self, input: &CaptureInput);
    fn can_add_output(&self, output: &CaptureOutput) -> bool;
    fn add_output(&self, output: &CaptureOutput);
    /// The connection carrying `media` into `output`, once both ends are attached.
    fn connection(&self, output: &CaptureOutput, media: MediaType) -> Option<CaptureConnection>;
    fn start_running(&self);
    fn stop_running(&self);
    fn is_running(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

pub trait Connection: Any + Send + Sync {
    fn is_video_mirroring_supported(&self) -> bool;
    fn set_video_mirrored(&self, mirrored: bool);
    fn is_video_mirrored(&self) -> bool;
    fn set_video_orientation(&self, orientation: VideoOrientation);
    fn video_orientation(&self) -> VideoOrientation;
}

pub trait PreviewLayer: Any + Send + Sync {
    fn set_frame(&self, frame: Rect);
    fn frame(&self) -> Rect;
    fn set_video_gravity(&self, gravity: VideoGravity);
    fn as_any(&self) -> &dyn Any;
}

/*****************************************************************************/

impl CaptureBackend {
    pub fn new(backend: impl Backend) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }
}

impl Backend for CaptureBackend {
    fn discover(
        &self,
        types: DeviceTypes,
        media: MediaType,
        position: DevicePosition,
    ) -> Vec<CaptureDevice> {
        self.inner.discover(types, media, position)
    }

    fn devices(&self, media: MediaType) -> Vec<CaptureDevice> {
        self.inner.devices(media)
    }

    fn default_device(&self, media: MediaType) -> Option<CaptureDevice> {
        self.inner.default_device(media)
    }

    fn open_input(&self, device: &CaptureDevice) -> Result<CaptureInput> {
        self.inner.open_input(device)
    }

    fn new_session(&self) -> CaptureSession {
        self.inner.new_session()
    }

    fn new_data_output(&self, media: MediaType, delegate: SharedDelegate) -> CaptureOutput {
        self.inner.new_data_output(media, delegate)
    }

    fn new_preview_layer(&self, session: &CaptureSession) -> CapturePreviewLayer {
        self.inner.new_preview_layer(session)
    }
}

impl CaptureDevice {
    pub fn new(device: impl Device) -> Self {
        Self {
            inner: Arc::new(device),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downcast_ref<T: Device>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref()
    }
}

impl Device for CaptureDevice {
    fn unique_id(&self) -> String {
        self.inner.unique_id()
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn position(&self) -> DevicePosition {
        self.inner.position()
    }

    fn device_type(&self) -> DeviceTypes {
        self.inner.device_type()
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}

impl std::fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("unique_id", &self.unique_id())
            .field("position", &self.position())
            .finish()
    }
}

impl CaptureInput {
    pub fn new(input: impl Input) -> Self {
        Self {
            inner: Arc::new(input),
        }
    }

    /// Same underlying input object, not merely the same device.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Input for CaptureInput {
    fn device(&self) -> CaptureDevice {
        self.inner.device()
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}

impl CaptureOutput {
    pub fn new(output: impl Output) -> Self {
        Self {
            inner: Arc::new(output),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Output for CaptureOutput {
    fn media_type(&self) -> MediaType {
        self.inner.media_type()
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}

impl CaptureSession {
    pub fn new(session: impl Session) -> Self {
        Self {
            inner: Arc::new(session),
        }
    }
}

impl Session for CaptureSession {
    fn can_set_preset(&self, preset: SessionPreset) -> bool {
        self.inner.can_set_preset(preset)
    }

    fn set_preset(&self, preset: SessionPreset) {
        self.inner.set_preset(preset)
    }

    fn begin_configuration(&self) {
        self.inner.begin_configuration()
    }

    fn commit_configuration(&self) {
        self.inner.commit_configuration()
    }

    fn can_add_input(&self, input: &CaptureInput) -> bool {
        self.inner.can_add_input(input)
    }

    fn add_input(&self, input: &CaptureInput) {
        self.inner.add_input(input)
    }

    fn remove_input(&self, input: &CaptureInput) {
        self.inner.remove_input(input)
    }

    fn can_add_output(&self, output: &CaptureOutput) -> bool {
        self.inner.can_add_output(output)
    }

    fn add_output(&self, output: &CaptureOutput) {
        self.inner.add_output(output)
    }

    fn connection(&self, output: &CaptureOutput, media: MediaType) -> Option<CaptureConnection> {
        self.inner.connection(output, media)
    }

    fn start_running(&self) {
        self.inner.start_running()
    }

    fn stop_running(&self) {
        self.inner.stop_running()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}

impl CaptureConnection {
    pub fn new(connection: impl Connection) -> Self {
        Self {
            inner: Arc::new(connection),
        }
    }
}

impl Connection for CaptureConnection {
    fn is_video_mirroring_supported(&self) -> bool {
        self.inner.is_video_mirroring_supported()
    }

    fn set_video_mirrored(&self, mirrored: bool) {
        self.inner.set_video_mirrored(mirrored)
    }

    fn is_video_mirrored(&self) -> bool {
        self.inner.is_video_mirrored()
    }

    fn set_video_orientation(&self, orientation: VideoOrientation) {
        self.inner.set_video_orientation(orientation)
    }

    fn video_orientation(&self) -> VideoOrientation {
        self.inner.video_orientation()
    }
}

impl CapturePreviewLayer {
    pub fn new(layer: impl PreviewLayer) -> Self {
        Self {
            inner: Arc::new(layer),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PreviewLayer for CapturePreviewLayer {
    fn set_frame(&self, frame: Rect) {
        self.inner.set_frame(frame)
    }

    fn frame(&self) -> Rect {
        self.inner.frame()
    }

    fn set_video_gravity(&self, gravity: VideoGravity) {
        self.inner.set_video_gravity(gravity)
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}

/// Scope of a `begin_configuration` / `commit_configuration` pair.
/// Commits when dropped.
pub struct ConfigurationGuard<'a> {
    session: &'a CaptureSession,
}

impl<'a> ConfigurationGuard<'a> {
    pub fn begin(session: &'a CaptureSession) -> Self {
        session.begin_configuration();
        Self { session }
    }
}

impl Drop for ConfigurationGuard<'_> {
    fn drop(&mut self) {
        self.session.commit_configuration();
    }
}
