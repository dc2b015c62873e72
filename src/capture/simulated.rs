//! In-memory capture framework.
//!
//! Behaves like a phone's camera stack closely enough to drive the engine
//! without hardware: cameras have fixed positions, a session accepts one camera
//! input at a time, connections are rebuilt whenever the camera input changes,
//! and samples are delivered from a background thread while running.

use std::any::Any;
use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;

use super::*;

#[derive(Debug, Clone)]
pub struct SimulatedDeviceSpec {
    pub unique_id: String,
    pub name: String,
    pub position: DevicePosition,
    pub device_type: DeviceTypes,
}

impl SimulatedDeviceSpec {
    pub fn camera(unique_id: &str, position: DevicePosition, device_type: DeviceTypes) -> Self {
        Self {
            unique_id: unique_id.to_string(),
            name: format!("{position} camera"),
            position,
            device_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub cameras: Vec<SimulatedDeviceSpec>,
    pub microphone: bool,
    pub mirroring_supported: bool,
    pub presets: Vec<SessionPreset>,
    /// Deliver a video sample this often while running. `None` delivers only
    /// on [`SimulatedSession::emit_video_sample`].
    pub frame_interval: Option<Duration>,
    pub video_format: SampleFormat,
}

impl Default for SimulatedConfig {
    /// A phone with a wide-angle front camera, dual and wide-angle back
    /// cameras and a microphone.
    fn default() -> Self {
        Self {
            cameras: vec![
                SimulatedDeviceSpec::camera(
                    "back-dual",
                    DevicePosition::Back,
                    DeviceTypes::DUAL_CAMERA,
                ),
                SimulatedDeviceSpec::camera(
                    "back-wide",
                    DevicePosition::Back,
                    DeviceTypes::WIDE_ANGLE_CAMERA,
                ),
                SimulatedDeviceSpec::camera(
                    "front-wide",
                    DevicePosition::Front,
                    DeviceTypes::WIDE_ANGLE_CAMERA,
                ),
            ],
            microphone: true,
            mirroring_supported: true,
            presets: vec![SessionPreset::Hd1280x720, SessionPreset::High],
            frame_interval: None,
            video_format: SampleFormat {
                width: 1280,
                height: 720,
                pixel_format: "420v".to_string(),
            },
        }
    }
}

const MICROPHONE_ID: &str = "microphone";

#[derive(Default)]
struct Faults {
    unopenable: HashSet<String>,
    refused: HashSet<String>,
    unplugged: HashSet<String>,
    refuse_outputs: bool,
}

struct Shared {
    config: SimulatedConfig,
    faults: Mutex<Faults>,
    sessions: Mutex<Vec<Weak<SessionState>>>,
}

impl Shared {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Backend handle. Clones share the same simulated hardware, so a test can
/// keep one to inject faults after handing another to the engine.
#[derive(Clone)]
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

impl SimulatedBackend {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                faults: Mutex::default(),
                sessions: Mutex::default(),
            }),
        }
    }

    /// Opening an input for this device fails from now on.
    pub fn fail_open(&self, unique_id: &str) {
        self.shared.faults().unopenable.insert(unique_id.to_string());
    }

    /// Sessions refuse inputs for this device from now on.
    pub fn refuse_input(&self, unique_id: &str) {
        self.shared.faults().refused.insert(unique_id.to_string());
    }

    /// The device disappears from discovery.
    pub fn unplug(&self, unique_id: &str) {
        self.shared.faults().unplugged.insert(unique_id.to_string());
    }

    pub fn refuse_outputs(&self) {
        self.shared.faults().refuse_outputs = true;
    }

    /// The most recently created session.
    pub fn last_session(&self) -> Option<SimulatedSession> {
        let sessions = self
            .shared
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sessions
            .last()
            .and_then(Weak::upgrade)
            .map(|state| SimulatedSession { state })
    }

    fn plugged_cameras(&self) -> Vec<SimulatedDeviceSpec> {
        let faults = self.shared.faults();
        self.shared
            .config
            .cameras
            .iter()
            .filter(|spec| !faults.unplugged.contains(&spec.unique_id))
            .cloned()
            .collect()
    }

    fn microphone(&self) -> Option<CaptureDevice> {
        let plugged = !self.shared.faults().unplugged.contains(MICROPHONE_ID);
        (self.shared.config.microphone && plugged).then(|| {
            CaptureDevice::new(SimDevice {
                spec: SimulatedDeviceSpec {
                    unique_id: MICROPHONE_ID.to_string(),
                    name: "Built-in microphone".to_string(),
                    position: DevicePosition::Unspecified,
                    device_type: DeviceTypes::MICROPHONE,
                },
            })
        })
    }
}

impl Backend for SimulatedBackend {
    fn discover(
        &self,
        types: DeviceTypes,
        media: MediaType,
        position: DevicePosition,
    ) -> Vec<CaptureDevice> {
        match media {
            MediaType::Audio => self
                .microphone()
                .filter(|_| types.contains(DeviceTypes::MICROPHONE))
                .into_iter()
                .collect(),
            MediaType::Video => self
                .plugged_cameras()
                .into_iter()
                .filter(|spec| types.intersects(spec.device_type))
                .filter(|spec| position == DevicePosition::Unspecified || spec.position == position)
                .map(|spec| CaptureDevice::new(SimDevice { spec }))
                .collect(),
        }
    }

    fn devices(&self, media: MediaType) -> Vec<CaptureDevice> {
        match media {
            MediaType::Audio => self.microphone().into_iter().collect(),
            MediaType::Video => self
                .plugged_cameras()
                .into_iter()
                .map(|spec| CaptureDevice::new(SimDevice { spec }))
                .collect(),
        }
    }

    fn default_device(&self, media: MediaType) -> Option<CaptureDevice> {
        match media {
            MediaType::Audio => self.microphone(),
            MediaType::Video => {
                let cameras = self.plugged_cameras();
                cameras
                    .iter()
                    .find(|spec| spec.position == DevicePosition::Back)
                    .or_else(|| cameras.first())
                    .cloned()
                    .map(|spec| CaptureDevice::new(SimDevice { spec }))
            }
        }
    }

    fn open_input(&self, device: &CaptureDevice) -> Result<CaptureInput> {
        let unique_id = device.unique_id();
        if self.shared.faults().unopenable.contains(&unique_id) {
            return Err(CaptureError::InputConstruction {
                device: device.name(),
                reason: "device is in use by another client".to_string(),
            });
        }
        Ok(CaptureInput::new(SimInput {
            device: device.clone(),
        }))
    }

    fn new_session(&self) -> CaptureSession {
        let state = Arc::new(SessionState {
            shared: self.shared.clone(),
            graph: Mutex::default(),
            worker: Mutex::default(),
            started_at: Instant::now(),
        });
        self.shared
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&state));
        CaptureSession::new(SimulatedSession { state })
    }

    fn new_data_output(&self, media: MediaType, delegate: SharedDelegate) -> CaptureOutput {
        CaptureOutput::new(SimOutput {
            media,
            delegate,
        })
    }

    fn new_preview_layer(&self, _session: &CaptureSession) -> CapturePreviewLayer {
        CapturePreviewLayer::new(SimPreviewLayer {
            frame: Mutex::default(),
            gravity: Mutex::new(VideoGravity::ResizeAspectFill),
        })
    }
}

/*****************************************************************************/

struct SimDevice {
    spec: SimulatedDeviceSpec,
}

impl Device for SimDevice {
    fn unique_id(&self) -> String {
        self.spec.unique_id.clone()
    }

    fn name(&self) -> String {
        self.spec.name.clone()
    }

    fn position(&self) -> DevicePosition {
        self.spec.position
    }

    fn device_type(&self) -> DeviceTypes {
        self.spec.device_type
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SimInput {
    device: CaptureDevice,
}

impl SimInput {
    fn is_camera(&self) -> bool {
        !self.device.device_type().contains(DeviceTypes::MICROPHONE)
    }
}

impl Input for SimInput {
    fn device(&self) -> CaptureDevice {
        self.device.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SimOutput {
    media: MediaType,
    delegate: SharedDelegate,
}

impl Output for SimOutput {
    fn media_type(&self) -> MediaType {
        self.media
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ConnectionState {
    mirrored: bool,
    orientation: VideoOrientation,
}

#[derive(Clone)]
struct SimConnection {
    mirroring_supported: bool,
    state: Arc<Mutex<ConnectionState>>,
}

impl SimConnection {
    fn new(mirroring_supported: bool) -> Self {
        Self {
            mirroring_supported,
            state: Arc::new(Mutex::new(ConnectionState {
                mirrored: false,
                orientation: VideoOrientation::LandscapeRight,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connection for SimConnection {
    fn is_video_mirroring_supported(&self) -> bool {
        self.mirroring_supported
    }

    fn set_video_mirrored(&self, mirrored: bool) {
        if !self.mirroring_supported {
            log::warn!("set_video_mirrored on a connection without mirroring support");
            return;
        }
        self.state().mirrored = mirrored;
    }

    fn is_video_mirrored(&self) -> bool {
        self.state().mirrored
    }

    fn set_video_orientation(&self, orientation: VideoOrientation) {
        self.state().orientation = orientation;
    }

    fn video_orientation(&self) -> VideoOrientation {
        self.state().orientation
    }
}

struct SimPreviewLayer {
    frame: Mutex<Rect>,
    gravity: Mutex<VideoGravity>,
}

impl SimPreviewLayer {
    pub fn video_gravity(&self) -> VideoGravity {
        *self.gravity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreviewLayer for SimPreviewLayer {
    fn set_frame(&self, frame: Rect) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = frame;
    }

    fn frame(&self) -> Rect {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_video_gravity(&self, gravity: VideoGravity) {
        *self.gravity.lock().unwrap_or_else(PoisonError::into_inner) = gravity;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Gravity of a preview layer created by the simulated backend.
pub fn preview_gravity(layer: &CapturePreviewLayer) -> Option<VideoGravity> {
    layer
        .as_any()
        .downcast_ref::<SimPreviewLayer>()
        .map(SimPreviewLayer::video_gravity)
}

/*****************************************************************************/

#[derive(Default)]
struct Graph {
    inputs: Vec<CaptureInput>,
    outputs: Vec<CaptureOutput>,
    video_connection: Option<SimConnection>,
    preset: Option<SessionPreset>,
    running: bool,
    configuration_depth: u32,
    commits: u32,
}

impl Graph {
    fn has_camera(&self) -> bool {
        self.inputs.iter().any(is_camera_input)
    }

    fn video_output(&self) -> Option<&CaptureOutput> {
        self.outputs
            .iter()
            .find(|output| output.media_type() == MediaType::Video)
    }
}

fn is_camera_input(input: &CaptureInput) -> bool {
    input
        .as_any()
        .downcast_ref::<SimInput>()
        .map_or(false, SimInput::is_camera)
}

struct Worker {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

struct SessionState {
    shared: Arc<Shared>,
    graph: Mutex<Graph>,
    worker: Mutex<Option<Worker>>,
    started_at: Instant,
}

impl SessionState {
    fn graph(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands one video sample to the video output's delegate, if a camera is
    /// connected and the session runs.
    fn deliver_video_sample(&self, payload: &Bytes) -> bool {
        let delegate = {
            let graph = self.graph();
            if !graph.running || graph.video_connection.is_none() {
                return false;
            }
            graph
                .video_output()
                .and_then(|output| output.as_any().downcast_ref::<SimOutput>())
                .map(|output| output.delegate.clone())
        };
        let Some(delegate) = delegate else {
            return false;
        };

        delegate.did_output(Arc::new(SampleBuffer {
            media_type: MediaType::Video,
            presentation_time: self.started_at.elapsed(),
            format: Some(self.shared.config.video_format.clone()),
            data: payload.clone(),
        }));
        true
    }

    fn payload(&self) -> Bytes {
        let format = &self.shared.config.video_format;
        let nv12_len = (format.width.max(0) * format.height.max(0) * 3 / 2) as usize;
        Bytes::from(vec![0x80; nv12_len])
    }
}

/// Inspection handle onto a session created by [`SimulatedBackend`].
#[derive(Clone)]
pub struct SimulatedSession {
    state: Arc<SessionState>,
}

impl SimulatedSession {
    /// Number of camera inputs currently attached.
    pub fn camera_input_count(&self) -> usize {
        self.state
            .graph()
            .inputs
            .iter()
            .filter(|input| is_camera_input(input))
            .count()
    }

    pub fn input_count(&self) -> usize {
        self.state.graph().inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.state.graph().outputs.len()
    }

    pub fn preset(&self) -> Option<SessionPreset> {
        self.state.graph().preset
    }

    pub fn committed_transactions(&self) -> u32 {
        self.state.graph().commits
    }

    pub fn is_configuring(&self) -> bool {
        self.state.graph().configuration_depth > 0
    }

    /// Delivers one video sample on the calling thread.
    pub fn emit_video_sample(&self) -> bool {
        let payload = self.state.payload();
        self.state.deliver_video_sample(&payload)
    }
}

impl Session for SimulatedSession {
    fn can_set_preset(&self, preset: SessionPreset) -> bool {
        self.state.shared.config.presets.contains(&preset)
    }

    fn set_preset(&self, preset: SessionPreset) {
        self.state.graph().preset = Some(preset);
    }

    fn begin_configuration(&self) {
        self.state.graph().configuration_depth += 1;
    }

    fn commit_configuration(&self) {
        let mut graph = self.state.graph();
        if graph.configuration_depth == 0 {
            log::warn!("commit_configuration without begin_configuration");
            return;
        }
        graph.configuration_depth -= 1;
        if graph.configuration_depth == 0 {
            graph.commits += 1;
        }
    }

    fn can_add_input(&self, input: &CaptureInput) -> bool {
        let unique_id = input.device().unique_id();
        if self.state.shared.faults().refused.contains(&unique_id) {
            return false;
        }
        let graph = self.state.graph();
        if graph.inputs.iter().any(|attached| attached.ptr_eq(input)) {
            return false;
        }
        !(is_camera_input(input) && graph.has_camera())
    }

    fn add_input(&self, input: &CaptureInput) {
        let mirroring_supported = self.state.shared.config.mirroring_supported;
        let mut graph = self.state.graph();
        graph.inputs.push(input.clone());
        if is_camera_input(input) && graph.video_output().is_some() {
            graph.video_connection = Some(SimConnection::new(mirroring_supported));
        }
    }

    fn remove_input(&self, input: &CaptureInput) {
        let mut graph = self.state.graph();
        graph.inputs.retain(|attached| !attached.ptr_eq(input));
        if is_camera_input(input) {
            graph.video_connection = None;
        }
    }

    fn can_add_output(&self, output: &CaptureOutput) -> bool {
        if self.state.shared.faults().refuse_outputs {
            return false;
        }
        let graph = self.state.graph();
        !graph
            .outputs
            .iter()
            .any(|attached| attached.ptr_eq(output) || attached.media_type() == output.media_type())
    }

    fn add_output(&self, output: &CaptureOutput) {
        let mirroring_supported = self.state.shared.config.mirroring_supported;
        let mut graph = self.state.graph();
        graph.outputs.push(output.clone());
        if output.media_type() == MediaType::Video && graph.has_camera() {
            graph.video_connection = Some(SimConnection::new(mirroring_supported));
        }
    }

    fn connection(&self, output: &CaptureOutput, media: MediaType) -> Option<CaptureConnection> {
        if media != MediaType::Video || output.media_type() != MediaType::Video {
            return None;
        }
        let graph = self.state.graph();
        let attached = graph.outputs.iter().any(|o| o.ptr_eq(output));
        graph
            .video_connection
            .clone()
            .filter(|_| attached)
            .map(CaptureConnection::new)
    }

    fn start_running(&self) {
        {
            let mut graph = self.state.graph();
            if graph.running {
                return;
            }
            graph.running = true;
        }
        log::debug!("simulated session running");

        let Some(interval) = self.state.shared.config.frame_interval else {
            return;
        };
        let (stop, stopped) = mpsc::channel();
        let state = self.state.clone();
        let thread = std::thread::Builder::new()
            .name("sample delivery".to_string())
            .spawn(move || {
                let payload = state.payload();
                while let Err(mpsc::RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    state.deliver_video_sample(&payload);
                }
            });
        match thread {
            Ok(thread) => {
                *self
                    .state
                    .worker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Worker { stop, thread })
            }
            Err(err) => log::error!("cannot spawn sample delivery thread: {err}"),
        }
    }

    fn stop_running(&self) {
        self.state.graph().running = false;
        let worker = self
            .state
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            if worker.thread.join().is_err() {
                log::error!("sample delivery thread panicked");
            }
        }
        log::debug!("simulated session stopped");
    }

    fn is_running(&self) -> bool {
        self.state.graph().running
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/*****************************************************************************/

/// A host surface for the simulated backend that records its sublayers.
pub struct SimulatedSurface {
    name: String,
    bounds: Mutex<Rect>,
    sublayers: Mutex<Vec<CapturePreviewLayer>>,
}

impl SimulatedSurface {
    pub fn new(name: &str, bounds: Rect) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bounds: Mutex::new(bounds),
            sublayers: Mutex::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_bounds(&self, bounds: Rect) {
        *self.bounds.lock().unwrap_or_else(PoisonError::into_inner) = bounds;
    }

    pub fn hosts(&self, layer: &CapturePreviewLayer) -> bool {
        self.sublayers()
            .iter()
            .any(|sublayer| sublayer.ptr_eq(layer))
    }

    pub fn sublayer_count(&self) -> usize {
        self.sublayers().len()
    }

    fn sublayers(&self) -> MutexGuard<'_, Vec<CapturePreviewLayer>> {
        self.sublayers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Surface for SimulatedSurface {
    fn bounds(&self) -> Rect {
        *self.bounds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_sublayer(&self, layer: &CapturePreviewLayer) {
        let mut sublayers = self.sublayers();
        if !sublayers.iter().any(|sublayer| sublayer.ptr_eq(layer)) {
            sublayers.push(layer.clone());
        }
    }

    fn remove_sublayer(&self, layer: &CapturePreviewLayer) {
        self.sublayers().retain(|sublayer| !sublayer.ptr_eq(layer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new(SimulatedConfig::default())
    }

    #[test]
    fn discovery_filters_by_type_and_position() {
        let backend = backend();
        let front = backend.discover(DeviceTypes::cameras(), MediaType::Video, DevicePosition::Front);
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].unique_id(), "front-wide");

        let tele = backend.discover(
            DeviceTypes::TELEPHOTO_CAMERA,
            MediaType::Video,
            DevicePosition::Back,
        );
        assert!(tele.is_empty());
    }

    #[test]
    fn session_holds_one_camera_at_a_time() {
        let backend = backend();
        let session = backend.new_session();
        let cameras = backend.devices(MediaType::Video);
        let first = backend.open_input(&cameras[0]).unwrap();
        let second = backend.open_input(&cameras[2]).unwrap();

        assert!(session.can_add_input(&first));
        session.add_input(&first);
        assert!(!session.can_add_input(&first));
        assert!(!session.can_add_input(&second));

        session.remove_input(&first);
        assert!(session.can_add_input(&second));
    }

    #[test]
    fn connection_is_rebuilt_with_each_camera() {
        let backend = backend();
        let session = backend.new_session();
        let output = backend.new_data_output(MediaType::Video, Arc::new(NoopDelegate));
        session.add_output(&output);
        assert!(session.connection(&output, MediaType::Video).is_none());

        let camera = backend.open_input(&backend.devices(MediaType::Video)[0]).unwrap();
        session.add_input(&camera);
        let connection = session.connection(&output, MediaType::Video).unwrap();
        connection.set_video_mirrored(true);
        assert!(connection.is_video_mirrored());

        session.remove_input(&camera);
        session.add_input(&camera);
        let rebuilt = session.connection(&output, MediaType::Video).unwrap();
        assert!(!rebuilt.is_video_mirrored());
        assert_eq!(rebuilt.video_orientation(), VideoOrientation::LandscapeRight);
    }

    #[test]
    fn unopenable_device_reports_input_construction_failure() {
        let backend = backend();
        backend.fail_open("back-dual");
        let device = backend.devices(MediaType::Video).remove(0);
        assert!(matches!(
            backend.open_input(&device),
            Err(CaptureError::InputConstruction { .. })
        ));
    }

    #[test]
    fn delivery_thread_feeds_delegate_until_stopped() {
        let backend = SimulatedBackend::new(SimulatedConfig {
            frame_interval: Some(Duration::from_millis(1)),
            ..SimulatedConfig::default()
        });
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let delegate: SharedDelegate = Arc::new(move |sample: Arc<SampleBuffer>| {
            let _ = tx.lock().unwrap().send(sample.media_type);
        });

        let session = backend.new_session();
        let output = backend.new_data_output(MediaType::Video, delegate);
        let camera = backend.open_input(&backend.devices(MediaType::Video)[0]).unwrap();
        session.add_input(&camera);
        session.add_output(&output);
        session.start_running();

        let media = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(media, MediaType::Video);

        session.stop_running();
        assert!(!session.is_running());
        while rx.try_recv().is_ok() {}
        assert!(!backend.last_session().unwrap().emit_video_sample());
    }

    #[test]
    fn surface_tracks_sublayers() {
        let backend = backend();
        let session = backend.new_session();
        let layer = backend.new_preview_layer(&session);
        let surface = SimulatedSurface::new("a", Rect::new(0.0, 0.0, 10.0, 10.0));

        surface.add_sublayer(&layer);
        surface.add_sublayer(&layer);
        assert_eq!(surface.sublayer_count(), 1);
        assert!(surface.hosts(&layer));

        surface.remove_sublayer(&layer);
        assert!(!surface.hosts(&layer));
    }
}
