use std::sync::{Arc, Mutex, PoisonError};

use super::preview::PreviewBinding;
use super::*;

/// Owns a capture session with one camera input, an optional microphone input,
/// a video and an audio data output and a preview layer.
///
/// The session is configured lazily on first use. Control operations take
/// `&self` and are serialized internally, so the engine can be shared behind an
/// `Arc` by whoever composes the application.
pub struct CaptureEngine {
    backend: CaptureBackend,
    config: Config,
    delegate: SharedDelegate,
    pipeline: Mutex<Option<Pipeline>>,
}

/// What the initial configuration achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub position: DevicePosition,
    pub audio: bool,
    /// Failures that were absorbed, e.g. a missing microphone.
    pub issues: Vec<CaptureError>,
}

struct Pipeline {
    session: CaptureSession,
    video_input: Option<CaptureInput>,
    audio_input: Option<CaptureInput>,
    video_output: CaptureOutput,
    #[allow(dead_code)] // kept alive for the session
    audio_output: CaptureOutput,
    preview: PreviewBinding,
    report: SetupReport,
}

impl Pipeline {
    fn position(&self) -> DevicePosition {
        self.video_input
            .as_ref()
            .map(|input| steady_position(input.device().position()))
            .unwrap_or(DevicePosition::Unspecified)
    }

    fn video_connection(&self) -> Option<CaptureConnection> {
        self.session
            .connection(&self.video_output, MediaType::Video)
    }
}

impl CaptureEngine {
    pub fn new(backend: CaptureBackend, config: Config, delegate: SharedDelegate) -> Self {
        Self {
            backend,
            config,
            delegate,
            pipeline: Mutex::new(None),
        }
    }

    /// Default configuration, samples are ignored.
    pub fn with_defaults(backend: CaptureBackend) -> Self {
        Self::new(backend, Config::default(), Arc::new(NoopDelegate))
    }

    /// Configures the session if that has not happened yet and reports the
    /// outcome of the initial configuration.
    pub fn configure(&self) -> SetupReport {
        self.with_pipeline(|pipeline| pipeline.report.clone())
    }

    /// Starts the session. Does nothing while running.
    pub fn start(&self) {
        self.with_pipeline(|pipeline| {
            if pipeline.session.is_running() {
                log::debug!("start: already running");
                return;
            }
            pipeline.session.start_running();
            log::info!("capture started on {} camera", pipeline.position());
        })
    }

    /// Stops the session. Does nothing while stopped.
    pub fn stop(&self) {
        self.with_pipeline(|pipeline| {
            if !pipeline.session.is_running() {
                log::debug!("stop: not running");
                return;
            }
            pipeline.session.stop_running();
            log::info!("capture stopped");
        })
    }

    pub fn is_running(&self) -> bool {
        self.with_pipeline(|pipeline| pipeline.session.is_running())
    }

    /// Position of the attached camera. A camera that does not know its
    /// position counts as back, `Unspecified` means no camera is attached.
    pub fn current_device_position(&self) -> DevicePosition {
        self.with_pipeline(|pipeline| pipeline.position())
    }

    /// Replaces the camera input with one at `target`.
    ///
    /// Runs as one configuration transaction. If the session refuses the new
    /// input, the previous one is put back, so a camera stays attached either
    /// way. Returns the position in effect afterwards.
    pub fn switch_camera(&self, target: DevicePosition) -> Result<DevicePosition> {
        self.with_pipeline(|pipeline| {
            let current = pipeline.position();
            if target == DevicePosition::Unspecified || target == current {
                let err = CaptureError::InvalidSwitchTarget {
                    requested: target,
                    current,
                };
                log::warn!("switch_camera: {err}");
                return Err(err);
            }

            let input = camera_input(&self.backend, target).map_err(|err| {
                log::warn!("switch_camera: {err}");
                err
            })?;

            let _configuration = ConfigurationGuard::begin(&pipeline.session);
            if let Some(previous) = &pipeline.video_input {
                pipeline.session.remove_input(previous);
            }

            let outcome = if pipeline.session.can_add_input(&input) {
                pipeline.session.add_input(&input);
                pipeline.video_input = Some(input);
                Ok(())
            } else {
                if let Some(previous) = &pipeline.video_input {
                    pipeline.session.add_input(previous);
                }
                let err = CaptureError::SessionAddRejected {
                    what: format!("{target} camera input"),
                };
                log::warn!("switch_camera: {err}, keeping {current} camera");
                Err(err)
            };

            let position = pipeline.position();
            self.correct_video_connection(pipeline.video_connection(), position);
            if outcome.is_ok() {
                log::info!("switched from {current} to {position} camera");
            }
            outcome.map(|()| position)
        })
    }

    /// Moves the preview layer to `surface`, sized to its current bounds.
    /// `None` only detaches, the session keeps its state.
    pub fn attach_preview(&self, surface: Option<Arc<dyn Surface>>) {
        self.with_pipeline(|pipeline| pipeline.preview.rebind(surface))
    }

    /// The surface the preview is attached to, if it is still alive.
    pub fn preview(&self) -> Option<Arc<dyn Surface>> {
        self.with_pipeline(|pipeline| pipeline.preview.surface())
    }

    pub fn preview_layer(&self) -> CapturePreviewLayer {
        self.with_pipeline(|pipeline| pipeline.preview.layer().clone())
    }

    pub fn video_input(&self) -> Option<CaptureInput> {
        self.with_pipeline(|pipeline| pipeline.video_input.clone())
    }

    pub fn has_audio_input(&self) -> bool {
        self.with_pipeline(|pipeline| pipeline.audio_input.is_some())
    }

    pub fn video_connection(&self) -> Option<CaptureConnection> {
        self.with_pipeline(|pipeline| pipeline.video_connection())
    }

    fn with_pipeline<R>(&self, f: impl FnOnce(&mut Pipeline) -> R) -> R {
        let mut pipeline = self.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
        let pipeline = pipeline.get_or_insert_with(|| self.build_pipeline());
        f(pipeline)
    }

    fn build_pipeline(&self) -> Pipeline {
        let session = self.backend.new_session();
        let mut issues = Vec::new();

        if session.can_set_preset(self.config.preset) {
            session.set_preset(self.config.preset);
        } else {
            log::debug!("session does not support preset {:?}", self.config.preset);
        }

        let mut video_input = camera_input(&self.backend, self.config.default_position)
            .map_err(|err| {
                log::warn!("no camera input: {err}");
                issues.push(err);
            })
            .ok();
        let mut audio_input = if self.config.capture_audio {
            microphone_input(&self.backend)
                .map_err(|err| {
                    log::warn!("continuing without audio: {err}");
                    issues.push(err);
                })
                .ok()
        } else {
            None
        };

        let video_output = self
            .backend
            .new_data_output(MediaType::Video, self.delegate.clone());
        let audio_output = self
            .backend
            .new_data_output(MediaType::Audio, self.delegate.clone());

        {
            let _configuration = ConfigurationGuard::begin(&session);
            for (slot, media) in [
                (&mut video_input, MediaType::Video),
                (&mut audio_input, MediaType::Audio),
            ] {
                let Some(input) = slot.as_ref() else { continue };
                if session.can_add_input(input) {
                    session.add_input(input);
                } else {
                    let err = CaptureError::SessionAddRejected {
                        what: format!("{media} input {}", input.device().name()),
                    };
                    log::warn!("{err}");
                    issues.push(err);
                    *slot = None;
                }
            }
            for output in [&video_output, &audio_output] {
                if session.can_add_output(output) {
                    session.add_output(output);
                } else {
                    let err = CaptureError::SessionAddRejected {
                        what: format!("{} output", output.media_type()),
                    };
                    log::warn!("{err}");
                    issues.push(err);
                }
            }
        }

        let preview_layer = self.backend.new_preview_layer(&session);
        preview_layer.set_video_gravity(self.config.video_gravity);

        let mut pipeline = Pipeline {
            session,
            video_input,
            audio_input,
            video_output,
            audio_output,
            preview: PreviewBinding::new(preview_layer),
            report: SetupReport {
                position: DevicePosition::Unspecified,
                audio: false,
                issues,
            },
        };
        let position = pipeline.position();
        self.correct_video_connection(pipeline.video_connection(), position);
        pipeline.report.position = position;
        pipeline.report.audio = pipeline.audio_input.is_some();
        log::debug!("capture session configured: {:?}", pipeline.report);
        pipeline
    }

    /// Front camera images are mirrored so the preview behaves like a mirror.
    fn correct_video_connection(
        &self,
        connection: Option<CaptureConnection>,
        position: DevicePosition,
    ) {
        let Some(connection) = connection else {
            log::debug!("no video connection to correct");
            return;
        };
        if connection.is_video_mirroring_supported() {
            connection.set_video_mirrored(position == DevicePosition::Front);
        }
        connection.set_video_orientation(self.config.orientation);
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        let pipeline = self
            .pipeline
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pipeline) = pipeline {
            if pipeline.session.is_running() {
                pipeline.session.stop_running();
            }
        }
    }
}

/// A camera that does not know where it sits is treated as a back camera.
fn steady_position(reported: DevicePosition) -> DevicePosition {
    match reported {
        DevicePosition::Unspecified => DevicePosition::Back,
        position => position,
    }
}

/// Finds a camera at `position`.
///
/// Built-in dual, telephoto and wide-angle cameras are preferred, in the
/// order discovery returns them. Otherwise the first video device at that
/// position wins.
pub fn find_camera(backend: &CaptureBackend, position: DevicePosition) -> Result<CaptureDevice> {
    let discovered = backend
        .discover(DeviceTypes::cameras(), MediaType::Video, position)
        .into_iter()
        .find(|device| device.position() == position);
    discovered
        .or_else(|| {
            backend
                .devices(MediaType::Video)
                .into_iter()
                .find(|device| device.position() == position)
        })
        .ok_or(CaptureError::DeviceUnavailable {
            media: MediaType::Video,
            position,
        })
}

fn camera_input(backend: &CaptureBackend, position: DevicePosition) -> Result<CaptureInput> {
    let device = find_camera(backend, position)?;
    log::debug!("opening {:?}", device);
    backend.open_input(&device)
}

fn microphone_input(backend: &CaptureBackend) -> Result<CaptureInput> {
    let device = backend
        .default_device(MediaType::Audio)
        .ok_or(CaptureError::DeviceUnavailable {
            media: MediaType::Audio,
            position: DevicePosition::Unspecified,
        })?;
    backend.open_input(&device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated(config: SimulatedConfig) -> (SimulatedBackend, CaptureEngine) {
        let sim = SimulatedBackend::new(config);
        let engine = CaptureEngine::with_defaults(CaptureBackend::new(sim.clone()));
        (sim, engine)
    }

    fn phone() -> (SimulatedBackend, CaptureEngine) {
        simulated(SimulatedConfig::default())
    }

    #[test]
    fn defaults_to_front_camera_in_portrait_and_mirrored() {
        let (sim, engine) = phone();

        let report = engine.configure();
        assert_eq!(report.position, DevicePosition::Front);
        assert!(report.audio);
        assert!(report.issues.is_empty());

        let connection = engine.video_connection().unwrap();
        assert!(connection.is_video_mirrored());
        assert_eq!(connection.video_orientation(), VideoOrientation::Portrait);

        let session = sim.last_session().unwrap();
        assert_eq!(session.preset(), Some(SessionPreset::Hd1280x720));
        assert_eq!(session.input_count(), 2);
        assert_eq!(session.output_count(), 2);
        assert!(!session.is_configuring());
    }

    #[test]
    fn configuration_happens_once() {
        let (sim, engine) = phone();
        let first = engine.configure();
        let session = sim.last_session().unwrap();
        assert_eq!(engine.configure(), first);
        assert_eq!(session.committed_transactions(), 1);
        assert_eq!(engine.current_device_position(), DevicePosition::Front);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (_sim, engine) = phone();
        assert!(!engine.is_running());

        engine.start();
        engine.start();
        assert!(engine.is_running());

        engine.stop();
        assert!(!engine.is_running());
        engine.stop();
        assert!(!engine.is_running());

        for _ in 0..3 {
            engine.start();
        }
        engine.stop();
        engine.start();
        assert!(engine.is_running());
    }

    #[test]
    fn switching_to_current_or_unspecified_is_rejected() {
        let (_sim, engine) = phone();
        let before = engine.video_input().unwrap();

        for target in [DevicePosition::Front, DevicePosition::Unspecified] {
            assert!(matches!(
                engine.switch_camera(target),
                Err(CaptureError::InvalidSwitchTarget { .. })
            ));
            assert_eq!(engine.current_device_position(), DevicePosition::Front);
            assert!(engine.video_input().unwrap().ptr_eq(&before));
        }
    }

    #[test]
    fn switch_replaces_camera_and_fixes_connection() {
        let (sim, engine) = phone();
        engine.start();

        assert_eq!(engine.switch_camera(DevicePosition::Back), Ok(DevicePosition::Back));
        assert_eq!(engine.current_device_position(), DevicePosition::Back);
        assert!(engine.is_running());
        // dual camera wins over wide angle
        assert_eq!(engine.video_input().unwrap().device().unique_id(), "back-dual");

        let session = sim.last_session().unwrap();
        assert_eq!(session.camera_input_count(), 1);
        assert!(!session.is_configuring());

        let connection = engine.video_connection().unwrap();
        assert!(!connection.is_video_mirrored());
        assert_eq!(connection.video_orientation(), VideoOrientation::Portrait);

        assert_eq!(engine.switch_camera(DevicePosition::Front), Ok(DevicePosition::Front));
        assert!(engine.video_connection().unwrap().is_video_mirrored());
        assert_eq!(session.camera_input_count(), 1);
    }

    #[test]
    fn mirroring_left_alone_when_unsupported() {
        let (_sim, engine) = simulated(SimulatedConfig {
            mirroring_supported: false,
            ..SimulatedConfig::default()
        });
        let connection = engine.video_connection().unwrap();
        assert!(!connection.is_video_mirrored());
        assert_eq!(connection.video_orientation(), VideoOrientation::Portrait);
    }

    #[test]
    fn unresolvable_camera_leaves_state_untouched() {
        let (sim, engine) = phone();
        let before = engine.video_input().unwrap();
        let commits = sim.last_session().unwrap().committed_transactions();

        sim.unplug("back-dual");
        sim.unplug("back-wide");
        assert_eq!(
            engine.switch_camera(DevicePosition::Back),
            Err(CaptureError::DeviceUnavailable {
                media: MediaType::Video,
                position: DevicePosition::Back,
            })
        );
        assert_eq!(engine.current_device_position(), DevicePosition::Front);
        assert!(engine.video_input().unwrap().ptr_eq(&before));
        assert_eq!(sim.last_session().unwrap().committed_transactions(), commits);
    }

    #[test]
    fn unopenable_camera_leaves_state_untouched() {
        let (sim, engine) = phone();
        engine.configure();
        sim.fail_open("back-dual");

        assert!(matches!(
            engine.switch_camera(DevicePosition::Back),
            Err(CaptureError::InputConstruction { .. })
        ));
        assert_eq!(engine.current_device_position(), DevicePosition::Front);
    }

    #[test]
    fn refused_camera_restores_previous_input() {
        let (sim, engine) = phone();
        let before = engine.video_input().unwrap();
        sim.refuse_input("back-dual");

        assert!(matches!(
            engine.switch_camera(DevicePosition::Back),
            Err(CaptureError::SessionAddRejected { .. })
        ));
        assert_eq!(engine.current_device_position(), DevicePosition::Front);
        assert!(engine.video_input().unwrap().ptr_eq(&before));

        let session = sim.last_session().unwrap();
        assert_eq!(session.camera_input_count(), 1);
        assert!(!session.is_configuring());
        assert!(engine.video_connection().unwrap().is_video_mirrored());
    }

    #[test]
    fn falls_back_to_plain_enumeration() {
        let (_sim, engine) = simulated(SimulatedConfig {
            cameras: vec![
                SimulatedDeviceSpec::camera("usb", DevicePosition::Back, DeviceTypes::empty()),
                SimulatedDeviceSpec::camera(
                    "front",
                    DevicePosition::Front,
                    DeviceTypes::WIDE_ANGLE_CAMERA,
                ),
            ],
            ..SimulatedConfig::default()
        });
        assert_eq!(engine.switch_camera(DevicePosition::Back), Ok(DevicePosition::Back));
        assert_eq!(engine.video_input().unwrap().device().unique_id(), "usb");
    }

    #[test]
    fn missing_microphone_degrades_to_video_only() {
        let (_sim, engine) = simulated(SimulatedConfig {
            microphone: false,
            ..SimulatedConfig::default()
        });
        let report = engine.configure();
        assert!(!report.audio);
        assert!(!engine.has_audio_input());
        assert_eq!(
            report.issues,
            vec![CaptureError::DeviceUnavailable {
                media: MediaType::Audio,
                position: DevicePosition::Unspecified,
            }]
        );
        assert_eq!(report.position, DevicePosition::Front);
    }

    #[test]
    fn missing_camera_is_not_fatal() {
        let (sim, engine) = simulated(SimulatedConfig {
            cameras: Vec::new(),
            ..SimulatedConfig::default()
        });
        let report = engine.configure();
        assert_eq!(report.position, DevicePosition::Unspecified);
        assert_eq!(engine.current_device_position(), DevicePosition::Unspecified);
        assert!(engine.video_connection().is_none());

        engine.start();
        assert!(engine.is_running());
        assert!(!sim.last_session().unwrap().emit_video_sample());
    }

    #[test]
    fn camera_refused_during_setup_leaves_no_camera() {
        let (sim, engine) = phone();
        sim.refuse_input("front-wide");

        let report = engine.configure();
        assert_eq!(report.position, DevicePosition::Unspecified);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, CaptureError::SessionAddRejected { .. })));
        assert!(engine.video_input().is_none());
        assert!(engine.video_connection().is_none());
        assert_eq!(sim.last_session().unwrap().camera_input_count(), 0);

        assert_eq!(engine.switch_camera(DevicePosition::Back), Ok(DevicePosition::Back));
        assert_eq!(engine.current_device_position(), DevicePosition::Back);
        assert!(engine.video_connection().is_some());
    }

    #[test]
    fn refused_outputs_are_reported_and_capture_still_starts() {
        let (sim, engine) = phone();
        sim.refuse_outputs();

        let report = engine.configure();
        assert_eq!(report.position, DevicePosition::Front);
        for what in ["video output", "audio output"] {
            assert!(report.issues.contains(&CaptureError::SessionAddRejected {
                what: what.to_string()
            }));
        }
        assert_eq!(sim.last_session().unwrap().output_count(), 0);

        engine.start();
        assert!(engine.is_running());
    }

    #[test]
    fn unknown_camera_position_counts_as_back() {
        assert_eq!(steady_position(DevicePosition::Unspecified), DevicePosition::Back);
        assert_eq!(steady_position(DevicePosition::Front), DevicePosition::Front);
    }

    #[test]
    fn camera_without_position_is_never_selected() {
        let (_sim, engine) = simulated(SimulatedConfig {
            cameras: vec![SimulatedDeviceSpec::camera(
                "external",
                DevicePosition::Unspecified,
                DeviceTypes::WIDE_ANGLE_CAMERA,
            )],
            ..SimulatedConfig::default()
        });
        // the front camera default finds nothing
        assert_eq!(engine.current_device_position(), DevicePosition::Unspecified);
    }

    #[test]
    fn preview_moves_between_surfaces() {
        let (_sim, engine) = phone();
        let a = SimulatedSurface::new("a", Rect::new(0.0, 0.0, 390.0, 844.0));
        let b = SimulatedSurface::new("b", Rect::new(0.0, 0.0, 200.0, 100.0));
        let layer = engine.preview_layer();

        engine.attach_preview(Some(a.clone()));
        assert!(a.hosts(&layer));
        assert_eq!(layer.frame(), a.bounds());

        engine.attach_preview(Some(b.clone()));
        assert!(!a.hosts(&layer));
        assert!(b.hosts(&layer));
        assert_eq!(layer.frame(), Rect::new(0.0, 0.0, 200.0, 100.0));

        b.set_bounds(Rect::new(0.0, 0.0, 50.0, 50.0));
        assert_eq!(layer.frame(), Rect::new(0.0, 0.0, 200.0, 100.0));
        assert_eq!(simulated::preview_gravity(&layer), Some(VideoGravity::ResizeAspect));
    }

    #[test]
    fn detaching_preview_keeps_session_running() {
        let (_sim, engine) = phone();
        let a = SimulatedSurface::new("a", Rect::new(0.0, 0.0, 10.0, 10.0));
        engine.attach_preview(Some(a.clone()));
        engine.start();

        engine.attach_preview(None);
        assert_eq!(a.sublayer_count(), 0);
        assert!(engine.preview().is_none());
        assert!(engine.is_running());
    }

    #[test]
    fn preview_binding_is_weak() {
        let (_sim, engine) = phone();
        let a = SimulatedSurface::new("a", Rect::new(0.0, 0.0, 10.0, 10.0));
        engine.attach_preview(Some(a.clone()));
        assert!(engine.preview().is_some());

        drop(a);
        assert!(engine.preview().is_none());
        engine.attach_preview(None);
    }

    #[test]
    fn delegate_receives_video_samples() {
        let sim = SimulatedBackend::new(SimulatedConfig::default());
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        let engine = CaptureEngine::new(
            CaptureBackend::new(sim.clone()),
            Config::default(),
            Arc::new(move |sample: Arc<SampleBuffer>| {
                let _ = tx.lock().unwrap().send(sample.format.clone());
            }),
        );

        engine.start();
        assert!(sim.last_session().unwrap().emit_video_sample());
        let format = rx.try_recv().unwrap().unwrap();
        assert_eq!(format.to_string(), "1280x720 420v");
    }

    #[test]
    fn dropping_engine_stops_session() {
        let (sim, engine) = phone();
        engine.start();
        let session = sim.last_session().unwrap();
        drop(engine);
        assert!(!session.is_running());
    }
}
