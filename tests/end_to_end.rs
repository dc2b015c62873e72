use std::sync::Arc;
use std::time::Duration;

use campreview::capture::*;
use campreview::host::HostController;

#[test]
fn preview_start_switch_stop() {
    let sim = SimulatedBackend::new(SimulatedConfig::default());
    let engine = Arc::new(CaptureEngine::with_defaults(CaptureBackend::new(
        sim.clone(),
    )));
    let view_a = SimulatedSurface::new("a", Rect::new(0.0, 0.0, 390.0, 844.0));

    engine.attach_preview(Some(view_a.clone()));
    engine.start();
    assert!(engine.is_running());
    assert_eq!(engine.current_device_position(), DevicePosition::Front);

    assert_eq!(engine.switch_camera(DevicePosition::Back), Ok(DevicePosition::Back));
    assert_eq!(engine.current_device_position(), DevicePosition::Back);
    assert!(engine.is_running());

    let input = engine.video_input().unwrap();
    assert!(matches!(
        engine.switch_camera(DevicePosition::Back),
        Err(CaptureError::InvalidSwitchTarget { .. })
    ));
    assert!(engine.video_input().unwrap().ptr_eq(&input));
    assert_eq!(sim.last_session().unwrap().camera_input_count(), 1);

    engine.stop();
    assert!(!engine.is_running());
    assert!(view_a.hosts(&engine.preview_layer()));
}

#[test]
fn samples_flow_while_running_through_host() {
    let sim = SimulatedBackend::new(SimulatedConfig {
        frame_interval: Some(Duration::from_millis(2)),
        ..SimulatedConfig::default()
    });
    let (tx, rx) = std::sync::mpsc::sync_channel(64);
    let delegate: SharedDelegate = Arc::new(move |sample: Arc<SampleBuffer>| {
        let _ = tx.try_send(sample.media_type);
    });
    let engine = Arc::new(CaptureEngine::new(
        CaptureBackend::new(sim),
        Config::default(),
        delegate,
    ));
    let screen = SimulatedSurface::new("screen", Rect::new(0.0, 0.0, 100.0, 200.0));
    let host = HostController::new(engine.clone(), screen);

    host.view_did_load();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)),
        Ok(MediaType::Video)
    );

    assert_eq!(host.interaction_began(), Some(Ok(DevicePosition::Back)));
    while rx.try_recv().is_ok() {}
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)),
        Ok(MediaType::Video)
    );

    engine.stop();
    while rx.try_recv().is_ok() {}
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}
