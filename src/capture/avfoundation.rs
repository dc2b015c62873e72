//! AVFoundation capture backend for iOS and macOS.

use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;
use std::time::Duration;

use std::ffi::c_void;
use std::ptr::null;

use bytes::Bytes;
use icrate::{
    objc2::{declare_class, extern_class, rc::*, runtime::*, *},
    Foundation::*,
};

use super::sample::pack_planes;
use super::*;

#[link(name = "AVFoundation", kind = "framework")]
extern "C" {
    static AVMediaTypeVideo: &'static NSString;
    static AVMediaTypeAudio: &'static NSString;
    static AVCaptureDeviceTypeBuiltInDualCamera: &'static NSString;
    static AVCaptureDeviceTypeBuiltInTelephotoCamera: &'static NSString;
    static AVCaptureDeviceTypeBuiltInWideAngleCamera: &'static NSString;
    static AVCaptureDeviceTypeBuiltInMicrophone: &'static NSString;
    static AVCaptureSessionPreset1280x720: &'static NSString;
    static AVCaptureSessionPreset1920x1080: &'static NSString;
    static AVCaptureSessionPresetHigh: &'static NSString;
    static AVLayerVideoGravityResize: &'static NSString;
    static AVLayerVideoGravityResizeAspect: &'static NSString;
    static AVLayerVideoGravityResizeAspectFill: &'static NSString;
}

#[link(name = "QuartzCore", kind = "framework")]
extern "C" {}

// libdispatch is loaded differently on MacOS and iOS. Have a look in https://docs.rs/dispatch
// We don't care about the exact types.
#[link(name = "System", kind = "dylib")]
extern "C" {
    fn dispatch_queue_create(name: *const std::os::raw::c_char, attr: *const c_void) -> DispatchQueueT;
    fn dispatch_release(queue: DispatchQueueT);
}
type DispatchQueueT = *mut NSObject;

#[link(name = "CoreVideo", kind = "framework")]
extern "C" {
    fn CVPixelBufferLockBaseAddress(buf: CVBufferRef, option: u64) -> i32;
    fn CVPixelBufferUnlockBaseAddress(buf: CVBufferRef, option: u64) -> i32;
    fn CVPixelBufferGetBytesPerRow(buf: CVBufferRef) -> usize;
    fn CVPixelBufferGetHeight(buf: CVBufferRef) -> usize;
    fn CVPixelBufferIsPlanar(buf: CVBufferRef) -> bool;
    fn CVPixelBufferGetPlaneCount(buf: CVBufferRef) -> usize;
    fn CVPixelBufferGetHeightOfPlane(buf: CVBufferRef, index: usize) -> usize;
    fn CVPixelBufferGetBytesPerRowOfPlane(buf: CVBufferRef, index: usize) -> usize;
    fn CVPixelBufferGetBaseAddressOfPlane(buf: CVBufferRef, index: usize) -> *const u8;
    fn CVPixelBufferGetBaseAddress(buf: CVBufferRef) -> *const u8;
}

#[link(name = "CoreMedia", kind = "framework")]
extern "C" {
    fn CMSampleBufferGetFormatDescription(sbuf: *const c_void) -> *const c_void;
    fn CMSampleBufferGetImageBuffer(sbuf: *const c_void) -> CVBufferRef;
    fn CMSampleBufferGetPresentationTimeStamp(sbuf: *const c_void) -> CMTime;
    fn CMFormatDescriptionGetMediaSubType(desc: *const c_void) -> u32;
    fn CMVideoFormatDescriptionGetDimensions(desc: *const c_void) -> CMVideoDimensions;
}

#[repr(C)]
struct CVBuffer {
    _priv: [u8; 0],
}
type CVBufferRef = *const CVBuffer;

#[repr(C)]
#[derive(Debug)]
struct CMVideoDimensions {
    width: i32,
    height: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CMTime {
    value: i64,
    timescale: i32,
    flags: u32,
    epoch: i64,
}

impl CMTime {
    fn to_duration(self) -> Duration {
        const VALID: u32 = 1;
        if self.flags & VALID == 0 || self.timescale <= 0 || self.value < 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.value as f64 / self.timescale as f64)
    }
}

/*  */

extern_class! {
    #[derive(PartialEq, Eq, Hash, Debug)]
    pub struct AVCaptureDevice;

    unsafe impl ClassType for AVCaptureDevice {
        type Super = NSObject;
    }
}

impl AVCaptureDevice {
    fn default_for(media: &NSString) -> Option<Id<Self, Shared>> {
        unsafe { msg_send_id![Self::class(), defaultDeviceWithMediaType: media] }
    }

    fn devices_for(media: &NSString) -> Id<NSArray<AVCaptureDevice>, Shared> {
        unsafe { msg_send_id![Self::class(), devicesWithMediaType: media] }
    }

    fn unique_id(&self) -> Id<NSString, Shared> {
        unsafe { msg_send_id![self, uniqueID] }
    }

    fn localized_name(&self) -> Id<NSString, Shared> {
        unsafe { msg_send_id![self, localizedName] }
    }

    fn raw_position(&self) -> isize {
        unsafe { msg_send![self, position] }
    }

    fn device_type(&self) -> Id<NSString, Shared> {
        unsafe { msg_send_id![self, deviceType] }
    }
}

extern_class! {
    pub struct AVCaptureDeviceDiscoverySession;

    unsafe impl ClassType for AVCaptureDeviceDiscoverySession {
        type Super = NSObject;
    }
}

impl AVCaptureDeviceDiscoverySession {
    fn new(
        types: &NSArray<NSString>,
        media: &NSString,
        position: isize,
    ) -> Id<Self, Shared> {
        unsafe {
            msg_send_id![
                Self::class(),
                discoverySessionWithDeviceTypes: types,
                mediaType: media,
                position: position
            ]
        }
    }

    fn devices(&self) -> Id<NSArray<AVCaptureDevice>, Shared> {
        unsafe { msg_send_id![self, devices] }
    }
}

extern_class! {
    pub struct AVCaptureDeviceInput;

    unsafe impl ClassType for AVCaptureDeviceInput {
        type Super = NSObject; // it is really AVCaptureInput
    }
}

impl AVCaptureDeviceInput {
    fn from_device(
        device: &AVCaptureDevice,
    ) -> std::result::Result<Id<Self, Shared>, Id<NSError, Shared>> {
        unsafe { msg_send_id![Self::class(), deviceInputWithDevice: device, error: _] }
    }
}

extern_class! {
    pub struct AVCaptureSession;

    unsafe impl ClassType for AVCaptureSession {
        type Super = NSObject;
    }
}

impl AVCaptureSession {
    fn new() -> Id<Self, Shared> {
        unsafe { msg_send_id![Self::class(), new] }
    }
}

extern_class! {
    pub struct AVCaptureConnection;

    unsafe impl ClassType for AVCaptureConnection {
        type Super = NSObject;
    }
}

extern_class! {
    pub struct AVCaptureVideoPreviewLayer;

    unsafe impl ClassType for AVCaptureVideoPreviewLayer {
        type Super = NSObject; // it is really CALayer
    }
}

impl AVCaptureVideoPreviewLayer {
    fn with_session(session: &AVCaptureSession) -> Id<Self, Shared> {
        unsafe { msg_send_id![Self::class(), layerWithSession: session] }
    }
}

/*  */

type CallbackPtr = *const c_void;

struct DelegateContext {
    media: MediaType,
    delegate: SharedDelegate,
}

declare_class!(
    pub struct SampleBufferDelegateObject {
        pub callback: CallbackPtr,
    }

    unsafe impl ClassType for SampleBufferDelegateObject {
        type Super = NSObject;
    }

    unsafe impl SampleBufferDelegateObject {
        #[method(initWithCallback:)]
        fn init_with(&mut self, callback: CallbackPtr) -> Option<&mut Self> {
            let this: Option<&mut Self> = unsafe { msg_send![super(self), init] };
            this.map(|this| {
                *this.callback = callback;
                this
            })
        }

        #[method(captureOutput:didOutputSampleBuffer:fromConnection:)]
        fn __did_output(
            &self,
            _output: *const c_void,
            sample: *const c_void,
            _connection: *const c_void,
        ) {
            if let Some((context, sample)) = self.context_and_sample(sample) {
                context.delegate.did_output(sample);
            }
        }

        #[method(captureOutput:didDropSampleBuffer:fromConnection:)]
        fn __did_drop(
            &self,
            _output: *const c_void,
            sample: *const c_void,
            _connection: *const c_void,
        ) {
            if let Some((context, sample)) = self.context_and_sample(sample) {
                context.delegate.did_drop(sample);
            }
        }
    }
);

impl SampleBufferDelegateObject {
    fn new(context: *const DelegateContext) -> Id<Self, Shared> {
        let void_ptr = context as *const c_void;
        let cls = Self::class();
        unsafe { msg_send_id![msg_send_id![cls, alloc], initWithCallback: void_ptr] }
    }

    fn context_and_sample(
        &self,
        sample: *const c_void,
    ) -> Option<(&DelegateContext, Arc<SampleBuffer>)> {
        let context_ptr = (*self.callback).cast::<DelegateContext>();
        let Some(context) = (unsafe { context_ptr.as_ref() }) else {
            log::error!("captureOutput: delegate context is null");
            return None;
        };
        if sample.is_null() {
            log::warn!("captureOutput: sample is null");
            return None;
        }
        Some((context, Arc::new(unsafe { copy_sample(context.media, sample) })))
    }
}

/// Copies the payload out of a `CMSampleBuffer` so it outlives the callback.
unsafe fn copy_sample(media: MediaType, sbuf: *const c_void) -> SampleBuffer {
    let presentation_time = CMSampleBufferGetPresentationTimeStamp(sbuf).to_duration();
    if media == MediaType::Audio {
        return SampleBuffer {
            media_type: media,
            presentation_time,
            format: None,
            data: Bytes::new(),
        };
    }

    let desc = CMSampleBufferGetFormatDescription(sbuf);
    let dim = CMVideoFormatDescriptionGetDimensions(desc);
    let format = SampleFormat {
        width: dim.width,
        height: dim.height,
        pixel_format: fourcc_to_string(CMFormatDescriptionGetMediaSubType(desc)),
    };

    let ibuf = CMSampleBufferGetImageBuffer(sbuf);
    let data = if ibuf.is_null() || CVPixelBufferLockBaseAddress(ibuf, 1) != 0 {
        Bytes::new()
    } else {
        // Planes need not be contiguous, each is read from its own base address.
        let bytes = if CVPixelBufferIsPlanar(ibuf) {
            pack_planes((0..CVPixelBufferGetPlaneCount(ibuf)).filter_map(|index| {
                let address = CVPixelBufferGetBaseAddressOfPlane(ibuf, index);
                let len = CVPixelBufferGetBytesPerRowOfPlane(ibuf, index)
                    * CVPixelBufferGetHeightOfPlane(ibuf, index);
                (!address.is_null()).then(|| std::slice::from_raw_parts(address, len))
            }))
        } else {
            let address = CVPixelBufferGetBaseAddress(ibuf);
            let len = CVPixelBufferGetBytesPerRow(ibuf) * CVPixelBufferGetHeight(ibuf);
            if address.is_null() {
                Bytes::new()
            } else {
                Bytes::copy_from_slice(std::slice::from_raw_parts(address, len))
            }
        };
        CVPixelBufferUnlockBaseAddress(ibuf, 1);
        bytes
    };

    SampleBuffer {
        media_type: media,
        presentation_time,
        format: Some(format),
        data,
    }
}

/*  */

fn media_string(media: MediaType) -> &'static NSString {
    unsafe {
        match media {
            MediaType::Video => AVMediaTypeVideo,
            MediaType::Audio => AVMediaTypeAudio,
        }
    }
}

fn preset_string(preset: SessionPreset) -> &'static NSString {
    unsafe {
        match preset {
            SessionPreset::Hd1280x720 => AVCaptureSessionPreset1280x720,
            SessionPreset::Hd1920x1080 => AVCaptureSessionPreset1920x1080,
            SessionPreset::High => AVCaptureSessionPresetHigh,
        }
    }
}

fn gravity_string(gravity: VideoGravity) -> &'static NSString {
    unsafe {
        match gravity {
            VideoGravity::Resize => AVLayerVideoGravityResize,
            VideoGravity::ResizeAspect => AVLayerVideoGravityResizeAspect,
            VideoGravity::ResizeAspectFill => AVLayerVideoGravityResizeAspectFill,
        }
    }
}

/// AVCaptureDevicePosition
fn position_from_raw(raw: isize) -> DevicePosition {
    match raw {
        1 => DevicePosition::Back,
        2 => DevicePosition::Front,
        _ => DevicePosition::Unspecified,
    }
}

fn position_to_raw(position: DevicePosition) -> isize {
    match position {
        DevicePosition::Unspecified => 0,
        DevicePosition::Back => 1,
        DevicePosition::Front => 2,
    }
}

/// AVCaptureVideoOrientation
fn orientation_to_raw(orientation: VideoOrientation) -> isize {
    match orientation {
        VideoOrientation::Portrait => 1,
        VideoOrientation::PortraitUpsideDown => 2,
        VideoOrientation::LandscapeRight => 3,
        VideoOrientation::LandscapeLeft => 4,
    }
}

fn orientation_from_raw(raw: isize) -> VideoOrientation {
    match raw {
        2 => VideoOrientation::PortraitUpsideDown,
        3 => VideoOrientation::LandscapeRight,
        4 => VideoOrientation::LandscapeLeft,
        _ => VideoOrientation::Portrait,
    }
}

fn device_types_list(types: DeviceTypes) -> Id<NSArray<NSString>, Shared> {
    let mut list = Vec::new();
    unsafe {
        for (flag, name) in [
            (DeviceTypes::DUAL_CAMERA, AVCaptureDeviceTypeBuiltInDualCamera),
            (DeviceTypes::TELEPHOTO_CAMERA, AVCaptureDeviceTypeBuiltInTelephotoCamera),
            (DeviceTypes::WIDE_ANGLE_CAMERA, AVCaptureDeviceTypeBuiltInWideAngleCamera),
            (DeviceTypes::MICROPHONE, AVCaptureDeviceTypeBuiltInMicrophone),
        ] {
            if types.contains(flag) {
                list.push(NSString::from_str(&name.to_string()));
            }
        }
    }
    NSArray::from_vec(list)
}

fn device_types_from(name: &NSString) -> DeviceTypes {
    let name = name.to_string();
    unsafe {
        [
            (DeviceTypes::DUAL_CAMERA, AVCaptureDeviceTypeBuiltInDualCamera),
            (DeviceTypes::TELEPHOTO_CAMERA, AVCaptureDeviceTypeBuiltInTelephotoCamera),
            (DeviceTypes::WIDE_ANGLE_CAMERA, AVCaptureDeviceTypeBuiltInWideAngleCamera),
            (DeviceTypes::MICROPHONE, AVCaptureDeviceTypeBuiltInMicrophone),
        ]
        .into_iter()
        .find(|(_, known)| known.to_string() == name)
        .map_or(DeviceTypes::empty(), |(flag, _)| flag)
    }
}

fn to_ns_rect(rect: Rect) -> NSRect {
    NSRect::new(
        NSPoint::new(rect.x as _, rect.y as _),
        NSSize::new(rect.width as _, rect.height as _),
    )
}

fn from_ns_rect(rect: NSRect) -> Rect {
    Rect::new(
        rect.origin.x as _,
        rect.origin.y as _,
        rect.size.width as _,
        rect.size.height as _,
    )
}

/*****************************************************************************/

/// The AVFoundation capture stack of this machine.
pub struct AvFoundation;

impl Backend for AvFoundation {
    fn discover(
        &self,
        types: DeviceTypes,
        media: MediaType,
        position: DevicePosition,
    ) -> Vec<CaptureDevice> {
        let session = AVCaptureDeviceDiscoverySession::new(
            &device_types_list(types),
            media_string(media),
            position_to_raw(position),
        );
        session.devices().iter().filter_map(AvDevice::wrap).collect()
    }

    fn devices(&self, media: MediaType) -> Vec<CaptureDevice> {
        AVCaptureDevice::devices_for(media_string(media))
            .iter()
            .filter_map(AvDevice::wrap)
            .collect()
    }

    fn default_device(&self, media: MediaType) -> Option<CaptureDevice> {
        AVCaptureDevice::default_for(media_string(media))
            .map(|device| CaptureDevice::new(AvDevice { device }))
    }

    fn open_input(&self, device: &CaptureDevice) -> Result<CaptureInput> {
        let Some(av_device) = device.downcast_ref::<AvDevice>() else {
            return Err(CaptureError::InputConstruction {
                device: device.name(),
                reason: "not an AVFoundation device".to_string(),
            });
        };
        match AVCaptureDeviceInput::from_device(&av_device.device) {
            Ok(input) => Ok(CaptureInput::new(AvInput {
                input,
                device: device.clone(),
            })),
            Err(err) => Err(CaptureError::InputConstruction {
                device: device.name(),
                reason: err.localized_description().to_string(),
            }),
        }
    }

    fn new_session(&self) -> CaptureSession {
        CaptureSession::new(AvSession {
            session: AVCaptureSession::new(),
        })
    }

    fn new_data_output(&self, media: MediaType, delegate: SharedDelegate) -> CaptureOutput {
        let cls = match media {
            MediaType::Video => class!(AVCaptureVideoDataOutput),
            MediaType::Audio => class!(AVCaptureAudioDataOutput),
        };
        let output: Id<NSObject, Shared> = unsafe { msg_send_id![cls, new] };

        let context = Box::new(DelegateContext { media, delegate });
        let object = SampleBufferDelegateObject::new(&*context);

        let name = CString::new(format!("{media} samples")).unwrap_or_default();
        // Calling create, setSampleBufferDelegate and release like ffmpeg does
        // https://github.com/FFmpeg/FFmpeg/blob/master/libavdevice/avfoundation.m
        let queue = unsafe { dispatch_queue_create(name.as_ptr(), null()) };
        let _: () = unsafe { msg_send![&output, setSampleBufferDelegate: &*object, queue: queue] };
        unsafe { dispatch_release(queue) };

        CaptureOutput::new(AvOutput {
            output,
            media,
            _object: object,
            _context: context,
        })
    }

    fn new_preview_layer(&self, session: &CaptureSession) -> CapturePreviewLayer {
        let session = match session.as_any().downcast_ref::<AvSession>() {
            Some(session) => session.session.clone(),
            None => {
                log::error!("preview layer requested for a session from another backend");
                AVCaptureSession::new()
            }
        };
        CapturePreviewLayer::new(AvPreviewLayer {
            layer: AVCaptureVideoPreviewLayer::with_session(&session),
        })
    }
}

struct AvDevice {
    device: Id<AVCaptureDevice, Shared>,
}

// AVCaptureDevice is documented thread safe.
unsafe impl Send for AvDevice {}
unsafe impl Sync for AvDevice {}

impl AvDevice {
    fn wrap(device: &AVCaptureDevice) -> Option<CaptureDevice> {
        let device = unsafe { Id::retain(device as *const _ as *mut AVCaptureDevice) }?;
        Some(CaptureDevice::new(AvDevice { device }))
    }
}

impl Device for AvDevice {
    fn unique_id(&self) -> String {
        self.device.unique_id().to_string()
    }

    fn name(&self) -> String {
        self.device.localized_name().to_string()
    }

    fn position(&self) -> DevicePosition {
        position_from_raw(self.device.raw_position())
    }

    fn device_type(&self) -> DeviceTypes {
        device_types_from(&self.device.device_type())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AvInput {
    input: Id<AVCaptureDeviceInput, Shared>,
    device: CaptureDevice,
}

unsafe impl Send for AvInput {}
unsafe impl Sync for AvInput {}

impl Input for AvInput {
    fn device(&self) -> CaptureDevice {
        self.device.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AvOutput {
    output: Id<NSObject, Shared>,
    media: MediaType,
    _object: Id<SampleBufferDelegateObject, Shared>,
    // referenced by _object, must outlive it
    _context: Box<DelegateContext>,
}

unsafe impl Send for AvOutput {}
unsafe impl Sync for AvOutput {}

impl Output for AvOutput {
    fn media_type(&self) -> MediaType {
        self.media
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AvSession {
    session: Id<AVCaptureSession, Shared>,
}

unsafe impl Send for AvSession {}
unsafe impl Sync for AvSession {}

fn av_input(input: &CaptureInput) -> Option<&AVCaptureDeviceInput> {
    input
        .as_any()
        .downcast_ref::<AvInput>()
        .map(|input| &*input.input)
}

fn av_output(output: &CaptureOutput) -> Option<&NSObject> {
    output
        .as_any()
        .downcast_ref::<AvOutput>()
        .map(|output| &*output.output)
}

impl Session for AvSession {
    fn can_set_preset(&self, preset: SessionPreset) -> bool {
        unsafe { msg_send![&self.session, canSetSessionPreset: preset_string(preset)] }
    }

    fn set_preset(&self, preset: SessionPreset) {
        unsafe { msg_send![&self.session, setSessionPreset: preset_string(preset)] }
    }

    fn begin_configuration(&self) {
        unsafe { msg_send![&self.session, beginConfiguration] }
    }

    fn commit_configuration(&self) {
        unsafe { msg_send![&self.session, commitConfiguration] }
    }

    fn can_add_input(&self, input: &CaptureInput) -> bool {
        match av_input(input) {
            Some(input) => unsafe { msg_send![&self.session, canAddInput: input] },
            None => false,
        }
    }

    fn add_input(&self, input: &CaptureInput) {
        if let Some(input) = av_input(input) {
            unsafe { msg_send![&self.session, addInput: input] }
        }
    }

    fn remove_input(&self, input: &CaptureInput) {
        if let Some(input) = av_input(input) {
            unsafe { msg_send![&self.session, removeInput: input] }
        }
    }

    fn can_add_output(&self, output: &CaptureOutput) -> bool {
        match av_output(output) {
            Some(output) => unsafe { msg_send![&self.session, canAddOutput: output] },
            None => false,
        }
    }

    fn add_output(&self, output: &CaptureOutput) {
        if let Some(output) = av_output(output) {
            unsafe { msg_send![&self.session, addOutput: output] }
        }
    }

    fn connection(&self, output: &CaptureOutput, media: MediaType) -> Option<CaptureConnection> {
        let output = av_output(output)?;
        let connection: Option<Id<AVCaptureConnection, Shared>> =
            unsafe { msg_send_id![output, connectionWithMediaType: media_string(media)] };
        connection.map(|connection| CaptureConnection::new(AvConnection { connection }))
    }

    fn start_running(&self) {
        unsafe { msg_send![&self.session, startRunning] }
    }

    fn stop_running(&self) {
        unsafe { msg_send![&self.session, stopRunning] }
    }

    fn is_running(&self) -> bool {
        unsafe { msg_send![&self.session, isRunning] }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AvConnection {
    connection: Id<AVCaptureConnection, Shared>,
}

unsafe impl Send for AvConnection {}
unsafe impl Sync for AvConnection {}

impl Connection for AvConnection {
    fn is_video_mirroring_supported(&self) -> bool {
        unsafe { msg_send![&self.connection, isVideoMirroringSupported] }
    }

    fn set_video_mirrored(&self, mirrored: bool) {
        unsafe {
            let _: () = msg_send![&self.connection, setAutomaticallyAdjustsVideoMirroring: false];
            msg_send![&self.connection, setVideoMirrored: mirrored]
        }
    }

    fn is_video_mirrored(&self) -> bool {
        unsafe { msg_send![&self.connection, isVideoMirrored] }
    }

    fn set_video_orientation(&self, orientation: VideoOrientation) {
        unsafe { msg_send![&self.connection, setVideoOrientation: orientation_to_raw(orientation)] }
    }

    fn video_orientation(&self) -> VideoOrientation {
        orientation_from_raw(unsafe { msg_send![&self.connection, videoOrientation] })
    }
}

struct AvPreviewLayer {
    layer: Id<AVCaptureVideoPreviewLayer, Shared>,
}

unsafe impl Send for AvPreviewLayer {}
unsafe impl Sync for AvPreviewLayer {}

impl PreviewLayer for AvPreviewLayer {
    fn set_frame(&self, frame: Rect) {
        unsafe { msg_send![&self.layer, setFrame: to_ns_rect(frame)] }
    }

    fn frame(&self) -> Rect {
        from_ns_rect(unsafe { msg_send![&self.layer, frame] })
    }

    fn set_video_gravity(&self, gravity: VideoGravity) {
        unsafe { msg_send![&self.layer, setVideoGravity: gravity_string(gravity)] }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A `CALayer` of the host UI, e.g. the backing layer of a `UIView`.
pub struct LayerSurface {
    layer: Id<NSObject, Shared>,
}

// Only touched from the main thread by the host controller.
unsafe impl Send for LayerSurface {}
unsafe impl Sync for LayerSurface {}

impl LayerSurface {
    /// # Safety
    /// `layer` must point to a live `CALayer`.
    pub unsafe fn from_raw(layer: *mut NSObject) -> Option<Arc<Self>> {
        Id::retain(layer).map(|layer| Arc::new(Self { layer }))
    }
}

impl Surface for LayerSurface {
    fn bounds(&self) -> Rect {
        from_ns_rect(unsafe { msg_send![&self.layer, bounds] })
    }

    fn add_sublayer(&self, layer: &CapturePreviewLayer) {
        if let Some(layer) = layer.as_any().downcast_ref::<AvPreviewLayer>() {
            unsafe { msg_send![&self.layer, addSublayer: &*layer.layer] }
        }
    }

    fn remove_sublayer(&self, layer: &CapturePreviewLayer) {
        if let Some(layer) = layer.as_any().downcast_ref::<AvPreviewLayer>() {
            unsafe { msg_send![&layer.layer, removeFromSuperlayer] }
        }
    }
}
