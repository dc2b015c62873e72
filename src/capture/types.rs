use bitflags::bitflags;

/// Physical position of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevicePosition {
    Unspecified,
    Back,
    Front,
}

impl DevicePosition {
    /// The opposite camera, `None` for [`DevicePosition::Unspecified`].
    pub fn toggled(self) -> Option<Self> {
        match self {
            Self::Front => Some(Self::Back),
            Self::Back => Some(Self::Front),
            Self::Unspecified => None,
        }
    }
}

impl std::fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "unspecified",
            Self::Back => "back",
            Self::Front => "front",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Audio => "audio",
        })
    }
}

bitflags! {
    /// Kinds of built-in cameras a discovery query may match.
    pub struct DeviceTypes: u32 {
        const DUAL_CAMERA = 0b0001;
        const TELEPHOTO_CAMERA = 0b0010;
        const WIDE_ANGLE_CAMERA = 0b0100;
        const MICROPHONE = 0b1000;
    }
}

impl DeviceTypes {
    /// The camera kinds considered when resolving a device for a position,
    /// in preference order.
    pub fn cameras() -> Self {
        Self::DUAL_CAMERA | Self::TELEPHOTO_CAMERA | Self::WIDE_ANGLE_CAMERA
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoGravity {
    ResizeAspect,
    ResizeAspectFill,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPreset {
    Hd1280x720,
    Hd1920x1080,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Settings applied once when the engine configures its session.
#[derive(Debug, Clone)]
pub struct Config {
    pub preset: SessionPreset,
    /// Camera used before any switch. Front, not the usual back camera.
    pub default_position: DevicePosition,
    pub orientation: VideoOrientation,
    pub video_gravity: VideoGravity,
    pub capture_audio: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preset: SessionPreset::Hd1280x720,
            default_position: DevicePosition::Front,
            orientation: VideoOrientation::Portrait,
            video_gravity: VideoGravity::ResizeAspect,
            capture_audio: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_positions() {
        assert_eq!(DevicePosition::Front.toggled(), Some(DevicePosition::Back));
        assert_eq!(DevicePosition::Back.toggled(), Some(DevicePosition::Front));
        assert_eq!(DevicePosition::Unspecified.toggled(), None);
    }

    #[test]
    fn default_config_prefers_front_camera() {
        let config = Config::default();
        assert_eq!(config.default_position, DevicePosition::Front);
        assert_eq!(config.orientation, VideoOrientation::Portrait);
        assert_eq!(config.video_gravity, VideoGravity::ResizeAspect);
    }

    #[test]
    fn camera_types_exclude_microphone() {
        assert!(!DeviceTypes::cameras().contains(DeviceTypes::MICROPHONE));
        assert!(DeviceTypes::cameras().contains(DeviceTypes::WIDE_ANGLE_CAMERA));
    }
}
