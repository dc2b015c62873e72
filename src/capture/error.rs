use super::{DevicePosition, MediaType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("no {media} device at position {position}")]
    DeviceUnavailable {
        media: MediaType,
        position: DevicePosition,
    },
    #[error("cannot open input for {device}: {reason}")]
    InputConstruction { device: String, reason: String },
    #[error("session rejected {what}")]
    SessionAddRejected { what: String },
    #[error("cannot switch to {requested} camera while on {current}")]
    InvalidSwitchTarget {
        requested: DevicePosition,
        current: DevicePosition,
    },
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;
