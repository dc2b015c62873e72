//! Camera preview: a capture engine that owns one capture session with a
//! front or back camera, plus the host glue that shows it on screen.

pub mod capture;
pub mod host;
