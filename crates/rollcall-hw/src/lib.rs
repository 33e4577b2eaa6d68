//! rollcall-hw — V4L2 webcam capture.
//!
//! Opens a capture device, negotiates a pixel format, and hands back
//! grayscale frames ready for the face encoder.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
