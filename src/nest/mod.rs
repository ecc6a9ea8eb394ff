//! Vendor API integration module.
//!
//! Two HTTP services back the capture tool: the account service handles
//! login and camera enumeration, the device service serves frame grabs and
//! cuepoint events. Each gets its own client type here.

mod camera;
mod session;

pub use camera::{
    CameraClient, CameraInfo, CaptureError, DEFAULT_FRAME_WIDTH, DEVICE_BASE_URL,
};
pub use session::{
    AuthError, CredentialBundle, SessionClient, ACCOUNT_BASE_URL, SESSION_COOKIE,
};
