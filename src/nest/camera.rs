//! Device-service client: frame grabs and cuepoint events for one camera.

use reqwest::header;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::session::CredentialBundle;

/// Production base URL of the device service.
pub const DEVICE_BASE_URL: &str = "https://nexusapi.camera.home.nest.com";

/// Frame width requested from the device service.
pub const DEFAULT_FRAME_WIDTH: u32 = 720;

/// Request timeout for device API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection timeout for device API calls.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One camera as reported by the account API.
///
/// Only the fields the tool uses are kept; the API sends many more, which
/// serde drops on the floor.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraInfo {
    /// Vendor uuid, the key for every device API call.
    pub uuid: String,
    /// Display name as configured in the vendor app.
    pub name: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub is_online: Option<bool>,
    /// Capability descriptor, kept as an opaque blob. Capture never looks
    /// inside it.
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

/// Client for the device API, bound to a single camera.
///
/// Carries a shared reference to the session credentials; every instance in
/// a run authenticates with the same bundle.
pub struct CameraClient {
    info: CameraInfo,
    creds: Arc<CredentialBundle>,
    base_url: String,
    http_client: reqwest::Client,
}

impl CameraClient {
    /// Create a client against the production device service.
    pub fn new(info: CameraInfo, creds: Arc<CredentialBundle>) -> Result<Self, CaptureError> {
        Self::with_base_url(info, creds, DEVICE_BASE_URL.to_string())
    }

    /// Create a client against a custom base URL (used in tests).
    pub fn with_base_url(
        info: CameraInfo,
        creds: Arc<CredentialBundle>,
        base_url: String,
    ) -> Result<Self, CaptureError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            info,
            creds,
            base_url,
            http_client,
        })
    }

    /// Display name of the camera, used for log lines and directory names.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn uuid(&self) -> &str {
        &self.info.uuid
    }

    pub fn id(&self) -> Option<i64> {
        self.info.id
    }

    pub fn capabilities(&self) -> &serde_json::Value {
        &self.info.capabilities
    }

    pub fn info(&self) -> &CameraInfo {
        &self.info
    }

    /// Fetch a single JPEG frame at the given width.
    ///
    /// A non-success status is a [`CaptureError::Transport`]; a success
    /// response with an empty body is [`CaptureError::EmptyImage`], which
    /// cameras produce while a stream is warming up.
    pub async fn grab_frame(&self, width: u32) -> Result<Vec<u8>, CaptureError> {
        let url = format!("{}/get_image", self.base_url);
        let width_param = width.to_string();

        log::debug!("Grabbing frame from '{}' ({})", self.info.name, self.info.uuid);
        let response = self
            .http_client
            .get(&url)
            .header(header::COOKIE, self.creds.cookie())
            .query(&[
                ("uuid", self.info.uuid.as_str()),
                ("width", width_param.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CaptureError::Transport { status, body });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(CaptureError::EmptyImage {
                camera: self.info.name.clone(),
            });
        }

        log::debug!("Got {} byte frame from '{}'", bytes.len(), self.info.name);
        Ok(bytes.to_vec())
    }

    /// Fetch cuepoint events between two epoch timestamps. An `end` of
    /// `None` means "up to now".
    pub async fn events(
        &self,
        start: i64,
        end: Option<i64>,
    ) -> Result<Vec<serde_json::Value>, CaptureError> {
        let end = end.unwrap_or_else(|| chrono::Utc::now().timestamp());
        let url = format!("{}/get_cuepoint", self.base_url);
        let start_param = start.to_string();
        let end_param = end.to_string();

        let response = self
            .http_client
            .get(&url)
            .header(header::COOKIE, self.creds.cookie())
            .query(&[
                ("uuid", self.info.uuid.as_str()),
                ("start_time", start_param.as_str()),
                ("end_time", end_param.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CaptureError::Transport { status, body });
        }

        let events: Vec<serde_json::Value> = response.json().await?;
        Ok(events)
    }
}

/// Errors from device API calls for a single camera.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera API returned HTTP {status}: {body}")]
    Transport { status: StatusCode, body: String },

    #[error("camera '{camera}' returned an empty image")]
    EmptyImage { camera: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_info() -> CameraInfo {
        CameraInfo {
            uuid: "uuid-1".to_string(),
            name: "Porch".to_string(),
            id: Some(7),
            is_online: Some(true),
            capabilities: serde_json::json!(["audio.microphone"]),
        }
    }

    fn test_creds() -> Arc<CredentialBundle> {
        Arc::new(CredentialBundle::new(
            "website_2=abc".to_string(),
            "access".to_string(),
            "session".to_string(),
        ))
    }

    #[test]
    fn test_camera_info_deserializes_with_extra_fields() {
        let json = r#"{
            "uuid": "u1",
            "name": "Garage",
            "id": 3,
            "is_online": false,
            "is_streaming_enabled": true,
            "capabilities": ["audio.microphone"]
        }"#;
        let info: CameraInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.uuid, "u1");
        assert_eq!(info.name, "Garage");
        assert_eq!(info.id, Some(3));
        assert_eq!(info.is_online, Some(false));
        assert_eq!(info.capabilities[0], "audio.microphone");
    }

    #[test]
    fn test_camera_info_optional_fields_default() {
        let info: CameraInfo =
            serde_json::from_str(r#"{"uuid": "u1", "name": "Porch"}"#).unwrap();
        assert_eq!(info.id, None);
        assert_eq!(info.is_online, None);
        assert!(info.capabilities.is_null());
    }

    #[test]
    fn test_new_points_at_production() {
        let client = CameraClient::new(test_info(), test_creds()).unwrap();
        assert_eq!(client.base_url, DEVICE_BASE_URL);
    }

    #[test]
    fn test_with_base_url_and_accessors() {
        let client = CameraClient::with_base_url(
            test_info(),
            test_creds(),
            "http://localhost:9".to_string(),
        )
        .unwrap();
        assert_eq!(client.name(), "Porch");
        assert_eq!(client.uuid(), "uuid-1");
        assert_eq!(client.id(), Some(7));
        assert_eq!(client.capabilities()[0], "audio.microphone");
        assert_eq!(client.info().is_online, Some(true));
    }

    #[test]
    fn test_default_frame_width() {
        assert_eq!(DEFAULT_FRAME_WIDTH, 720);
    }

    #[test]
    fn test_capture_error_display() {
        let err = CaptureError::Transport {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "stream offline".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "camera API returned HTTP 500 Internal Server Error: stream offline"
        );

        let err = CaptureError::EmptyImage {
            camera: "Porch".to_string(),
        };
        assert_eq!(err.to_string(), "camera 'Porch' returned an empty image");
    }
}
