//! Account-service client: login and camera enumeration.
//!
//! Talks to the vendor account API over HTTPS. A successful login yields a
//! [`CredentialBundle`] that every later request authenticates with; the
//! bundle is never refreshed, a run lives and dies with one session.

use reqwest::header::{self, HeaderMap};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use super::camera::CameraInfo;

/// Production base URL of the account service.
pub const ACCOUNT_BASE_URL: &str = "https://www.dropcam.com";

/// Name of the session cookie the login response must set.
pub const SESSION_COOKIE: &str = "website_2";

/// Request timeout for account API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection timeout for account API calls.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session credentials extracted from a successful login.
///
/// Holds the `website_2` cookie as a ready-to-send `name=value` pair plus the
/// two bearer tokens from the response body. Immutable once built; shared
/// read-only across camera clients.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    cookie: String,
    access_token: String,
    session_token: String,
}

impl CredentialBundle {
    pub fn new(cookie: String, access_token: String, session_token: String) -> Self {
        Self {
            cookie,
            access_token,
            session_token,
        }
    }

    /// The session cookie as a `website_2=...` pair for a `Cookie` header.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }
}

/// Client for the vendor account API.
pub struct SessionClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl SessionClient {
    /// Create a client against the production account service.
    pub fn new() -> Result<Self, AuthError> {
        Self::with_base_url(ACCOUNT_BASE_URL.to_string())
    }

    /// Create a client against a custom base URL (used in tests).
    pub fn with_base_url(base_url: String) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Log in with account credentials and build the session bundle.
    ///
    /// Posts the login form, then requires all three credential pieces: the
    /// `website_2` cookie from the response headers and both tokens from
    /// `items[0]` of the body. A non-success status or any missing piece is
    /// an [`AuthError`].
    pub async fn login(&self, user: &str, passwd: &str) -> Result<CredentialBundle, AuthError> {
        let url = format!("{}/api/v1/login.login", self.base_url);
        let params = [("username", user), ("password", passwd)];

        log::debug!("Logging in to {} as {}", self.base_url, user);
        let response = self
            .http_client
            .post(&url)
            .header(header::REFERER, &self.base_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::Rejected { status, body });
        }

        // The cookie lives in the headers, so grab it before the body read
        // consumes the response.
        let cookie = session_cookie(response.headers()).ok_or(AuthError::MalformedResponse {
            field: "website_2 cookie",
        })?;

        let parsed: LoginResponse = response.json().await?;
        let item = parsed
            .items
            .into_iter()
            .next()
            .ok_or(AuthError::MalformedResponse { field: "items" })?;
        let access_token = item.nest_access_token.ok_or(AuthError::MalformedResponse {
            field: "nest_access_token",
        })?;
        let session_token = item.session_token.ok_or(AuthError::MalformedResponse {
            field: "session_token",
        })?;

        log::info!("Logged in as {}", user);
        Ok(CredentialBundle::new(cookie, access_token, session_token))
    }

    /// List every camera visible to the session, owned cameras only.
    pub async fn visible_cameras(
        &self,
        creds: &CredentialBundle,
    ) -> Result<Vec<CameraInfo>, AuthError> {
        let url = format!("{}/api/v1/cameras.get_visible", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .header(header::COOKIE, creds.cookie())
            .query(&[("group_cameras", "true")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::Rejected { status, body });
        }

        let parsed: VisibleResponse = response.json().await?;
        let item = parsed
            .items
            .into_iter()
            .next()
            .ok_or(AuthError::MalformedResponse { field: "items" })?;

        log::debug!("Account reports {} owned camera(s)", item.owned.len());
        Ok(item.owned)
    }
}

/// Pull the `website_2` session cookie out of the login response headers.
/// Attributes after the first `;` are dropped; only the bare pair is kept.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(header::SET_COOKIE) {
        if let Ok(raw) = value.to_str() {
            let pair = raw.split(';').next().unwrap_or("").trim();
            if let Some((name, _)) = pair.split_once('=') {
                if name == SESSION_COOKIE {
                    return Some(pair.to_string());
                }
            }
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    items: Vec<LoginItem>,
}

#[derive(Debug, Deserialize)]
struct LoginItem {
    #[serde(default)]
    nest_access_token: Option<String>,
    #[serde(default)]
    session_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VisibleResponse {
    #[serde(default)]
    items: Vec<VisibleItem>,
}

#[derive(Debug, Deserialize)]
struct VisibleItem {
    #[serde(default)]
    owned: Vec<CameraInfo>,
}

/// Errors from login and camera enumeration.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("account API returned HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("account response missing {field}")]
    MalformedResponse { field: &'static str },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers_with_cookies(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(header::SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        headers
    }

    // === Cookie extraction ===

    #[test]
    fn test_session_cookie_extracted_with_attributes_stripped() {
        let headers = headers_with_cookies(&[
            "website_2=abc123; Path=/; Secure; HttpOnly",
        ]);
        assert_eq!(
            session_cookie(&headers),
            Some("website_2=abc123".to_string())
        );
    }

    #[test]
    fn test_session_cookie_skips_other_cookies() {
        let headers = headers_with_cookies(&[
            "csrf_token=zzz; Path=/",
            "website_2=abc123; HttpOnly",
            "tracking=1",
        ]);
        assert_eq!(
            session_cookie(&headers),
            Some("website_2=abc123".to_string())
        );
    }

    #[test]
    fn test_session_cookie_missing_returns_none() {
        let headers = headers_with_cookies(&["csrf_token=zzz; Path=/"]);
        assert_eq!(session_cookie(&headers), None);
    }

    #[test]
    fn test_session_cookie_value_may_contain_equals() {
        let headers = headers_with_cookies(&["website_2=a=b=c; Path=/"]);
        assert_eq!(session_cookie(&headers), Some("website_2=a=b=c".to_string()));
    }

    // === Response bodies ===

    #[test]
    fn test_login_response_deserializes() {
        let json = r#"{
            "status": 0,
            "items": [{
                "nest_access_token": "tok-access",
                "session_token": "tok-session",
                "extra": true
            }]
        }"#;
        let parsed: LoginResponse = serde_json::from_str(json).unwrap();
        let item = &parsed.items[0];
        assert_eq!(item.nest_access_token.as_deref(), Some("tok-access"));
        assert_eq!(item.session_token.as_deref(), Some("tok-session"));
    }

    #[test]
    fn test_login_response_tolerates_missing_fields() {
        let parsed: LoginResponse = serde_json::from_str(r#"{"status": 0}"#).unwrap();
        assert!(parsed.items.is_empty());

        let parsed: LoginResponse =
            serde_json::from_str(r#"{"items": [{"session_token": "s"}]}"#).unwrap();
        assert!(parsed.items[0].nest_access_token.is_none());
    }

    #[test]
    fn test_visible_response_deserializes_owned_list() {
        let json = r#"{
            "items": [{
                "owned": [
                    {"uuid": "u1", "name": "Porch", "id": 7},
                    {"uuid": "u2", "name": "Garage"}
                ],
                "subscribed": []
            }]
        }"#;
        let parsed: VisibleResponse = serde_json::from_str(json).unwrap();
        let owned = &parsed.items[0].owned;
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].uuid, "u1");
        assert_eq!(owned[1].name, "Garage");
    }

    // === Client construction ===

    #[test]
    fn test_with_base_url() {
        let client = SessionClient::with_base_url("http://localhost:9".to_string()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9");
    }

    #[test]
    fn test_new_points_at_production() {
        let client = SessionClient::new().unwrap();
        assert_eq!(client.base_url(), ACCOUNT_BASE_URL);
    }

    #[test]
    fn test_credential_bundle_accessors() {
        let creds = CredentialBundle::new(
            "website_2=abc".to_string(),
            "access".to_string(),
            "session".to_string(),
        );
        assert_eq!(creds.cookie(), "website_2=abc");
        assert_eq!(creds.access_token(), "access");
        assert_eq!(creds.session_token(), "session");
    }

    // === Errors ===

    #[test]
    fn test_auth_error_display() {
        let err = AuthError::Rejected {
            status: StatusCode::FORBIDDEN,
            body: "bad credentials".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "account API returned HTTP 403 Forbidden: bad credentials"
        );

        let err = AuthError::MalformedResponse { field: "items" };
        assert_eq!(err.to_string(), "account response missing items");
    }
}
