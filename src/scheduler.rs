//! The capture loop: log in, resolve cameras, then grab and archive frames
//! in rounds until the configured round count is reached.
//!
//! Startup failures (exhausted login attempts, unusable output directory)
//! are fatal. Once the loop runs, a failing camera only loses its own frame
//! for that round; the loop itself never stops early.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::archive::FrameArchive;
use crate::config::{CameraSelection, Config};
use crate::nest::{
    AuthError, CameraClient, CameraInfo, CaptureError, CredentialBundle, SessionClient,
    ACCOUNT_BASE_URL, DEFAULT_FRAME_WIDTH, DEVICE_BASE_URL,
};

/// Login attempts before startup gives up. Attempts run back to back, no
/// backoff between them.
pub const LOGIN_ATTEMPTS: usize = 3;

/// Drives the whole capture run. Built by [`CaptureScheduler::initialize`],
/// which performs login and camera resolution; after that the scheduler
/// holds everything a round needs and no shared state changes.
pub struct CaptureScheduler {
    cameras: Vec<CameraClient>,
    archive: FrameArchive,
    delay: Duration,
    num_frames: u64,
}

impl CaptureScheduler {
    /// Set up a capture run against the production services.
    pub async fn initialize(
        config: &Config,
        selection: &[CameraSelection],
    ) -> Result<Self, InitError> {
        Self::initialize_with_base_urls(config, selection, ACCOUNT_BASE_URL, DEVICE_BASE_URL).await
    }

    /// Set up a capture run against custom service URLs (used in tests).
    ///
    /// Logs in and enumerates cameras, retrying the pair as a unit up to
    /// [`LOGIN_ATTEMPTS`] times, then matches the selected cameras against
    /// what the account can see and prepares the archive directories.
    pub async fn initialize_with_base_urls(
        config: &Config,
        selection: &[CameraSelection],
        account_base: &str,
        device_base: &str,
    ) -> Result<Self, InitError> {
        log::info!("Initializing capture run for {} camera(s)", selection.len());
        let session = SessionClient::with_base_url(account_base.to_string())?;

        let mut attempt = 0;
        let (creds, visible) = loop {
            attempt += 1;
            match Self::open_session(&session, &config.user, &config.passwd).await {
                Ok(pair) => break pair,
                Err(err) if attempt >= LOGIN_ATTEMPTS => {
                    return Err(InitError::AuthExhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "Login attempt {}/{} failed: {}",
                        attempt,
                        LOGIN_ATTEMPTS,
                        err
                    );
                }
            }
        };

        let creds = Arc::new(creds);
        let mut cameras = Vec::with_capacity(selection.len());
        for selected in selection {
            match visible.iter().find(|info| info.uuid == selected.uuid) {
                Some(info) => {
                    let client = CameraClient::with_base_url(
                        info.clone(),
                        Arc::clone(&creds),
                        device_base.to_string(),
                    )?;
                    log::debug!(
                        "Camera '{}' resolved to '{}' ({})",
                        selected.name,
                        info.name,
                        info.uuid
                    );
                    cameras.push(client);
                }
                None => {
                    log::warn!(
                        "Camera '{}' ({}) is not visible to this account, skipping",
                        selected.name,
                        selected.uuid
                    );
                }
            }
        }
        if cameras.is_empty() {
            log::warn!("No selected camera is visible; rounds will capture nothing");
        }

        let archive = FrameArchive::new(config.out_path.clone(), config.max_frames);
        archive.ensure_root().map_err(|e| InitError::OutputDir {
            path: config.out_path.clone(),
            source: e,
        })?;
        for camera in &cameras {
            archive
                .ensure_camera_dir(camera.name())
                .map_err(|e| InitError::OutputDir {
                    path: archive.camera_dir(camera.name()),
                    source: e,
                })?;
        }

        Ok(Self {
            cameras,
            archive,
            delay: config.delay,
            num_frames: config.num_frames,
        })
    }

    /// Log in and enumerate cameras. Retried as one unit, a fresh login per
    /// attempt, since the cookie from a failed round trip is worthless.
    async fn open_session(
        session: &SessionClient,
        user: &str,
        passwd: &str,
    ) -> Result<(CredentialBundle, Vec<CameraInfo>), AuthError> {
        let creds = session.login(user, passwd).await?;
        let visible = session.visible_cameras(&creds).await?;
        Ok((creds, visible))
    }

    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.iter().map(|c| c.name()).collect()
    }

    pub fn archive(&self) -> &FrameArchive {
        &self.archive
    }

    /// Run capture rounds until the round limit is reached. With a limit of
    /// zero this never returns. Sleeps the configured delay between rounds
    /// but not after the last one.
    pub async fn run(&self) -> u64 {
        log::info!(
            "Capture loop running: {} camera(s), {} round(s), {:?} between rounds",
            self.cameras.len(),
            if self.num_frames == 0 {
                "unlimited".to_string()
            } else {
                self.num_frames.to_string()
            },
            self.delay
        );

        let mut rounds: u64 = 0;
        loop {
            self.run_round().await;
            rounds += 1;
            if self.num_frames > 0 && rounds >= self.num_frames {
                break;
            }
            tokio::time::sleep(self.delay).await;
        }

        log::info!("Capture loop finished after {} round(s)", rounds);
        rounds
    }

    /// Capture one frame per camera, in order. A camera that fails loses
    /// only its own frame for this round. Returns how many frames landed.
    pub async fn run_round(&self) -> usize {
        let mut captured = 0;
        for camera in &self.cameras {
            match self.capture_one(camera).await {
                Ok(path) => {
                    captured += 1;
                    log::info!("Captured frame from '{}' to {}", camera.name(), path.display());
                }
                Err(err) => {
                    log::warn!("Skipping camera '{}' this round: {}", camera.name(), err);
                }
            }
        }
        captured
    }

    /// Grab, persist, then enforce retention for a single camera.
    /// Retention failures are logged and swallowed; the frame is already on
    /// disk by then and the loop must keep running.
    async fn capture_one(&self, camera: &CameraClient) -> Result<PathBuf, FrameError> {
        let bytes = camera.grab_frame(DEFAULT_FRAME_WIDTH).await?;
        let captured_at = chrono::Utc::now();
        let path = self.archive.persist(camera.name(), captured_at, &bytes)?;
        if let Err(e) = self.archive.enforce_limit(camera.name()) {
            log::warn!("Retention check failed for '{}': {}", camera.name(), e);
        }
        Ok(path)
    }
}

/// Fatal startup errors. Any of these ends the run before the first round.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("login failed after {attempts} attempts: {source}")]
    AuthExhausted {
        attempts: usize,
        #[source]
        source: AuthError,
    },

    #[error("failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set up account client: {0}")]
    Session(#[from] AuthError),

    #[error("failed to set up camera client: {0}")]
    Camera(#[from] CaptureError),
}

/// Per-camera failure inside a round. Never fatal; the round moves on to
/// the next camera.
#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error("{0}")]
    Capture(#[from] CaptureError),

    #[error("failed to archive frame: {0}")]
    Archive(#[from] std::io::Error),
}
