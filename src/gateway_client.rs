use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::PipelineError;
use crate::normalize::dial_digits;
use crate::session::{BootstrapPrompt, ChannelCheck, SessionGateway, SessionStatus, UnknownReason};
use crate::storage::{read_json, write_json_atomic};

const SESSION_HEADER: &str = "X-Session-Id";

/// Session identity persisted between runs so unattended runs can reuse it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub session_id: String,
    pub established_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SessionStateResponse {
    state: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BootstrapResponse {
    session_id: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    status: String,
}

/// Client for a browser-automation sidecar that owns the authenticated
/// messaging session.
///
/// The sidecar keeps the browser profile; this client only tracks the
/// session id, which it persists to `session_file` once the session is ready.
pub struct RemoteSessionGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    session_file: PathBuf,
    session_id: Option<String>,
    persisted: bool,
}

impl RemoteSessionGateway {
    /// Creates a new `RemoteSessionGateway`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The sidecar base URL.
    /// * `token` - Optional bearer token for the sidecar.
    /// * `session_file` - Where the established session id is kept.
    /// * `request_timeout` - Client-level timeout for every request.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        session_file: impl Into<PathBuf>,
        request_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PipelineError::Setup(format!("Failed to create gateway client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            session_file: session_file.into(),
            session_id: None,
            persisted: false,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref id) = self.session_id {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder
    }

    fn load_saved_session(&mut self) {
        if self.session_id.is_some() {
            return;
        }
        match read_json::<SessionFile>(&self.session_file) {
            Ok(Some(saved)) => {
                tracing::info!(
                    "Reusing saved session from {} (established {})",
                    self.session_file.display(),
                    saved.established_at
                );
                self.session_id = Some(saved.session_id);
                self.persisted = true;
            }
            Ok(None) => {
                tracing::debug!("No saved session at {}", self.session_file.display());
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable session file: {}", e);
            }
        }
    }

    fn persist_session(&mut self) {
        if self.persisted {
            return;
        }
        let Some(ref id) = self.session_id else {
            return;
        };
        let saved = SessionFile {
            session_id: id.clone(),
            established_at: Utc::now(),
        };
        // The session still works for this run if saving fails; only the
        // next unattended run loses it.
        match write_json_atomic(&self.session_file, &saved) {
            Ok(()) => {
                tracing::info!("Session saved to {}", self.session_file.display());
                self.persisted = true;
            }
            Err(e) => tracing::warn!("Could not save session: {}", e),
        }
    }
}

#[async_trait]
impl SessionGateway for RemoteSessionGateway {
    fn name(&self) -> &str {
        "remote"
    }

    async fn ensure_session(&mut self) -> SessionStatus {
        self.load_saved_session();

        let response = match self.request(reqwest::Method::GET, "/session").send().await {
            Ok(response) => response,
            Err(e) => return SessionStatus::Failed(format!("session probe failed: {}", e)),
        };
        if !response.status().is_success() {
            return SessionStatus::Failed(format!(
                "session probe returned {}",
                response.status()
            ));
        }
        let body: SessionStateResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return SessionStatus::Failed(format!("malformed session probe: {}", e)),
        };

        match body.state.as_str() {
            "ready" => {
                if let Some(id) = body.session_id {
                    if self.session_id.as_deref() != Some(id.as_str()) {
                        self.session_id = Some(id);
                        self.persisted = false;
                    }
                }
                self.persist_session();
                SessionStatus::Ready
            }
            "needs_bootstrap" => SessionStatus::NeedsInteractiveBootstrap,
            other => SessionStatus::Failed(
                body.detail
                    .unwrap_or_else(|| format!("sidecar reported state '{}'", other)),
            ),
        }
    }

    async fn begin_bootstrap(&mut self) -> Result<BootstrapPrompt, String> {
        let response = self
            .request(reqwest::Method::POST, "/session/bootstrap")
            .send()
            .await
            .map_err(|e| format!("bootstrap request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("bootstrap returned {}: {}", status, error_text));
        }

        let body: BootstrapResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed bootstrap response: {}", e))?;

        self.session_id = Some(body.session_id);
        self.persisted = false;

        let mut instructions = body
            .prompt
            .unwrap_or_else(|| "Open the sidecar console and link the device".to_string());
        if let Some(secs) = body.expires_in {
            instructions.push_str(&format!(" (expires in {}s)", secs));
        }
        Ok(BootstrapPrompt { instructions })
    }

    async fn check(&mut self, business_key: &str) -> ChannelCheck {
        let digits = dial_digits(business_key);
        let path = format!("/contacts/{}/channel", digits);

        let response = match self.request(reqwest::Method::GET, &path).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ChannelCheck::Unknown(UnknownReason::Timeout),
            Err(e) => return ChannelCheck::Unknown(UnknownReason::Transport(e.to_string())),
        };

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::GONE
        ) {
            tracing::warn!("Session rejected while checking {}: {}", business_key, status);
            return ChannelCheck::Unknown(UnknownReason::SessionUnavailable);
        }
        if !status.is_success() {
            return ChannelCheck::Unknown(UnknownReason::UnexpectedResponse(format!(
                "status {}",
                status
            )));
        }

        let body: ChannelResponse = match response.json().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return ChannelCheck::Unknown(UnknownReason::Timeout),
            Err(e) => {
                return ChannelCheck::Unknown(UnknownReason::UnexpectedResponse(e.to_string()))
            }
        };

        match body.status.as_str() {
            "has_channel" => ChannelCheck::HasChannel,
            "no_channel" => ChannelCheck::NoChannel,
            other => ChannelCheck::Unknown(UnknownReason::UnexpectedResponse(format!(
                "status '{}'",
                other
            ))),
        }
    }

    async fn close(&mut self) {
        tracing::info!("Session released (kept on disk for reuse)");
    }
}
