//! Submission to the ingestion endpoint

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{Result, UploaderError};

const INGEST_PATH: &str = "/api/ingest/log";
const USER_AGENT: &str = concat!("propmap-uploader/", env!("CARGO_PKG_VERSION"));

/// Server acknowledgement of a submitted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { contacts_written: u64 },
    /// The server already had this content
    Duplicate,
}

/// Delivers one file's bytes to the server
#[async_trait]
pub trait LogSubmitter: Send + Sync {
    async fn submit(&self, path: &Path, body: Vec<u8>) -> Result<SubmitOutcome>;
}

#[derive(Debug, Deserialize)]
struct IngestReply {
    status: String,
    #[serde(default)]
    contacts_written: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// POSTs files to `<server>/api/ingest/log`
pub struct HttpSubmitter {
    http_client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpSubmitter {
    pub fn new(server_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| UploaderError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), INGEST_PATH),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogSubmitter for HttpSubmitter {
    async fn submit(&self, path: &Path, body: Vec<u8>) -> Result<SubmitOutcome> {
        debug!(file = %path.display(), bytes = body.len(), "Submitting log");

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UploaderError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UploaderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorReply>(&text)
                .map(|reply| format!("{}: {}", reply.error.code, reply.error.message))
                .unwrap_or(text);
            return Err(UploaderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let reply: IngestReply = serde_json::from_str(&text).map_err(|e| UploaderError::Rejected {
            status: status.as_u16(),
            message: format!("unexpected response body: {}", e),
        })?;

        match reply.status.as_str() {
            "duplicate" => Ok(SubmitOutcome::Duplicate),
            "accepted" => Ok(SubmitOutcome::Accepted {
                contacts_written: reply.contacts_written,
            }),
            other => Err(UploaderError::Rejected {
                status: status.as_u16(),
                message: format!("unknown ingest status '{}'", other),
            }),
        }
    }
}
