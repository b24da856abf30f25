use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::{
    DownloadManifest, LoginRequest, LoginResponse, StatusUpdateRequest, SubmissionListResponse,
    SubmissionResponse, SubmissionStatus, SubmissionSummary, TopicListResponse,
};
use storage::KeyValueStore;
use tracing::{info, warn};

pub mod config;
pub mod download;
pub mod error;
pub mod payload;
pub mod session;
pub mod workflow;

pub use download::{download_submission, ArchiveReport};
pub use error::WorkflowError;
pub use payload::{FileSelection, SubmissionPayload};
pub use session::{SessionContext, ACCESS_TOKEN_KEY};
pub use workflow::{DraftField, SubmissionWorkflow, SubmitReceipt, WorkflowEvent, DRAFT_STORAGE_KEY};

/// How the backend answered a submission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReply {
    pub accepted: bool,
    pub message: Option<String>,
}

/// The parts of the journal REST API the submission wizard talks to.
#[async_trait]
pub trait SubmissionBackend: Send + Sync {
    async fn fetch_topics(&self) -> Result<Vec<String>>;
    /// `Err` only for transport failures; a reply of any status is `Ok`.
    async fn submit_manuscript(
        &self,
        payload: SubmissionPayload,
        token: &str,
    ) -> Result<SubmissionReply>;
}

pub struct JournalClient {
    http: Client,
    api_url: String,
}

impl JournalClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_http_client(Client::new(), api_url)
    }

    pub fn with_http_client(http: Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { http, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Lists submissions. The public listing needs no token; editors see
    /// every status when they pass theirs.
    pub async fn list_submissions(&self, token: Option<&str>) -> Result<Vec<SubmissionSummary>> {
        let mut req = self.http.get(format!("{}/submission", self.api_url));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let body: SubmissionListResponse = req
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("unexpected submission list body")?;
        Ok(body.data)
    }

    pub async fn update_status(
        &self,
        token: &str,
        submission_id: &str,
        status: SubmissionStatus,
    ) -> Result<()> {
        let res = self
            .http
            .patch(format!("{}/submission/{submission_id}/status", self.api_url))
            .bearer_auth(token)
            .json(&StatusUpdateRequest { status })
            .send()
            .await?;
        let http_status = res.status();
        let body: SubmissionResponse = res.json().await.unwrap_or_default();
        if !http_status.is_success() || body.success == Some(false) {
            return Err(anyhow!(
                "failed to update status: {}",
                body.message.unwrap_or_else(|| http_status.to_string())
            ));
        }
        info!(submission_id, %status, "submission status updated");
        Ok(())
    }

    /// Asks the backend where the selected files of a submission live.
    pub async fn download_manifest(
        &self,
        submission_id: &str,
        file_ids: &[String],
    ) -> Result<DownloadManifest> {
        let manifest = self
            .http
            .get(format!("{}/submission/{submission_id}/download", self.api_url))
            .query(&[("files", file_ids.join(","))])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("unexpected download manifest body")?;
        Ok(manifest)
    }

    /// Exchanges email and password for a bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let body: LoginResponse = self
            .http
            .post(format!("{}/auth/login", self.api_url))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?
            .error_for_status()
            .context("invalid credentials")?
            .json()
            .await?;

        if body.requires_two_factor {
            return Err(anyhow!(
                "account requires two-factor verification, which this client does not support"
            ));
        }
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("login response did not include a token"))?;
        info!(email, "logged in");
        Ok(token)
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.http
            .post(format!("{}/auth/logout", self.api_url))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionBackend for JournalClient {
    async fn fetch_topics(&self) -> Result<Vec<String>> {
        let topics: TopicListResponse = self
            .http
            .get(format!("{}/topic", self.api_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("unexpected topic list body")?;
        Ok(topics.into_names())
    }

    async fn submit_manuscript(
        &self,
        payload: SubmissionPayload,
        token: &str,
    ) -> Result<SubmissionReply> {
        let form = payload.into_form()?;
        let res = self
            .http
            .post(format!("{}/submission", self.api_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = res.status();
        let body: SubmissionResponse = res.json().await.unwrap_or_default();
        Ok(SubmissionReply {
            accepted: status.is_success() && body.success != Some(false),
            message: body.message,
        })
    }
}

/// Logs in and stores the token in session storage.
pub async fn sign_in(
    client: &JournalClient,
    session_store: &dyn KeyValueStore,
    session: &SessionContext,
    email: &str,
    password: &str,
) -> Result<()> {
    let token = client.login(email, password).await?;
    session_store.set_item(ACCESS_TOKEN_KEY, &token).await?;
    session.set_credential(Some(token)).await;
    Ok(())
}

/// Ends the session. The stored token is dropped even when the backend
/// call fails.
pub async fn sign_out(
    client: &JournalClient,
    session_store: &dyn KeyValueStore,
    session: &SessionContext,
) -> Result<()> {
    if let Some(token) = session.credential().await {
        if let Err(err) = client.logout(&token).await {
            warn!(error = %err, "logout request failed; clearing local session anyway");
        }
    }
    session_store.remove_item(ACCESS_TOKEN_KEY).await?;
    session.set_credential(None).await;
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
