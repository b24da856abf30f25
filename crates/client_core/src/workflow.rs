//! Four-step manuscript submission wizard.
//!
//! The draft lives in memory behind a mutex and is written through to the
//! local store after every mutation, so a crashed or closed session resumes
//! where it left off. Nothing is removed from storage until the backend
//! acknowledges a submission.

use std::sync::Arc;

use shared::domain::{
    AttachedFile, AuthorField, DeclarationKind, Draft, FileStatus, Requirement, WizardStep,
};
use storage::KeyValueStore;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::WorkflowError,
    payload::{FileSelection, SubmissionPayload},
    session::SessionContext,
    SubmissionBackend,
};

pub const DRAFT_STORAGE_KEY: &str = "submission_form";
const DEFAULT_REJECTION_MESSAGE: &str = "Submission failed";
const TRANSPORT_FAILURE_MESSAGE: &str = "Error submitting manuscript";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    ManuscriptTitle,
    Topic,
    Abstract,
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    StepChanged(WizardStep),
    FilesAdded {
        requirement: Requirement,
        count: usize,
    },
    SubmissionStarted,
    SubmissionSucceeded {
        message: Option<String>,
    },
    SubmissionFailed {
        message: String,
    },
    LoginRequired,
    TopicsUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub message: Option<String>,
    pub files_sent: usize,
}

pub struct SubmissionWorkflow {
    store: Arc<dyn KeyValueStore>,
    backend: Arc<dyn SubmissionBackend>,
    session: Arc<SessionContext>,
    draft: Mutex<Draft>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl SubmissionWorkflow {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn SubmissionBackend>,
        session: Arc<SessionContext>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            store,
            backend,
            session,
            draft: Mutex::new(Draft::default()),
            events,
        })
    }

    /// Loads the saved draft, if any. Unreadable or corrupt saved state is
    /// logged and replaced by an empty draft; this never fails.
    pub async fn restore(&self) -> bool {
        let raw = match self.store.get_item(DRAFT_STORAGE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "could not read saved draft; starting empty");
                return false;
            }
        };

        match serde_json::from_str::<Draft>(&raw) {
            Ok(draft) => {
                let draft = draft.normalized();
                info!(
                    step = draft.current_step.number(),
                    authors = draft.authors.len(),
                    files = draft.files.len(),
                    "restored saved draft"
                );
                *self.draft.lock().await = draft;
                true
            }
            Err(err) => {
                warn!(error = %err, "saved draft is corrupt; starting empty");
                *self.draft.lock().await = Draft::default();
                false
            }
        }
    }

    pub async fn draft(&self) -> Draft {
        self.draft.lock().await.clone()
    }

    pub async fn current_step(&self) -> WizardStep {
        self.draft.lock().await.current_step
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.events.send(event);
    }

    /// Applies `apply` to a copy of the draft and swaps it in only once the
    /// copy is stored, so memory never runs ahead of storage.
    async fn update<R>(&self, apply: impl FnOnce(&mut Draft) -> R) -> Result<R, WorkflowError> {
        let mut draft = self.draft.lock().await;
        let mut next = draft.clone();
        let result = apply(&mut next);
        self.persist(&next).await?;
        *draft = next;
        Ok(result)
    }

    async fn persist(&self, draft: &Draft) -> Result<(), WorkflowError> {
        let raw = serde_json::to_string(draft).map_err(|e| WorkflowError::Storage(e.into()))?;
        self.store
            .set_item(DRAFT_STORAGE_KEY, &raw)
            .await
            .map_err(WorkflowError::Storage)?;
        debug!(bytes = raw.len(), "draft saved");
        Ok(())
    }

    pub async fn advance(&self) -> Result<WizardStep, WorkflowError> {
        let step = self
            .update(|draft| {
                if let Some(next) = draft.current_step.next() {
                    draft.current_step = next;
                }
                draft.current_step
            })
            .await?;
        self.emit(WorkflowEvent::StepChanged(step));
        Ok(step)
    }

    pub async fn retreat(&self) -> Result<WizardStep, WorkflowError> {
        let step = self
            .update(|draft| {
                if let Some(previous) = draft.current_step.previous() {
                    draft.current_step = previous;
                }
                draft.current_step
            })
            .await?;
        self.emit(WorkflowEvent::StepChanged(step));
        Ok(step)
    }

    pub async fn set_field(
        &self,
        field: DraftField,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        let value = value.into();
        self.update(move |draft| match field {
            DraftField::ManuscriptTitle => draft.manuscript_title = value,
            DraftField::Topic => draft.topic = value,
            DraftField::Abstract => draft.abstract_text = value,
            DraftField::Keywords => draft.keywords = value,
        })
        .await
    }

    pub async fn set_declaration(
        &self,
        kind: DeclarationKind,
        checked: bool,
    ) -> Result<(), WorkflowError> {
        self.update(|draft| draft.set_declaration(kind, checked)).await
    }

    /// Appends a blank author and returns the new author count.
    pub async fn add_author(&self) -> Result<usize, WorkflowError> {
        self.update(|draft| {
            draft.authors.push(Default::default());
            draft.authors.len()
        })
        .await
    }

    pub async fn update_author(
        &self,
        index: usize,
        field: AuthorField,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        let len = self.draft.lock().await.authors.len();
        if index >= len {
            return Err(WorkflowError::AuthorIndexOutOfRange { index, len });
        }
        self.update(|draft| {
            if let Some(author) = draft.authors.get_mut(index) {
                author.set(field, value);
            }
        })
        .await
    }

    /// Queues files under `requirement` and returns how many were added.
    pub async fn attach_files(
        &self,
        requirement: Requirement,
        files: Vec<FileSelection>,
    ) -> Result<usize, WorkflowError> {
        let count = files.len();
        if count == 0 {
            return Ok(0);
        }
        self.update(move |draft| {
            draft
                .files
                .extend(files.into_iter().map(|selection| AttachedFile {
                    requirement,
                    file_name: selection.file_name,
                    mime_type: selection.mime_type,
                    file_size: selection.file_size,
                    path: selection.path,
                }));
        })
        .await?;
        info!(%requirement, count, "file(s) added");
        self.emit(WorkflowEvent::FilesAdded { requirement, count });
        Ok(count)
    }

    /// Drops every file queued under `requirement` and returns how many were
    /// removed.
    pub async fn detach_files(&self, requirement: Requirement) -> Result<usize, WorkflowError> {
        let removed = self
            .update(|draft| {
                let before = draft.files.len();
                draft.files.retain(|f| f.requirement != requirement);
                before - draft.files.len()
            })
            .await?;
        info!(%requirement, removed, "file(s) removed");
        Ok(removed)
    }

    pub async fn file_status(&self, requirement: Requirement) -> FileStatus {
        self.draft.lock().await.file_status(requirement)
    }

    pub async fn can_submit(&self) -> bool {
        let draft = self.draft.lock().await;
        draft.current_step.is_final()
            && draft.declarations_complete()
            && !self.session.is_submitting()
    }

    /// Topic names for the topic selector. A failed fetch leaves the list
    /// empty.
    pub async fn load_topics(&self) -> Vec<String> {
        match self.backend.fetch_topics().await {
            Ok(topics) => topics,
            Err(err) => {
                warn!(error = %err, "topic list unavailable");
                self.emit(WorkflowEvent::TopicsUnavailable);
                Vec::new()
            }
        }
    }

    /// Sends the draft as one multipart request.
    ///
    /// Only one submission runs at a time per session; a second call while
    /// one is in flight returns [`WorkflowError::SubmissionInFlight`] without
    /// touching the network. An attachment that can no longer be read stops
    /// the submission before anything is sent. On any failure the draft and
    /// step are left as they were so the user can retry.
    pub async fn submit(&self) -> Result<SubmitReceipt, WorkflowError> {
        let draft = self.draft().await;
        if !draft.current_step.is_final() || !draft.declarations_complete() {
            return Err(WorkflowError::NotReady);
        }

        let Some(_in_flight) = self.session.try_begin_submit() else {
            debug!("submit ignored: already in flight");
            return Err(WorkflowError::SubmissionInFlight);
        };

        let Some(token) = self.session.credential().await else {
            self.emit(WorkflowEvent::LoginRequired);
            return Err(WorkflowError::MissingCredential);
        };

        self.emit(WorkflowEvent::SubmissionStarted);
        let payload = match SubmissionPayload::from_draft(&draft).await {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail_transport(err)),
        };
        if !payload.skipped.is_empty() {
            let files = payload.skipped;
            warn!(?files, "submission stopped: attachments unreadable");
            self.emit(WorkflowEvent::SubmissionFailed {
                message: format!("Cannot read {}", files.join(", ")),
            });
            return Err(WorkflowError::UnreadableAttachments { files });
        }
        let files_sent = payload.files.len();
        info!(
            title = %draft.manuscript_title,
            authors = draft.authors.len(),
            files = files_sent,
            "submitting manuscript"
        );

        let reply = match self.backend.submit_manuscript(payload, &token).await {
            Ok(reply) => reply,
            Err(err) => return Err(self.fail_transport(err)),
        };

        if !reply.accepted {
            let message = reply
                .message
                .unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string());
            warn!(%message, "submission rejected");
            self.emit(WorkflowEvent::SubmissionFailed {
                message: message.clone(),
            });
            return Err(WorkflowError::Rejected { message });
        }

        if let Err(err) = self.store.remove_item(DRAFT_STORAGE_KEY).await {
            warn!(error = %err, "submission accepted but saved draft could not be cleared");
        }
        *self.draft.lock().await = Draft::default();

        info!("submission accepted");
        self.emit(WorkflowEvent::SubmissionSucceeded {
            message: reply.message.clone(),
        });
        self.emit(WorkflowEvent::StepChanged(WizardStep::Details));

        Ok(SubmitReceipt {
            message: reply.message,
            files_sent,
        })
    }

    fn fail_transport(&self, err: anyhow::Error) -> WorkflowError {
        warn!(error = %err, "submission failed");
        self.emit(WorkflowEvent::SubmissionFailed {
            message: TRANSPORT_FAILURE_MESSAGE.to_string(),
        });
        WorkflowError::Transport(err)
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
