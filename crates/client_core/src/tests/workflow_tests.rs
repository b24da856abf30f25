use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::Author;
use storage::MemoryStore;

use super::*;
use crate::SubmissionReply;

#[derive(Clone)]
enum Script {
    Accept(Option<String>),
    Reject(Option<String>),
    Unreachable,
}

struct ScriptedBackend {
    script: Script,
    topics: Option<Vec<String>>,
    delay: Duration,
    calls: AtomicUsize,
    last_payload: Mutex<Option<(SubmissionPayload, String)>>,
}

impl ScriptedBackend {
    fn new(script: Script) -> Self {
        Self {
            script,
            topics: Some(vec!["Soil".to_string(), "Water".to_string()]),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_payload: Mutex::new(None),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn without_topics(mut self) -> Self {
        self.topics = None;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionBackend for ScriptedBackend {
    async fn fetch_topics(&self) -> Result<Vec<String>> {
        self.topics
            .clone()
            .ok_or_else(|| anyhow!("topic endpoint unreachable"))
    }

    async fn submit_manuscript(
        &self,
        payload: SubmissionPayload,
        token: &str,
    ) -> Result<SubmissionReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_payload.lock().await = Some((payload, token.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.script.clone() {
            Script::Accept(message) => Ok(SubmissionReply {
                accepted: true,
                message,
            }),
            Script::Reject(message) => Ok(SubmissionReply {
                accepted: false,
                message,
            }),
            Script::Unreachable => Err(anyhow!("connection refused")),
        }
    }
}

/// Store whose reads or writes always fail.
struct BrokenStore {
    reads_fail: bool,
    writes_fail: bool,
}

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get_item(&self, _key: &str) -> Result<Option<String>> {
        if self.reads_fail {
            return Err(anyhow!("disk I/O error"));
        }
        Ok(None)
    }

    async fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        if self.writes_fail {
            return Err(anyhow!("database is locked"));
        }
        Ok(())
    }

    async fn remove_item(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

fn selection(dir: &std::path::Path, name: &str, size: u64) -> FileSelection {
    FileSelection {
        path: dir.join(name),
        file_name: name.to_string(),
        mime_type: "application/pdf".to_string(),
        file_size: size,
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    backend: Arc<ScriptedBackend>,
    workflow: Arc<SubmissionWorkflow>,
}

fn harness_with(backend: ScriptedBackend, token: Option<&str>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(backend);
    let session = Arc::new(SessionContext::new(token.map(str::to_string)));
    let workflow = SubmissionWorkflow::new(store.clone(), backend.clone(), session);
    Harness {
        store,
        backend,
        workflow,
    }
}

fn harness(script: Script) -> Harness {
    harness_with(ScriptedBackend::new(script), Some("token-123"))
}

async fn fill_ready_draft(workflow: &SubmissionWorkflow) {
    workflow
        .set_field(DraftField::ManuscriptTitle, "X")
        .await
        .expect("title");
    workflow
        .update_author(0, AuthorField::FullName, "A")
        .await
        .expect("name");
    workflow
        .update_author(0, AuthorField::Email, "a@x.com")
        .await
        .expect("email");
    workflow
        .update_author(0, AuthorField::Affiliation, "Uni")
        .await
        .expect("affiliation");
    for kind in DeclarationKind::ALL {
        workflow.set_declaration(kind, true).await.expect("declare");
    }
    for _ in 0..3 {
        workflow.advance().await.expect("advance");
    }
}

async fn saved_draft(store: &MemoryStore) -> Option<Draft> {
    store
        .get_item(DRAFT_STORAGE_KEY)
        .await
        .expect("read")
        .map(|raw| serde_json::from_str(&raw).expect("saved draft is json"))
}

#[tokio::test]
async fn step_stays_within_bounds_for_any_sequence() {
    let h = harness(Script::Accept(None));
    let mut seed: u32 = 0x9e37_79b9;
    for _ in 0..200 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let step = if seed % 3 == 0 {
            h.workflow.retreat().await.expect("retreat")
        } else {
            h.workflow.advance().await.expect("advance")
        };
        assert!((1..=4).contains(&step.number()));
    }

    for _ in 0..6 {
        h.workflow.retreat().await.expect("retreat");
    }
    assert_eq!(h.workflow.current_step().await, WizardStep::Details);
    for _ in 0..6 {
        h.workflow.advance().await.expect("advance");
    }
    assert_eq!(h.workflow.current_step().await, WizardStep::Review);
}

#[tokio::test]
async fn every_mutation_is_written_through() {
    let h = harness(Script::Accept(None));
    h.workflow
        .set_field(DraftField::Keywords, "soil, water")
        .await
        .expect("keywords");
    assert_eq!(
        saved_draft(&h.store).await.expect("saved").keywords,
        "soil, water"
    );

    h.workflow.advance().await.expect("advance");
    assert_eq!(
        saved_draft(&h.store).await.expect("saved").current_step,
        WizardStep::Authors
    );
}

#[tokio::test]
async fn restore_after_persist_yields_identical_draft() {
    let h = harness(Script::Accept(None));
    fill_ready_draft(&h.workflow).await;
    h.workflow.add_author().await.expect("add");
    h.workflow
        .set_field(DraftField::Abstract, "We measure things.")
        .await
        .expect("abstract");
    let dir = tempfile::tempdir().expect("tempdir");
    for (index, requirement) in Requirement::ALL.into_iter().enumerate() {
        let name = format!("{}-{index}.pdf", requirement.label().replace(' ', "_"));
        h.workflow
            .attach_files(requirement, vec![selection(dir.path(), &name, 1 << 20)])
            .await
            .expect("attach");
    }
    let before = h.workflow.draft().await;
    assert_eq!(before.files.len(), Requirement::ALL.len());

    let session = Arc::new(SessionContext::new(None));
    let reopened = SubmissionWorkflow::new(h.store.clone(), h.backend.clone(), session);
    assert!(reopened.restore().await);
    assert_eq!(reopened.draft().await, before);
}

#[tokio::test]
async fn restore_defaults_missing_declarations_to_false() {
    let store = Arc::new(MemoryStore::with_item(
        DRAFT_STORAGE_KEY,
        r#"{"manuscriptTitle":"Old","topic":"Soil","abstract":"","keywords":"","authors":[{"fullName":"A","email":"","affiliation":""}],"files":[],"ethics":true}"#,
    ));
    let workflow = SubmissionWorkflow::new(
        store,
        Arc::new(ScriptedBackend::new(Script::Accept(None))),
        Arc::new(SessionContext::new(None)),
    );

    assert!(workflow.restore().await);
    let draft = workflow.draft().await;
    assert_eq!(draft.manuscript_title, "Old");
    assert!(draft.ethics);
    assert!(!draft.conflicts);
    assert!(!draft.copyright);
    assert_eq!(draft.current_step, WizardStep::Details);
}

#[tokio::test]
async fn corrupt_saved_draft_falls_back_to_empty() {
    let store = Arc::new(MemoryStore::with_item(DRAFT_STORAGE_KEY, "{not json"));
    let workflow = SubmissionWorkflow::new(
        store,
        Arc::new(ScriptedBackend::new(Script::Accept(None))),
        Arc::new(SessionContext::new(None)),
    );

    assert!(!workflow.restore().await);
    assert_eq!(workflow.draft().await, Draft::default());
}

#[tokio::test]
async fn stored_step_out_of_range_keeps_the_draft() {
    let store = Arc::new(MemoryStore::with_item(
        DRAFT_STORAGE_KEY,
        r#"{"manuscriptTitle":"Keep me","authors":[{"fullName":"A","email":"","affiliation":""}],"currentStep":300}"#,
    ));
    let workflow = SubmissionWorkflow::new(
        store,
        Arc::new(ScriptedBackend::new(Script::Accept(None))),
        Arc::new(SessionContext::new(None)),
    );

    assert!(workflow.restore().await);
    assert_eq!(workflow.draft().await.manuscript_title, "Keep me");
    assert_eq!(workflow.current_step().await, WizardStep::Review);
}

#[tokio::test]
async fn unreadable_storage_starts_with_empty_draft() {
    let workflow = SubmissionWorkflow::new(
        Arc::new(BrokenStore {
            reads_fail: true,
            writes_fail: false,
        }),
        Arc::new(ScriptedBackend::new(Script::Accept(None))),
        Arc::new(SessionContext::new(None)),
    );

    assert!(!workflow.restore().await);
    assert_eq!(workflow.draft().await, Draft::default());
}

#[tokio::test]
async fn failed_write_leaves_draft_unchanged() {
    let workflow = SubmissionWorkflow::new(
        Arc::new(BrokenStore {
            reads_fail: false,
            writes_fail: true,
        }),
        Arc::new(ScriptedBackend::new(Script::Accept(None))),
        Arc::new(SessionContext::new(None)),
    );

    let err = workflow
        .set_field(DraftField::ManuscriptTitle, "Lost")
        .await
        .expect_err("write fails");
    assert!(matches!(err, WorkflowError::Storage(_)));
    assert!(workflow.advance().await.is_err());
    assert!(workflow
        .update_author(0, AuthorField::FullName, "A")
        .await
        .is_err());
    assert_eq!(workflow.draft().await, Draft::default());
}

#[tokio::test]
async fn add_author_appends_and_preserves_order() {
    let h = harness(Script::Accept(None));
    h.workflow
        .update_author(0, AuthorField::FullName, "First")
        .await
        .expect("name");

    for expected in 2..=5 {
        assert_eq!(h.workflow.add_author().await.expect("add"), expected);
    }

    let authors = h.workflow.draft().await.authors;
    assert_eq!(authors.len(), 5);
    assert_eq!(authors[0].full_name, "First");
    assert!(authors[1..].iter().all(|a| *a == Author::default()));
}

#[tokio::test]
async fn out_of_range_author_update_is_rejected() {
    let h = harness(Script::Accept(None));
    let before = h.workflow.draft().await;

    let err = h
        .workflow
        .update_author(3, AuthorField::Email, "x@y.z")
        .await
        .expect_err("index 3 does not exist");
    assert!(matches!(
        err,
        WorkflowError::AuthorIndexOutOfRange { index: 3, len: 1 }
    ));
    assert_eq!(h.workflow.draft().await, before);
    assert!(saved_draft(&h.store).await.is_none());
}

#[tokio::test]
async fn attaching_files_reports_count_and_status() {
    let h = harness(Script::Accept(None));
    let mut events = h.workflow.subscribe_events();
    let selections = ["m1.pdf", "m2.pdf"]
        .into_iter()
        .map(|name| FileSelection {
            path: std::path::PathBuf::from(name),
            file_name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            file_size: 10,
        })
        .collect();

    let added = h
        .workflow
        .attach_files(Requirement::ManuscriptFile, selections)
        .await
        .expect("attach");
    assert_eq!(added, 2);
    assert_eq!(
        events.recv().await.expect("event"),
        WorkflowEvent::FilesAdded {
            requirement: Requirement::ManuscriptFile,
            count: 2
        }
    );
    assert_eq!(
        h.workflow.file_status(Requirement::ManuscriptFile).await,
        FileStatus::Uploaded
    );
    assert_eq!(
        h.workflow.file_status(Requirement::CoverLetter).await,
        FileStatus::Pending
    );
    assert_eq!(saved_draft(&h.store).await.expect("saved").files.len(), 2);
}

#[tokio::test]
async fn detaching_clears_one_requirement() {
    let h = harness(Script::Accept(None));
    let dir = tempfile::tempdir().expect("tempdir");
    h.workflow
        .attach_files(
            Requirement::CoverLetter,
            vec![selection(dir.path(), "c1.pdf", 1), selection(dir.path(), "c2.pdf", 1)],
        )
        .await
        .expect("attach cover");
    h.workflow
        .attach_files(Requirement::ManuscriptFile, vec![selection(dir.path(), "m.pdf", 1)])
        .await
        .expect("attach manuscript");

    assert_eq!(h.workflow.detach_files(Requirement::CoverLetter).await.expect("detach"), 2);
    assert_eq!(
        h.workflow.file_status(Requirement::CoverLetter).await,
        FileStatus::Pending
    );
    let saved = saved_draft(&h.store).await.expect("saved");
    assert_eq!(saved.files.len(), 1);
    assert_eq!(saved.files[0].file_name, "m.pdf");
}

#[tokio::test]
async fn attachment_picked_by_relative_path_is_sent() {
    let h = harness(Script::Accept(None));
    let dir = tempfile::tempdir_in(".").expect("tempdir");
    let relative = std::path::Path::new(".")
        .join(dir.path().file_name().expect("dir name"))
        .join("m.pdf");
    tokio::fs::write(&relative, b"%PDF-1.7 body").await.expect("write");

    let picked = FileSelection::from_path(&relative).await.expect("selection");
    h.workflow
        .attach_files(Requirement::ManuscriptFile, vec![picked])
        .await
        .expect("attach");
    fill_ready_draft(&h.workflow).await;
    assert!(saved_draft(&h.store).await.expect("saved").files[0]
        .path
        .is_absolute());

    let receipt = h.workflow.submit().await.expect("submit");
    assert_eq!(receipt.files_sent, 1);
    let guard = h.backend.last_payload.lock().await;
    let (payload, _) = guard.as_ref().expect("payload sent");
    assert_eq!(payload.files[0].bytes, b"%PDF-1.7 body");
}

#[tokio::test]
async fn vanished_attachment_stops_submission_and_keeps_draft() {
    let h = harness(Script::Accept(None));
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("m.pdf");
    tokio::fs::write(&path, b"%PDF").await.expect("write");
    let picked = FileSelection::from_path(&path).await.expect("selection");
    h.workflow
        .attach_files(Requirement::ManuscriptFile, vec![picked])
        .await
        .expect("attach");
    fill_ready_draft(&h.workflow).await;
    let before = h.workflow.draft().await;
    tokio::fs::remove_file(&path).await.expect("remove");

    match h.workflow.submit().await {
        Err(WorkflowError::UnreadableAttachments { files }) => {
            assert_eq!(files, vec!["m.pdf".to_string()])
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(saved_draft(&h.store).await, Some(before));
    assert!(!h.workflow.session().is_submitting());
}

#[tokio::test]
async fn submit_requires_review_step_and_all_declarations() {
    let h = harness(Script::Accept(None));
    assert!(matches!(
        h.workflow.submit().await,
        Err(WorkflowError::NotReady)
    ));

    fill_ready_draft(&h.workflow).await;
    h.workflow
        .set_declaration(DeclarationKind::CopyrightTransfer, false)
        .await
        .expect("uncheck");
    assert!(!h.workflow.can_submit().await);
    assert!(matches!(
        h.workflow.submit().await,
        Err(WorkflowError::NotReady)
    ));
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn submit_without_credential_asks_for_login() {
    let h = harness_with(ScriptedBackend::new(Script::Accept(None)), None);
    fill_ready_draft(&h.workflow).await;
    let mut events = h.workflow.subscribe_events();

    assert!(matches!(
        h.workflow.submit().await,
        Err(WorkflowError::MissingCredential)
    ));
    assert_eq!(
        events.recv().await.expect("event"),
        WorkflowEvent::LoginRequired
    );
    assert_eq!(h.backend.calls(), 0);
    assert!(!h.workflow.session().is_submitting());
}

#[tokio::test]
async fn rapid_double_submit_sends_one_request() {
    let h = harness_with(
        ScriptedBackend::new(Script::Accept(None)).with_delay(Duration::from_millis(50)),
        Some("token-123"),
    );
    fill_ready_draft(&h.workflow).await;

    let (first, second) = tokio::join!(h.workflow.submit(), h.workflow.submit());

    assert!(first.is_ok());
    assert!(matches!(second, Err(WorkflowError::SubmissionInFlight)));
    assert_eq!(h.backend.calls(), 1);
    assert!(!h.workflow.session().is_submitting());
}

#[tokio::test]
async fn submit_sends_encoded_authors_and_bearer_token() {
    let h = harness(Script::Accept(Some("Submission successful!".to_string())));
    fill_ready_draft(&h.workflow).await;

    let receipt = h.workflow.submit().await.expect("submit");
    assert_eq!(receipt.message.as_deref(), Some("Submission successful!"));

    let guard = h.backend.last_payload.lock().await;
    let (payload, token) = guard.as_ref().expect("payload sent");
    assert_eq!(token, "token-123");
    let authors: serde_json::Value =
        serde_json::from_str(payload.field("authors").expect("authors")).expect("json");
    assert_eq!(
        authors,
        serde_json::json!([{
            "fullName": "A",
            "email": "a@x.com",
            "affiliation": "Uni",
            "isCorresponding": true,
            "order": 1
        }])
    );
}

#[tokio::test]
async fn backend_failure_keeps_draft_and_step() {
    for script in [Script::Reject(Some("Duplicate title".to_string())), Script::Unreachable] {
        let h = harness(script);
        fill_ready_draft(&h.workflow).await;
        let before = h.workflow.draft().await;
        let mut events = h.workflow.subscribe_events();

        let err = h.workflow.submit().await.expect_err("backend failure");
        assert!(err.is_retryable());

        assert_eq!(h.workflow.current_step().await, WizardStep::Review);
        assert_eq!(h.workflow.draft().await, before);
        assert_eq!(saved_draft(&h.store).await, Some(before));
        assert!(!h.workflow.session().is_submitting());

        assert_eq!(
            events.recv().await.expect("started"),
            WorkflowEvent::SubmissionStarted
        );
        match events.recv().await.expect("failed") {
            WorkflowEvent::SubmissionFailed { message } => assert!(!message.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

#[tokio::test]
async fn rejection_without_message_uses_default() {
    let h = harness(Script::Reject(None));
    fill_ready_draft(&h.workflow).await;

    match h.workflow.submit().await {
        Err(WorkflowError::Rejected { message }) => assert_eq!(message, "Submission failed"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn failed_submit_can_be_retried() {
    let h = harness(Script::Unreachable);
    fill_ready_draft(&h.workflow).await;

    assert!(h.workflow.submit().await.is_err());
    assert!(h.workflow.submit().await.is_err());
    assert_eq!(h.backend.calls(), 2);
}

#[tokio::test]
async fn success_clears_saved_draft_and_returns_to_first_step() {
    let h = harness(Script::Accept(None));
    fill_ready_draft(&h.workflow).await;
    assert!(saved_draft(&h.store).await.is_some());

    h.workflow.submit().await.expect("submit");

    assert!(h
        .store
        .get_item(DRAFT_STORAGE_KEY)
        .await
        .expect("read")
        .is_none());
    assert_eq!(h.workflow.current_step().await, WizardStep::Details);
    assert_eq!(h.workflow.draft().await, Draft::default());
}

#[tokio::test]
async fn topic_failure_degrades_to_empty_list() {
    let ok = harness(Script::Accept(None));
    assert_eq!(ok.workflow.load_topics().await, vec!["Soil", "Water"]);

    let h = harness_with(
        ScriptedBackend::new(Script::Accept(None)).without_topics(),
        Some("token-123"),
    );
    let mut events = h.workflow.subscribe_events();
    assert!(h.workflow.load_topics().await.is_empty());
    assert_eq!(
        events.recv().await.expect("event"),
        WorkflowEvent::TopicsUnavailable
    );
}
