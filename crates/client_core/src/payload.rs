use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use shared::{
    domain::Draft,
    protocol::{AuthorPayload, DeclarationPayload},
};
use tracing::warn;

pub const FILES_FIELD: &str = "files";
const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A file picked by the user, before it is tagged with a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
}

impl FileSelection {
    /// Resolves `path` to an absolute one so the attachment stays readable
    /// from any working directory until submit.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let requested = path.as_ref();
        let path = tokio::fs::canonicalize(requested)
            .await
            .with_context(|| format!("cannot read '{}'", requested.display()))?;
        let path = path.as_path();
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        if !metadata.is_file() {
            return Err(anyhow!("'{}' is not a regular file", path.display()));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("'{}' has no file name", path.display()))?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            mime_type,
            file_size: metadata.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Everything one submission request carries, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPayload {
    pub fields: Vec<(&'static str, String)>,
    pub files: Vec<FilePart>,
    /// Attachments whose bytes could not be read.
    pub skipped: Vec<String>,
}

impl SubmissionPayload {
    /// Encodes the draft's text fields. File parts are supplied by the caller.
    pub fn build(draft: &Draft, files: Vec<FilePart>) -> Result<Self> {
        let authors = serde_json::to_string(&AuthorPayload::from_authors(&draft.authors))
            .context("failed to encode authors")?;
        let declarations = serde_json::to_string(&DeclarationPayload::from_draft(draft))
            .context("failed to encode declarations")?;

        Ok(Self {
            fields: vec![
                ("manuscriptTitle", draft.manuscript_title.clone()),
                ("topic", draft.topic.clone()),
                ("abstract", draft.abstract_text.clone()),
                ("keywords", draft.keywords.clone()),
                ("authors", authors),
                ("declarations", declarations),
            ],
            files,
            skipped: Vec::new(),
        })
    }

    /// Reads every attachment from disk and builds the payload. Files that
    /// can no longer be read are listed in `skipped` instead of failing the
    /// whole read.
    pub async fn from_draft(draft: &Draft) -> Result<Self> {
        let mut parts = Vec::with_capacity(draft.files.len());
        let mut skipped = Vec::new();
        for file in &draft.files {
            match tokio::fs::read(&file.path).await {
                Ok(bytes) => parts.push(FilePart {
                    file_name: file.file_name.clone(),
                    mime_type: file.mime_type.clone(),
                    bytes,
                }),
                Err(err) => {
                    warn!(
                        file = %file.path.display(),
                        requirement = %file.requirement,
                        error = %err,
                        "attachment is no longer readable"
                    );
                    skipped.push(file.file_name.clone());
                }
            }
        }

        let mut payload = Self::build(draft, parts)?;
        payload.skipped = skipped;
        Ok(payload)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn into_form(self) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let mime_type = if file.mime_type.parse::<mime_guess::Mime>().is_ok() {
                file.mime_type
            } else {
                FALLBACK_MIME_TYPE.to_string()
            };
            let part = Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&mime_type)
                .context("invalid attachment mime type")?;
            form = form.part(FILES_FIELD, part);
        }
        Ok(form)
    }
}
