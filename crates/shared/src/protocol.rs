use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Author, DeclarationKind, Draft},
    error::DomainError,
};

/// Author entry as it travels in the `authors` multipart field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorPayload {
    pub full_name: String,
    pub email: String,
    pub affiliation: String,
    pub is_corresponding: bool,
    pub order: u32,
}

impl AuthorPayload {
    pub fn from_authors(authors: &[Author]) -> Vec<Self> {
        authors
            .iter()
            .enumerate()
            .map(|(index, author)| Self {
                full_name: author.full_name.clone(),
                email: author.email.clone(),
                affiliation: author.affiliation.clone(),
                is_corresponding: index == 0,
                order: index as u32 + 1,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationPayload {
    #[serde(rename = "type")]
    pub kind: DeclarationKind,
    pub is_checked: bool,
}

impl DeclarationPayload {
    pub fn from_draft(draft: &Draft) -> Vec<Self> {
        DeclarationKind::ALL
            .into_iter()
            .map(|kind| Self {
                kind,
                is_checked: draft.declaration(kind),
            })
            .collect()
    }
}

/// Reply body of the submission endpoint. Both fields are optional; an
/// unreadable body is read as the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopicListResponse {
    Wrapped { data: Vec<Topic> },
    Bare(Vec<Topic>),
}

impl TopicListResponse {
    pub fn into_names(self) -> Vec<String> {
        let topics = match self {
            TopicListResponse::Wrapped { data } => data,
            TopicListResponse::Bare(topics) => topics,
        };
        topics.into_iter().map(|t| t.name).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub requires_two_factor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArticleAuthor {
    pub full_name: String,
    pub affiliation: String,
    pub email: Option<String>,
    pub orcid: Option<String>,
}

/// Published article as returned by the public article endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub manuscript_title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: String,
    pub doi_slug: Option<String>,
    pub seo_pdf_name: Option<String>,
    pub volume: Option<u32>,
    pub issue: Option<u32>,
    pub published_at: Option<DateTime<Utc>>,
    pub authors: Vec<ArticleAuthor>,
}

impl Article {
    pub fn publication_year(&self) -> Option<i32> {
        self.published_at.map(|at| at.year())
    }

    pub fn pdf_path(&self) -> Option<String> {
        match (&self.seo_pdf_name, self.volume, self.issue) {
            (Some(name), Some(volume), Some(issue)) => {
                Some(format!("/vol{volume}/issue{issue}/{name}.pdf"))
            }
            _ => None,
        }
    }
}

/// Editorial state of a submitted manuscript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    UnderReview,
    RevisionRequested,
    Accepted,
    Rejected,
    Published,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 7] = [
        SubmissionStatus::Draft,
        SubmissionStatus::Submitted,
        SubmissionStatus::UnderReview,
        SubmissionStatus::RevisionRequested,
        SubmissionStatus::Accepted,
        SubmissionStatus::Rejected,
        SubmissionStatus::Published,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "DRAFT",
            SubmissionStatus::Submitted => "SUBMITTED",
            SubmissionStatus::UnderReview => "UNDER_REVIEW",
            SubmissionStatus::RevisionRequested => "REVISION_REQUESTED",
            SubmissionStatus::Accepted => "ACCEPTED",
            SubmissionStatus::Rejected => "REJECTED",
            SubmissionStatus::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        SubmissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownSubmissionStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmissionFile {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_url: String,
    pub file_size: u64,
    pub is_edited: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmissionAuthor {
    pub id: String,
    pub full_name: String,
}

/// A submission as listed by `GET /submission`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub id: String,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub manuscript_title: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authors: Vec<SubmissionAuthor>,
    #[serde(default)]
    pub files: Vec<SubmissionFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionListResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Vec<SubmissionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: SubmissionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFile {
    pub file_name: String,
    pub url: String,
}

/// Reply of `GET /submission/{id}/download`: either one direct `fileUrl` or
/// a list of files to bundle, plus the names the backend could not serve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadManifest {
    pub file_url: Option<String>,
    pub files: Vec<DownloadFile>,
    pub skipped_files: Vec<String>,
}
