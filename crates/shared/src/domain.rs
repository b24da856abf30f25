use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The four ordered pages of the submission wizard.
///
/// Stored as its 1-based page number. Numbers outside `1..=4` are clamped
/// into range on the way in so a hand-edited draft never lands on a page
/// that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub enum WizardStep {
    #[default]
    Details,
    Authors,
    Files,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 4] = [
        WizardStep::Details,
        WizardStep::Authors,
        WizardStep::Files,
        WizardStep::Review,
    ];

    pub fn number(self) -> u8 {
        match self {
            WizardStep::Details => 1,
            WizardStep::Authors => 2,
            WizardStep::Files => 3,
            WizardStep::Review => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            WizardStep::Details => "Manuscript Details",
            WizardStep::Authors => "Authors",
            WizardStep::Files => "Upload Files",
            WizardStep::Review => "Review & Submit",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            WizardStep::Details => Some(WizardStep::Authors),
            WizardStep::Authors => Some(WizardStep::Files),
            WizardStep::Files => Some(WizardStep::Review),
            WizardStep::Review => None,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            WizardStep::Details => None,
            WizardStep::Authors => Some(WizardStep::Details),
            WizardStep::Files => Some(WizardStep::Authors),
            WizardStep::Review => Some(WizardStep::Files),
        }
    }

    pub fn is_final(self) -> bool {
        self == WizardStep::Review
    }
}

impl From<i64> for WizardStep {
    fn from(value: i64) -> Self {
        match value {
            i64::MIN..=1 => WizardStep::Details,
            2 => WizardStep::Authors,
            3 => WizardStep::Files,
            _ => WizardStep::Review,
        }
    }
}

impl From<WizardStep> for u8 {
    fn from(value: WizardStep) -> Self {
        value.number()
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/4 {}", self.number(), self.title())
    }
}

/// Category an attached file is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requirement {
    #[serde(rename = "Manuscript File")]
    ManuscriptFile,
    #[serde(rename = "Cover Letter")]
    CoverLetter,
    #[serde(rename = "Ethics Documentation")]
    EthicsDocumentation,
}

impl Requirement {
    pub const ALL: [Requirement; 3] = [
        Requirement::ManuscriptFile,
        Requirement::CoverLetter,
        Requirement::EthicsDocumentation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Requirement::ManuscriptFile => "Manuscript File",
            Requirement::CoverLetter => "Cover Letter",
            Requirement::EthicsDocumentation => "Ethics Documentation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Requirement::ManuscriptFile => "Main manuscript in .docx or .pdf format",
            Requirement::CoverLetter => "Brief description of significance and novelty",
            Requirement::EthicsDocumentation => "Ethics approval for human/animal studies",
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, Requirement::EthicsDocumentation)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Requirement {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "manuscript file" | "manuscript" => Ok(Requirement::ManuscriptFile),
            "cover letter" | "cover" => Ok(Requirement::CoverLetter),
            "ethics documentation" | "ethics" => Ok(Requirement::EthicsDocumentation),
            _ => Err(DomainError::UnknownRequirement(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Uploaded,
    Pending,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Uploaded => f.write_str("Uploaded"),
            FileStatus::Pending => f.write_str("Pending"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Author {
    pub full_name: String,
    pub email: String,
    pub affiliation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorField {
    FullName,
    Email,
    Affiliation,
}

impl Author {
    pub fn set(&mut self, field: AuthorField, value: impl Into<String>) {
        let value = value.into();
        match field {
            AuthorField::FullName => self.full_name = value,
            AuthorField::Email => self.email = value,
            AuthorField::Affiliation => self.affiliation = value,
        }
    }
}

impl FromStr for AuthorField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fullname" | "full_name" | "full-name" | "name" => Ok(AuthorField::FullName),
            "email" => Ok(AuthorField::Email),
            "affiliation" => Ok(AuthorField::Affiliation),
            _ => Err(DomainError::UnknownAuthorField(s.to_string())),
        }
    }
}

/// A file queued for upload. `path` is the handle the bytes are read from
/// when the submission is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedFile {
    pub requirement: Requirement,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclarationKind {
    EthicalConduct,
    ConflictOfInterest,
    CopyrightTransfer,
}

impl DeclarationKind {
    pub const ALL: [DeclarationKind; 3] = [
        DeclarationKind::EthicalConduct,
        DeclarationKind::ConflictOfInterest,
        DeclarationKind::CopyrightTransfer,
    ];

    pub fn describe(self) -> &'static str {
        match self {
            DeclarationKind::EthicalConduct => "research was conducted ethically",
            DeclarationKind::ConflictOfInterest => "conflicts of interest are disclosed",
            DeclarationKind::CopyrightTransfer => "copyright is transferred upon acceptance",
        }
    }
}

impl FromStr for DeclarationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethics" | "ethical_conduct" => Ok(DeclarationKind::EthicalConduct),
            "conflicts" | "conflict_of_interest" => Ok(DeclarationKind::ConflictOfInterest),
            "copyright" | "copyright_transfer" => Ok(DeclarationKind::CopyrightTransfer),
            _ => Err(DomainError::UnknownDeclaration(s.to_string())),
        }
    }
}

/// In-progress state of one manuscript submission.
///
/// The JSON shape is what gets written to durable storage. Every field is
/// optional on read: missing declarations are `false`, a missing step is
/// the first page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(default)]
    pub manuscript_title: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default = "default_authors")]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub files: Vec<AttachedFile>,
    #[serde(default)]
    pub ethics: bool,
    #[serde(default)]
    pub conflicts: bool,
    #[serde(default)]
    pub copyright: bool,
    #[serde(default)]
    pub current_step: WizardStep,
}

fn default_authors() -> Vec<Author> {
    vec![Author::default()]
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            manuscript_title: String::new(),
            topic: String::new(),
            abstract_text: String::new(),
            keywords: String::new(),
            authors: default_authors(),
            files: Vec::new(),
            ethics: false,
            conflicts: false,
            copyright: false,
            current_step: WizardStep::Details,
        }
    }
}

impl Draft {
    /// Restores the non-empty author invariant on a draft read from storage.
    pub fn normalized(mut self) -> Self {
        if self.authors.is_empty() {
            self.authors = default_authors();
        }
        self
    }

    pub fn declaration(&self, kind: DeclarationKind) -> bool {
        match kind {
            DeclarationKind::EthicalConduct => self.ethics,
            DeclarationKind::ConflictOfInterest => self.conflicts,
            DeclarationKind::CopyrightTransfer => self.copyright,
        }
    }

    pub fn set_declaration(&mut self, kind: DeclarationKind, checked: bool) {
        match kind {
            DeclarationKind::EthicalConduct => self.ethics = checked,
            DeclarationKind::ConflictOfInterest => self.conflicts = checked,
            DeclarationKind::CopyrightTransfer => self.copyright = checked,
        }
    }

    pub fn declarations_complete(&self) -> bool {
        self.ethics && self.conflicts && self.copyright
    }

    pub fn file_status(&self, requirement: Requirement) -> FileStatus {
        if self.files.iter().any(|f| f.requirement == requirement) {
            FileStatus::Uploaded
        } else {
            FileStatus::Pending
        }
    }

    pub fn keyword_list(&self) -> Vec<&str> {
        self.keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }
}
