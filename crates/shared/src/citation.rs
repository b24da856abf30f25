use std::{fmt, str::FromStr};

use crate::{error::DomainError, protocol::Article};

const MISSING_YEAR: &str = "n.d.";
const BIBTEX_ABSTRACT_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CitationStyle {
    #[default]
    Apa,
    Mla,
    Chicago,
    Harvard,
}

impl FromStr for CitationStyle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apa" => Ok(CitationStyle::Apa),
            "mla" => Ok(CitationStyle::Mla),
            "chicago" => Ok(CitationStyle::Chicago),
            "harvard" => Ok(CitationStyle::Harvard),
            _ => Err(DomainError::UnknownCitationStyle(s.to_string())),
        }
    }
}

impl fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CitationStyle::Apa => "APA",
            CitationStyle::Mla => "MLA",
            CitationStyle::Chicago => "Chicago",
            CitationStyle::Harvard => "Harvard",
        };
        f.write_str(name)
    }
}

fn author_line(article: &Article, separator: &str) -> String {
    article
        .authors
        .iter()
        .map(|a| a.full_name.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

fn year(article: &Article) -> String {
    article
        .publication_year()
        .map(|y| y.to_string())
        .unwrap_or_else(|| MISSING_YEAR.to_string())
}

fn part(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn doi_suffix(article: &Article) -> String {
    match article.doi_slug.as_deref().filter(|d| !d.is_empty()) {
        Some(doi) => format!(" https://doi.org/{doi}"),
        None => String::new(),
    }
}

/// Renders a one-line reference to `article` in the given style.
pub fn format_citation(article: &Article, style: CitationStyle, journal: &str) -> String {
    let authors = author_line(article, ", ");
    let title = &article.manuscript_title;
    let year = year(article);
    let volume = part(article.volume);
    let issue = part(article.issue);

    match style {
        CitationStyle::Apa => format!(
            "{authors} ({year}). {title}. {journal}, {volume}({issue}).{}",
            doi_suffix(article)
        ),
        CitationStyle::Mla => format!(
            "{authors}. \"{title}.\" {journal}, vol. {volume}, no. {issue}, {year}."
        ),
        CitationStyle::Chicago => format!(
            "{authors}. \"{title}.\" {journal} {volume}, no. {issue} ({year}).{}",
            doi_suffix(article)
        ),
        CitationStyle::Harvard => {
            format!("{authors} ({year}) '{title}', {journal}, {volume}({issue}).")
        }
    }
}

/// Builds a BibTeX `@article` record. The abstract is flattened to one line
/// and cut at 200 characters.
pub fn bibtex(article: &Article, journal: &str) -> String {
    let surname = article
        .authors
        .first()
        .and_then(|a| a.full_name.split_whitespace().last())
        .unwrap_or("Unknown");
    let year = year(article);
    let key = format!("{}{surname}{year}", journal.to_ascii_lowercase())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>();
    let abstract_line: String = article
        .abstract_text
        .replace(['\r', '\n'], " ")
        .chars()
        .take(BIBTEX_ABSTRACT_LIMIT)
        .collect();

    format!(
        "@article{{{key},\n  author = {{{}}},\n  title = {{{}}},\n  journal = {{{journal}}},\n  year = {{{year}}},\n  volume = {{{}}},\n  number = {{{}}},\n  doi = {{{}}},\n  keywords = {{{}}},\n  abstract = {{{abstract_line}}}\n}}\n",
        author_line(article, " and "),
        article.manuscript_title,
        part(article.volume),
        part(article.issue),
        article.doi_slug.as_deref().unwrap_or_default(),
        article.keywords,
    )
}
