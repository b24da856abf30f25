//! Bundles the files of one submission into a ZIP archive.
//!
//! Files are fetched one after another. Progress is reported through
//! `tracing` as a percentage of the bytes announced by `HEAD` requests.

use std::{
    collections::HashSet,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use reqwest::header::CONTENT_LENGTH;
use tracing::{info, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::JournalClient;

const DEFAULT_ARCHIVE_NAME: &str = "submission-files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub path: PathBuf,
    pub files_written: usize,
    pub skipped: Vec<String>,
}

/// Logs progress each time another tenth of the expected bytes arrives.
struct Progress {
    total: u64,
    loaded: u64,
    reported: u64,
}

impl Progress {
    fn new(total: u64) -> Self {
        Self {
            total,
            loaded: 0,
            reported: 0,
        }
    }

    fn percent(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        (self.loaded * 100 / self.total).min(100)
    }

    fn advance(&mut self, bytes: u64) {
        self.loaded += bytes;
        let percent = self.percent();
        if percent / 10 > self.reported / 10 {
            self.reported = percent;
            info!(percent, "download progress");
        }
    }
}

fn resolve_url(client: &JournalClient, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}/{}", client.api_url(), url.trim_start_matches('/'))
    }
}

async fn content_length(client: &JournalClient, url: &str) -> Result<u64> {
    let res = client.http().head(url).send().await?.error_for_status()?;
    // the body of a HEAD reply is empty, so read the announced size
    Ok(res
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

async fn fetch(client: &JournalClient, url: &str, progress: &mut Progress) -> Result<Vec<u8>> {
    let mut res = client.http().get(url).send().await?.error_for_status()?;
    let mut bytes = Vec::new();
    while let Some(chunk) = res.chunk().await? {
        progress.advance(chunk.len() as u64);
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn archive_file_name(title: Option<&str>) -> String {
    let cleaned: String = title
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        format!("{DEFAULT_ARCHIVE_NAME}.zip")
    } else {
        format!("{cleaned}.zip")
    }
}

/// Writes `entries` into an in-memory deflated ZIP. Repeated names get a
/// numeric prefix so no entry is lost.
fn build_archive(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();

    for (name, bytes) in entries {
        let mut entry_name = name.clone();
        let mut n = 2;
        while !used.insert(entry_name.clone()) {
            entry_name = format!("{n}-{name}");
            n += 1;
        }
        writer
            .start_file(entry_name.as_str(), options)
            .with_context(|| format!("failed to add '{entry_name}' to archive"))?;
        writer.write_all(bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Downloads the selected files of a submission into `output_dir`.
///
/// A single-file reply from the backend is saved as `<file id>.pdf`;
/// otherwise every reachable file goes into one `<title>.zip`. Files that
/// fail are skipped and listed in the report.
pub async fn download_submission(
    client: &JournalClient,
    submission_id: &str,
    file_ids: &[String],
    title: Option<&str>,
    output_dir: &Path,
) -> Result<ArchiveReport> {
    let Some(first_id) = file_ids.first() else {
        return Err(anyhow!("no files selected for download"));
    };

    let manifest = client.download_manifest(submission_id, file_ids).await?;

    if let Some(url) = manifest.file_url.as_deref() {
        let url = resolve_url(client, url);
        let mut progress = Progress::new(content_length(client, &url).await.unwrap_or(0));
        let bytes = fetch(client, &url, &mut progress).await?;
        let path = output_dir.join(format!("{first_id}.pdf"));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "file downloaded");
        return Ok(ArchiveReport {
            path,
            files_written: 1,
            skipped: manifest.skipped_files,
        });
    }

    let mut skipped = manifest.skipped_files;
    if manifest.files.is_empty() {
        return Err(anyhow!(
            "none of the selected files could be downloaded (skipped: {})",
            skipped.join(", ")
        ));
    }

    let mut reachable = Vec::with_capacity(manifest.files.len());
    let mut total = 0;
    for file in manifest.files {
        let url = resolve_url(client, &file.url);
        match content_length(client, &url).await {
            Ok(size) => {
                total += size;
                reachable.push((file.file_name, url));
            }
            Err(err) => {
                warn!(file = %file.file_name, error = %err, "file unreachable");
                skipped.push(file.file_name);
            }
        }
    }

    let mut progress = Progress::new(total);
    let mut entries = Vec::with_capacity(reachable.len());
    for (file_name, url) in reachable {
        match fetch(client, &url, &mut progress).await {
            Ok(bytes) => entries.push((file_name, bytes)),
            Err(err) => {
                warn!(file = %file_name, error = %err, "failed to fetch file");
                skipped.push(file_name);
            }
        }
    }

    if entries.is_empty() {
        return Err(anyhow!(
            "none of the selected files could be downloaded (skipped: {})",
            skipped.join(", ")
        ));
    }

    let archive = build_archive(&entries)?;
    let path = output_dir.join(archive_file_name(title));
    tokio::fs::write(&path, archive)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        files = entries.len(),
        skipped = skipped.len(),
        "archive written"
    );

    Ok(ArchiveReport {
        path,
        files_written: entries.len(),
        skipped,
    })
}

#[cfg(test)]
#[path = "tests/download_tests.rs"]
mod tests;
