use anyhow::{Context, Result, bail};
use csv::{Reader, ReaderBuilder, StringRecord};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::{fs::File, path::Path, time::Duration};

use crate::{constants::USER_AGENT, normalize::ColumnMap};

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    if trimmed.len() <= max_len {
        trimmed.to_string()
    } else {
        let mut cut = max_len;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &trimmed[..cut])
    }
}

/// HTTP client that keeps at most one idle connection to the backend.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .pool_max_idle_per_host(1)
        .build()
        .context("Failed creating HTTP client")
}

/// An open CSV export plus its resolved header layout.
pub struct CsvSource {
    reader: Reader<File>,
    pub columns: ColumnMap,
}

impl CsvSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("CSV file not found at {}", path.display());
        }
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed opening CSV {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed reading CSV header from {}", path.display()))?
            .clone();
        if headers.iter().all(|h| h.trim().is_empty()) {
            bail!(
                "CSV file {} appears to be empty or its header is missing",
                path.display()
            );
        }
        Ok(Self {
            reader,
            columns: ColumnMap::from_headers(&headers),
        })
    }

    /// Data rows with the file line each starts on, capped at `row_limit` when set.
    pub fn records(
        &mut self,
        row_limit: Option<usize>,
    ) -> impl Iterator<Item = Result<(u64, StringRecord)>> + '_ {
        self.reader
            .records()
            .take(row_limit.unwrap_or(usize::MAX))
            .enumerate()
            .map(|(idx, record)| match record {
                Ok(record) => {
                    let line = record
                        .position()
                        .map(|pos| pos.line())
                        .unwrap_or(idx as u64 + 2);
                    Ok((line, record))
                }
                Err(err) => {
                    Err(err).with_context(|| format!("Failed reading CSV record {}", idx + 1))
                }
            })
    }
}

pub fn new_progress(len: Option<u64>, enabled: bool, prefix: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let progress = match len {
        Some(total) => {
            let progress = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {prefix:.bold} [{elapsed_precise}] [{bar:32.cyan/blue}] \
{pos}/{len} ({percent}%) {msg}",
            ) {
                progress.set_style(style.progress_chars("=> "));
            }
            progress
        }
        None => {
            let progress = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {prefix:.bold} [{elapsed_precise}] {pos} sent {msg}",
            ) {
                progress.set_style(style);
            }
            progress
        }
    };
    progress.set_prefix(prefix);
    progress
}
