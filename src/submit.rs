use anyhow::{Context, Result};
use indicatif::ProgressBar;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use serde::Serialize;
use std::{collections::HashMap, error::Error as StdError, io, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    common::build_client,
    reconcile::{BatchVerdict, ImportSummary},
};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("connection refused by {url}")]
    ConnectionRefused { url: String },
    #[error("transport error talking to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl SubmitError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if is_connection_refused(&err) {
            SubmitError::ConnectionRefused {
                url: url.to_string(),
            }
        } else {
            SubmitError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(inner) = current {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = inner.source();
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    /// The endpoint refused the connection; remaining batches were not sent.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub capacity: usize,
    pub pause: Duration,
    pub timeout: Duration,
}

pub struct BatchSubmitter<T> {
    url: String,
    payload_key: &'static str,
    config: SubmitterConfig,
    client: Option<Client>,
    pending: Vec<T>,
    summary: ImportSummary,
    aborted: bool,
    progress: ProgressBar,
}

impl<T: Serialize> BatchSubmitter<T> {
    pub fn new(
        url: String,
        payload_key: &'static str,
        config: SubmitterConfig,
        progress: ProgressBar,
    ) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            url,
            payload_key,
            config: SubmitterConfig {
                capacity,
                ..config
            },
            client: None,
            pending: Vec::with_capacity(capacity),
            summary: ImportSummary::default(),
            aborted: false,
            progress,
        }
    }

    pub async fn push(&mut self, item: T) -> Result<Flow> {
        if self.aborted {
            return Ok(Flow::Abort);
        }
        self.pending.push(item);
        if self.pending.len() >= self.config.capacity {
            return self.flush().await;
        }
        Ok(Flow::Continue)
    }

    pub async fn flush(&mut self) -> Result<Flow> {
        if self.aborted {
            return Ok(Flow::Abort);
        }
        if self.pending.is_empty() {
            return Ok(Flow::Continue);
        }

        let batch = std::mem::take(&mut self.pending);
        let items = batch.len();
        info!(
            "Sending batch of {} {} to {} (submitted so far: {})",
            items, self.payload_key, self.url, self.summary.items_submitted
        );

        let body = serde_json::to_vec(&HashMap::from([(self.payload_key, &batch)]))
            .with_context(|| format!("Failed encoding {} batch", self.payload_key))?;

        let client = match self.client.take() {
            Some(client) => client,
            None => {
                debug!("Opening connection for {}", self.url);
                build_client(self.config.timeout)?
            }
        };

        let flow = match post_batch(&client, &self.url, body).await {
            Ok((status, text)) => {
                self.client = Some(client);
                if self.summary.record_response(items, status, &text) != BatchVerdict::Failed {
                    debug!("Batch accepted with status {}", status);
                }
                Flow::Continue
            }
            Err(SubmitError::ConnectionRefused { url }) => {
                error!(
                    "FATAL: connection refused for {}. Aborting remaining batches.",
                    url
                );
                self.summary.record_transport_failure(items);
                self.aborted = true;
                Flow::Abort
            }
            Err(err @ SubmitError::Transport { .. }) => {
                warn!("Batch of {} items failed: {}", items, err);
                self.summary.record_transport_failure(items);
                drop(client);
                if !self.config.pause.is_zero() {
                    sleep(self.config.pause).await;
                }
                Flow::Continue
            }
        };
        self.progress.inc(items as u64);
        Ok(flow)
    }

    /// Sends the final partial batch, releases the connection and returns the totals.
    pub async fn finish(mut self) -> Result<(ImportSummary, PhaseOutcome)> {
        let flushed = self.flush().await;
        self.close();
        self.progress.finish_and_clear();
        flushed?;
        let outcome = if self.aborted {
            PhaseOutcome::Aborted
        } else {
            PhaseOutcome::Completed
        };
        Ok((std::mem::take(&mut self.summary), outcome))
    }

    pub fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("Closed connection to {}", self.url);
        }
    }
}

async fn post_batch(
    client: &Client,
    url: &str,
    body: Vec<u8>,
) -> std::result::Result<(StatusCode, String), SubmitError> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|err| SubmitError::from_reqwest(url, err))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| SubmitError::from_reqwest(url, err))?;
    Ok((status, text))
}
