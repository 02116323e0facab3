use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::LazyLock;
use tracing::{error, info};

use crate::{common::truncate_for_log, constants::SEQUENCE_PREFIX};

static PREFIXED_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^{}(\d+)", regex::escape(SEQUENCE_PREFIX)))
        .expect("sequence prefix pattern is valid")
});

#[derive(Debug, Default)]
pub struct SequenceTracker {
    max: i64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number encoded in a registration id: `PR-<digits>` (any case) or bare digits.
    pub fn parse(registration_id: &str) -> Option<i64> {
        let key = registration_id.trim();
        if let Some(caps) = PREFIXED_SEQUENCE.captures(key) {
            return caps[1].parse().ok();
        }
        if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()) {
            return key.parse().ok();
        }
        None
    }

    pub fn observe(&mut self, registration_id: &str) {
        if let Some(value) = Self::parse(registration_id) {
            self.max = self.max.max(value);
        }
    }

    pub fn max(&self) -> i64 {
        self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterOutcome {
    Updated(i64),
    Skipped,
    NotAttempted,
    Failed(String),
}

pub async fn update_remote_counter(client: &Client, url: &str, value: i64) -> CounterOutcome {
    if value <= 0 {
        info!("No positive registration number found; skipping counter update.");
        return CounterOutcome::Skipped;
    }

    info!("Setting remote patient counter to {} via {}", value, url);
    let response = client
        .post(url)
        .json(&json!({ "lastSequenceNumber": value }))
        .send()
        .await;

    match response {
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::OK {
                info!("Patient counter set: {}", truncate_for_log(&body));
                CounterOutcome::Updated(value)
            } else {
                let message = format!("status {}: {}", status, truncate_for_log(&body));
                error!("Error setting patient counter, {}", message);
                CounterOutcome::Failed(message)
            }
        }
        Err(err) => {
            error!("Request to set patient counter failed: {}", err);
            CounterOutcome::Failed(err.to_string())
        }
    }
}
