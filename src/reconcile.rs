use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{error, warn};

use crate::{common::truncate_for_log, constants::MAX_REPORTED_FAILURES};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    #[serde(default)]
    success_count: u64,
    #[serde(default)]
    failure_count: u64,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail {
    pub key: Option<String>,
    pub visit_date: Option<String>,
    pub reason: String,
}

impl FailureDetail {
    fn from_value(value: &Value) -> Self {
        let key = string_at(value, &["pReg"])
            .or_else(|| string_at(value, &["patientId"]))
            .or_else(|| string_at(value, &["data", "pReg"]));
        let visit_date = string_at(value, &["visitDate"])
            .or_else(|| string_at(value, &["item", "visitData", "visitDate"]));
        let reason = string_at(value, &["error"])
            .or_else(|| string_at(value, &["reason"]))
            .unwrap_or_else(|| "Unknown".to_string());
        Self {
            key,
            visit_date,
            reason,
        }
    }
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    match current {
        Value::String(text) => Some(text.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PReg: {}", self.key.as_deref().unwrap_or("N/A"))?;
        if let Some(date) = &self.visit_date {
            write!(f, ", VisitDate: {date}")?;
        }
        write!(f, ", Reason: {}", self.reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    AllSucceeded,
    PartiallySucceeded,
    Failed,
}

/// Running totals for one import phase.
#[derive(Debug, Default, Clone)]
pub struct ImportSummary {
    pub items_submitted: usize,
    pub batches_sent: usize,
    pub succeeded: u64,
    pub reported_failures: u64,
    pub failed_batches: usize,
    pub failures: Vec<FailureDetail>,
}

impl ImportSummary {
    pub fn record_response(
        &mut self,
        items: usize,
        status: StatusCode,
        body: &str,
    ) -> BatchVerdict {
        self.items_submitted += items;
        self.batches_sent += 1;

        if status != StatusCode::CREATED && status != StatusCode::MULTI_STATUS {
            error!(
                "Batch of {} items rejected. Status: {}, Response: {}",
                items,
                status,
                truncate_for_log(body)
            );
            self.failed_batches += 1;
            return BatchVerdict::Failed;
        }

        let response: BatchResponse = match serde_json::from_str(body) {
            Ok(response) => response,
            Err(err) => {
                error!(
                    "Could not decode batch response ({}): {}",
                    err,
                    truncate_for_log(body)
                );
                self.failed_batches += 1;
                return BatchVerdict::Failed;
            }
        };

        self.succeeded += response.success_count;
        self.reported_failures += response.failure_count;
        if response.failure_count > 0 || !response.errors.is_empty() {
            let details = serde_json::to_string(&response.errors).unwrap_or_default();
            warn!(
                "Batch had {} failures. Details: {}",
                response.failure_count,
                truncate_for_log(&details)
            );
        }
        self.failures
            .extend(response.errors.iter().map(FailureDetail::from_value));

        if status == StatusCode::CREATED {
            BatchVerdict::AllSucceeded
        } else {
            BatchVerdict::PartiallySucceeded
        }
    }

    /// A batch that never produced a response.
    pub fn record_transport_failure(&mut self, items: usize) {
        self.items_submitted += items;
        self.batches_sent += 1;
        self.failed_batches += 1;
    }

    pub fn report<'a>(&'a self, title: &'a str) -> SummaryReport<'a> {
        SummaryReport {
            title,
            summary: self,
        }
    }
}

pub struct SummaryReport<'a> {
    title: &'a str,
    summary: &'a ImportSummary,
}

impl fmt::Display for SummaryReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        writeln!(f, "--- {} Summary ---", self.title)?;
        writeln!(
            f,
            "Items submitted: {} (in {} batches)",
            s.items_submitted, s.batches_sent
        )?;
        writeln!(f, "Successfully imported (reported by server): {}", s.succeeded)?;
        writeln!(f, "Batches resulting in errors: {}", s.failed_batches)?;
        writeln!(f, "Items reported as failed by server: {}", s.reported_failures)?;
        if !s.failures.is_empty() {
            writeln!(
                f,
                "Failure details ({} recorded, first {} shown):",
                s.failures.len(),
                MAX_REPORTED_FAILURES.min(s.failures.len())
            )?;
            for failure in s.failures.iter().take(MAX_REPORTED_FAILURES) {
                writeln!(f, "  - {failure}")?;
            }
        }
        Ok(())
    }
}
