use anyhow::Result;
use csv::StringRecord;
use std::{path::PathBuf, time::Duration};
use tracing::{info, warn};

use crate::{
    args::{DateFormat, ImportArgs},
    common::{CsvSource, build_client, new_progress},
    constants::{
        ADD_VISITS_PATH, CREATE_PATIENTS_PATH, PATIENTS_PAYLOAD_KEY, SET_COUNTER_PATH,
        VISITS_PAYLOAD_KEY,
    },
    counter::{CounterOutcome, SequenceTracker, update_remote_counter},
    group::{PatientGrouper, VisitGrouper},
    normalize::{Column, normalize_patient, normalize_visit},
    reconcile::ImportSummary,
    submit::{BatchSubmitter, Flow, PhaseOutcome, SubmitterConfig},
};

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub input_path: PathBuf,
    pub base_url: String,
    pub batch_size: usize,
    pub row_limit: Option<usize>,
    pub date_format: DateFormat,
    pub pause: Duration,
    pub timeout: Duration,
    pub counter_timeout: Duration,
    pub show_progress: bool,
}

impl From<&ImportArgs> for ImportSettings {
    fn from(args: &ImportArgs) -> Self {
        Self {
            input_path: args.input_path.clone(),
            base_url: args.target.resolved_base_url(),
            batch_size: args.batch_size.max(1),
            row_limit: args.row_limit,
            date_format: args.date_format,
            pause: Duration::from_millis(args.pause_ms),
            timeout: Duration::from_secs(args.timeout_secs),
            counter_timeout: Duration::from_secs(args.counter_timeout_secs),
            show_progress: !args.no_progress,
        }
    }
}

impl ImportSettings {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            capacity: self.batch_size,
            pause: self.pause,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug)]
pub struct PatientImportReport {
    pub summary: ImportSummary,
    pub outcome: PhaseOutcome,
    pub unique_patients: usize,
    pub max_sequence: i64,
    pub counter: CounterOutcome,
}

#[derive(Debug)]
pub struct VisitImportReport {
    pub summary: ImportSummary,
    pub outcome: PhaseOutcome,
    pub unique_visits: usize,
    pub skipped_rows: usize,
}

/// Streams the file once: deduplicated patients are posted as batches fill, every key feeds
/// the sequence tracker, and the counter is pushed only when the pass completes.
pub async fn import_patients(settings: &ImportSettings) -> Result<PatientImportReport> {
    let url = settings.endpoint(CREATE_PATIENTS_PATH);
    info!("Starting patient import from {}", settings.input_path.display());
    info!(
        "Targeting patient creation endpoint {} with batch size {}",
        url, settings.batch_size
    );

    let mut source = CsvSource::open(&settings.input_path)?;
    source.columns.require(&Column::PATIENT_REQUIRED)?;
    let columns = source.columns.clone();

    let mut grouper = PatientGrouper::new();
    let mut tracker = SequenceTracker::new();
    let mut submitter = BatchSubmitter::new(
        url,
        PATIENTS_PAYLOAD_KEY,
        settings.submitter_config(),
        new_progress(None, settings.show_progress, "PATIENTS"),
    );

    for item in source.records(settings.row_limit) {
        let (line, record) = match item {
            Ok(row) => row,
            Err(err) => {
                warn!("{:#}", err);
                continue;
            }
        };
        let row = columns.row(&record, line);
        let Some(registration_id) = row.registration_id() else {
            continue;
        };
        tracker.observe(registration_id);
        if grouper.contains(registration_id) {
            continue;
        }
        let Some(patient) = normalize_patient(&row) else {
            continue;
        };
        if let Some(first) = grouper.insert(patient) {
            if submitter.push(first.clone()).await? == Flow::Abort {
                break;
            }
        }
    }

    let (summary, outcome) = submitter.finish().await?;
    let max_sequence = tracker.max();

    let counter = match outcome {
        PhaseOutcome::Aborted => CounterOutcome::NotAttempted,
        PhaseOutcome::Completed => {
            let client = build_client(settings.counter_timeout)?;
            update_remote_counter(&client, &settings.endpoint(SET_COUNTER_PATH), max_sequence)
                .await
        }
    };

    Ok(PatientImportReport {
        summary,
        outcome,
        unique_patients: grouper.len(),
        max_sequence,
        counter,
    })
}

/// Reads the whole file, groups rows into visits and posts them in key order.
pub async fn import_visits(settings: &ImportSettings) -> Result<VisitImportReport> {
    let url = settings.endpoint(ADD_VISITS_PATH);
    info!(
        "Starting historical visit import from {}",
        settings.input_path.display()
    );
    info!(
        "Targeting visit endpoint {} with batch size {}",
        url, settings.batch_size
    );

    let mut source = CsvSource::open(&settings.input_path)?;
    source.columns.require(&Column::VISIT_REQUIRED)?;
    if !source.columns.contains(Column::Amount) {
        info!("No amount column found; visits will be sent with amountCharged = 0.");
    }
    let columns = source.columns.clone();

    let rows: Vec<(u64, StringRecord)> = source
        .records(settings.row_limit)
        .filter_map(|item| item.map_err(|err| warn!("{:#}", err)).ok())
        .collect();
    if rows.is_empty() {
        info!("No data rows found in CSV for visit import.");
    }

    let mut grouper = VisitGrouper::new();
    let mut skipped_rows = 0usize;
    for (line, record) in &rows {
        match normalize_visit(&columns.row(record, *line), settings.date_format) {
            Some(fragment) => grouper.add(fragment),
            None => skipped_rows += 1,
        }
    }
    let unique_visits = grouper.len();
    info!(
        "Identified {} unique visits ({} rows skipped).",
        unique_visits, skipped_rows
    );

    let mut submitter = BatchSubmitter::new(
        url,
        VISITS_PAYLOAD_KEY,
        settings.submitter_config(),
        new_progress(Some(unique_visits as u64), settings.show_progress, "VISITS"),
    );
    for visit in grouper.into_items() {
        if submitter.push(visit).await? == Flow::Abort {
            break;
        }
    }
    let (summary, outcome) = submitter.finish().await?;

    Ok(VisitImportReport {
        summary,
        outcome,
        unique_visits,
        skipped_rows,
    })
}

/// Highest registration sequence number in the file, for a standalone counter update.
pub fn max_sequence_in_file(path: &std::path::Path) -> Result<i64> {
    let mut source = CsvSource::open(path)?;
    source.columns.require(&[Column::RegistrationId])?;
    let columns = source.columns.clone();
    let mut tracker = SequenceTracker::new();
    for item in source.records(None) {
        let (line, record) = item?;
        if let Some(registration_id) = columns.row(&record, line).registration_id() {
            tracker.observe(registration_id);
        }
    }
    Ok(tracker.max())
}
