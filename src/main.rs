mod args;
mod catalog;
mod common;
mod constants;
mod counter;
mod group;
mod import;
mod models;
mod normalize;
mod reconcile;
mod submit;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::time::Duration;
use tracing::error;

use args::{Args, Command, CounterArgs, ImportArgs};
use catalog::write_medication_catalog;
use common::build_client;
use constants::SET_COUNTER_PATH;
use counter::{CounterOutcome, update_remote_counter};
use import::{
    ImportSettings, PatientImportReport, VisitImportReport, import_patients, import_visits,
    max_sequence_in_file,
};
use submit::PhaseOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    match args.cmd {
        Command::Patients(cmd) => {
            ensure_completed(run_patients(&cmd).await?.outcome, "patient")
        }
        Command::Visits(cmd) => ensure_completed(run_visits(&cmd).await?.outcome, "visit"),
        Command::All(cmd) => run_all(&cmd).await,
        Command::SetCounter(cmd) => run_set_counter(&cmd).await,
        Command::MedicationCatalog(cmd) => {
            write_medication_catalog(&cmd.input_path, &cmd.output_path)
                .context("medication catalog failed")?;
            Ok(())
        }
    }
}

async fn run_patients(cmd: &ImportArgs) -> Result<PatientImportReport> {
    let settings = ImportSettings::from(cmd);
    let report = import_patients(&settings)
        .await
        .context("patient import failed")?;
    print_patient_report(&report);
    Ok(report)
}

async fn run_visits(cmd: &ImportArgs) -> Result<VisitImportReport> {
    let settings = ImportSettings::from(cmd);
    let report = import_visits(&settings)
        .await
        .context("visit import failed")?;
    print_visit_report(&report);
    Ok(report)
}

fn ensure_completed(outcome: PhaseOutcome, phase: &str) -> Result<()> {
    if outcome == PhaseOutcome::Aborted {
        bail!("{phase} import aborted: backend refused the connection");
    }
    Ok(())
}

/// Patients then visits. A missing file or a refused connection ends the run; any other patient
/// failure is reported after the visit phase has had its turn.
async fn run_all(cmd: &ImportArgs) -> Result<()> {
    if !cmd.input_path.exists() {
        bail!("CSV file not found at {}", cmd.input_path.display());
    }
    let patient_error = match run_patients(cmd).await {
        Ok(report) => {
            ensure_completed(report.outcome, "patient")?;
            None
        }
        Err(err) => {
            error!("{:#}; continuing with the visit import", err);
            Some(err)
        }
    };
    ensure_completed(run_visits(cmd).await?.outcome, "visit")?;
    match patient_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn run_set_counter(cmd: &CounterArgs) -> Result<()> {
    let value = match (cmd.value, &cmd.input_path) {
        (Some(value), _) => value,
        (None, Some(path)) => {
            let max = max_sequence_in_file(path)?;
            println!("Highest registration number in {}: {}", path.display(), max);
            max
        }
        (None, None) => bail!("either --value or --input-path is required"),
    };

    let client = build_client(Duration::from_secs(cmd.timeout_secs))?;
    let url = format!("{}{}", cmd.target.resolved_base_url(), SET_COUNTER_PATH);
    match update_remote_counter(&client, &url, value).await {
        CounterOutcome::Updated(value) => println!("Patient counter set to {value}."),
        CounterOutcome::Skipped => {
            println!("No positive registration number; counter left unchanged.")
        }
        CounterOutcome::NotAttempted => {}
        CounterOutcome::Failed(message) => bail!("failed setting patient counter: {message}"),
    }
    Ok(())
}

fn print_patient_report(report: &PatientImportReport) {
    println!();
    print!("{}", report.summary.report("Patient Demographic Import"));
    println!("Unique registration ids prepared: {}", report.unique_patients);
    match &report.counter {
        CounterOutcome::Updated(value) => println!("Patient counter set to {value}."),
        CounterOutcome::Skipped => {
            println!("No valid registration numbers found in CSV to update the counter.")
        }
        CounterOutcome::NotAttempted => println!(
            "Counter update not attempted (import aborted; highest registration number seen: {}).",
            report.max_sequence
        ),
        CounterOutcome::Failed(message) => {
            println!("Counter update to {} failed: {message}", report.max_sequence)
        }
    }
}

fn print_visit_report(report: &VisitImportReport) {
    println!();
    print!("{}", report.summary.report("Historical Visit Import"));
    println!(
        "Unique visits prepared: {} ({} rows skipped)",
        report.unique_visits, report.skipped_rows
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn all_args(input: &std::path::Path, base_url: &str) -> ImportArgs {
        let args = Args::parse_from([
            "clinic_import",
            "all",
            "--input-path",
            input.to_str().unwrap(),
            "--base-url",
            base_url,
            "--pause-ms",
            "0",
            "--no-progress",
        ]);
        match args.cmd {
            Command::All(cmd) => cmd,
            other => panic!("unexpected subcommand {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_runs_visits_when_patient_columns_are_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "PReg,Date,Complain,Examination,Diagnose,Investigation,Advise,NextPlan,\
MName,DoseInstruc,DoseforDay"
        )
        .unwrap();
        writeln!(file, "PR-1,14/02/2023,fever,,,,,,Panadol,1+1+1,3 days").unwrap();
        file.flush().unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/createPatientHttp"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/addHistoricalVisitBatch"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"successCount": 1, "failureCount": 0})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = run_all(&all_args(file.path(), &server.uri()))
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.starts_with("patient import failed"));
        assert!(message.contains("UserID"));
    }

    #[tokio::test]
    async fn all_stops_when_the_file_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let missing = std::path::Path::new("/nonexistent/clinic.csv");
        let err = run_all(&all_args(missing, &server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn all_skips_visits_after_a_refused_patient_batch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "PReg,Name,Age,YMD,Sex,TToken,ContNo,NICno,FName,Address,Date,UserID,\
Complain,Examination,Diagnose,Investigation,Advise,NextPlan,MName,DoseInstruc,DoseforDay"
        )
        .unwrap();
        writeln!(file, "PR-1,Amna,30,Y,F,,,,,,14/02/2023,4,fever,,,,,,,,").unwrap();
        file.flush().unwrap();

        let server = crate::test_support::spawn_scripted_server(Vec::new()).await;
        let err = run_all(&all_args(file.path(), &server.base_url()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("patient import aborted"));
        assert!(server.finish().await.is_empty());
    }
}
