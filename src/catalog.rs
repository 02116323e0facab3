use anyhow::{Context, Result};
use serde::Serialize;
use std::{collections::BTreeSet, fs, path::Path};
use tracing::warn;

use crate::{common::CsvSource, normalize::Column};

/// Distinct medication vocabulary used by the visit form's autocomplete.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MedicationCatalog {
    pub medication_names: BTreeSet<String>,
    pub instructions: BTreeSet<String>,
    pub durations: BTreeSet<String>,
}

impl MedicationCatalog {
    pub fn is_empty(&self) -> bool {
        self.medication_names.is_empty()
            && self.instructions.is_empty()
            && self.durations.is_empty()
    }
}

pub fn collect_medication_catalog(input_path: &Path) -> Result<MedicationCatalog> {
    let mut source = CsvSource::open(input_path)?;
    source.columns.require(&Column::MEDICATION_REQUIRED)?;
    let columns = source.columns.clone();

    let mut catalog = MedicationCatalog::default();
    for item in source.records(None) {
        let (line, record) = match item {
            Ok(row) => row,
            Err(err) => {
                warn!("{:#}", err);
                continue;
            }
        };
        let row = columns.row(&record, line);
        if let Some(name) = row.text(Column::MedicationName) {
            catalog.medication_names.insert(name.to_string());
        }
        if let Some(instructions) = row.text(Column::MedicationInstructions) {
            catalog.instructions.insert(instructions.to_string());
        }
        if let Some(duration) = row.text(Column::MedicationDuration) {
            catalog.durations.insert(duration.to_string());
        }
    }
    Ok(catalog)
}

/// Writes the catalog as pretty JSON. Returns `false` when there was nothing to write.
pub fn write_medication_catalog(input_path: &Path, output_path: &Path) -> Result<bool> {
    let catalog = collect_medication_catalog(input_path)?;
    if catalog.is_empty() {
        println!("No medication names, instructions, or durations found in the CSV.");
        return Ok(false);
    }

    println!("Found {} unique medication names.", catalog.medication_names.len());
    println!("Found {} unique instructions.", catalog.instructions.len());
    println!("Found {} unique durations.", catalog.durations.len());

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed creating {}", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(&catalog).context("Failed encoding medication catalog")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed writing {}", output_path.display()))?;
    println!("Wrote medication catalog {}", output_path.display());
    Ok(true)
}
