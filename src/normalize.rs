use anyhow::{Result, bail};
use chrono::NaiveDate;
use csv::StringRecord;
use regex::Regex;
use std::{collections::HashMap, sync::LazyLock};
use tracing::warn;

use crate::{
    args::DateFormat,
    constants::NULL_SENTINEL,
    models::{MedicationEntry, PatientRecord, VisitDetails},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    RegistrationId,
    Name,
    Age,
    AgeUnit,
    Sex,
    Token,
    ContactNumber,
    NationalId,
    GuardianName,
    Address,
    Date,
    UserId,
    Complaint,
    Examination,
    Diagnosis,
    Investigation,
    Advice,
    NextPlan,
    MedicationName,
    MedicationInstructions,
    MedicationDuration,
    Amount,
}

impl Column {
    pub const ALL: [Column; 22] = [
        Column::RegistrationId,
        Column::Name,
        Column::Age,
        Column::AgeUnit,
        Column::Sex,
        Column::Token,
        Column::ContactNumber,
        Column::NationalId,
        Column::GuardianName,
        Column::Address,
        Column::Date,
        Column::UserId,
        Column::Complaint,
        Column::Examination,
        Column::Diagnosis,
        Column::Investigation,
        Column::Advice,
        Column::NextPlan,
        Column::MedicationName,
        Column::MedicationInstructions,
        Column::MedicationDuration,
        Column::Amount,
    ];

    pub const PATIENT_REQUIRED: [Column; 12] = [
        Column::RegistrationId,
        Column::Name,
        Column::Age,
        Column::AgeUnit,
        Column::Sex,
        Column::Token,
        Column::ContactNumber,
        Column::NationalId,
        Column::GuardianName,
        Column::Address,
        Column::Date,
        Column::UserId,
    ];

    pub const VISIT_REQUIRED: [Column; 11] = [
        Column::RegistrationId,
        Column::Date,
        Column::Complaint,
        Column::Examination,
        Column::Diagnosis,
        Column::Investigation,
        Column::Advice,
        Column::NextPlan,
        Column::MedicationName,
        Column::MedicationInstructions,
        Column::MedicationDuration,
    ];

    pub const MEDICATION_REQUIRED: [Column; 3] = [
        Column::MedicationName,
        Column::MedicationInstructions,
        Column::MedicationDuration,
    ];

    /// Header spellings accepted for this column. The first entry is the clinic export's own name.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::RegistrationId => &["PReg", "registration_id", "reg_no"],
            Column::Name => &["Name", "patient_name"],
            Column::Age => &["Age"],
            Column::AgeUnit => &["YMD", "age_unit"],
            Column::Sex => &["Sex", "gender"],
            Column::Token => &["TToken", "token"],
            Column::ContactNumber => &["ContNo", "contact_no", "phone"],
            Column::NationalId => &["NICno", "nic", "national_id"],
            Column::GuardianName => &["FName", "father_name", "guardian_name"],
            Column::Address => &["Address"],
            Column::Date => &["Date", "visit_date"],
            Column::UserId => &["UserID", "recorded_by"],
            Column::Complaint => &["Complain", "complaints", "complaint"],
            Column::Examination => &["Examination"],
            Column::Diagnosis => &["Diagnose", "diagnosis"],
            Column::Investigation => &["Investigation"],
            Column::Advice => &["Advise", "advice"],
            Column::NextPlan => &["NextPlan", "next_plan"],
            Column::MedicationName => &["MName", "medication_name"],
            Column::MedicationInstructions => &["DoseInstruc", "dose_instructions"],
            Column::MedicationDuration => &["DoseforDay", "dose_duration"],
            Column::Amount => &["Amount", "amount_charged", "charges", "fee"],
        }
    }

    pub fn display_name(self) -> &'static str {
        self.aliases()[0]
    }
}

fn normalize_header_name(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn find_header_index(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    let header_norm: Vec<String> = headers.iter().map(normalize_header_name).collect();
    aliases.iter().find_map(|alias| {
        let target = normalize_header_name(alias);
        header_norm.iter().position(|h| *h == target)
    })
}

#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    positions: HashMap<Column, usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let positions = Column::ALL
            .iter()
            .filter_map(|col| find_header_index(headers, col.aliases()).map(|idx| (*col, idx)))
            .collect();
        Self { positions }
    }

    pub fn contains(&self, column: Column) -> bool {
        self.positions.contains_key(&column)
    }

    pub fn require(&self, columns: &[Column]) -> Result<()> {
        let missing: Vec<&str> = columns
            .iter()
            .filter(|col| !self.contains(**col))
            .map(|col| col.display_name())
            .collect();
        if !missing.is_empty() {
            bail!("CSV header is missing required columns: {}", missing.join(", "));
        }
        Ok(())
    }

    pub fn row<'a>(&'a self, record: &'a StringRecord, line: u64) -> Row<'a> {
        Row {
            record,
            columns: self,
            line,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    record: &'a StringRecord,
    columns: &'a ColumnMap,
    line: u64,
}

impl<'a> Row<'a> {
    /// 1-based line number in the source file (header is line 1).
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Trimmed value, or `None` when the column is missing or the cell is blank.
    pub fn text(&self, column: Column) -> Option<&'a str> {
        let idx = *self.columns.positions.get(&column)?;
        self.record
            .get(idx)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Like [`Row::text`], also treating the export's `NULL` marker as absent.
    pub fn text_or_sentinel(&self, column: Column) -> Option<&'a str> {
        self.text(column).filter(|value| *value != NULL_SENTINEL)
    }

    fn owned(&self, column: Column) -> Option<String> {
        self.text(column).map(str::to_string)
    }

    pub fn registration_id(&self) -> Option<&'a str> {
        self.text(Column::RegistrationId)
    }
}

/// Builds demographics from a row. Returns `None` (and logs) when the key or name is missing.
pub fn normalize_patient(row: &Row<'_>) -> Option<PatientRecord> {
    let registration_id = row.registration_id()?;
    let Some(name) = row.text(Column::Name) else {
        warn!(
            "Skipping PReg {} (row {}) for demographic import due to missing Name.",
            registration_id,
            row.line()
        );
        return None;
    };

    Some(PatientRecord {
        registration_id: registration_id.to_string(),
        name: name.to_string(),
        name_normalized: name.to_lowercase(),
        age: row.owned(Column::Age),
        age_unit: row.owned(Column::AgeUnit),
        sex: row.owned(Column::Sex),
        token: row.owned(Column::Token),
        contact_number: row.text_or_sentinel(Column::ContactNumber).map(str::to_string),
        national_id: row.text_or_sentinel(Column::NationalId).map(str::to_string),
        guardian_name: row.text_or_sentinel(Column::GuardianName).map(str::to_string),
        address: row.owned(Column::Address),
        recorded_on: row.owned(Column::Date),
        recorded_by: row.owned(Column::UserId),
        imported: true,
    })
}

/// The part of a visit contributed by a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitFragment {
    pub registration_id: String,
    pub details: VisitDetails,
    pub medication: Option<MedicationEntry>,
}

impl VisitFragment {
    pub fn key(&self) -> (String, String) {
        (
            self.registration_id.clone(),
            self.details.visit_date.clone(),
        )
    }
}

/// Builds the visit fragment for a row. Rows without a key, or whose date fails the
/// requested format, yield `None`.
pub fn normalize_visit(row: &Row<'_>, date_format: DateFormat) -> Option<VisitFragment> {
    let registration_id = row.registration_id()?;
    let raw_date = row.text(Column::Date)?;

    let (visit_date, original_csv_date) = match date_format {
        DateFormat::Raw => (raw_date.to_string(), None),
        DateFormat::Dmy => match parse_day_month_year(raw_date) {
            Some(date) => (
                date.format("%Y-%m-%d").to_string(),
                Some(raw_date.to_string()),
            ),
            None => {
                warn!(
                    "Discarding visit row {} for PReg {}: date {:?} is not a valid DD/MM/YYYY date.",
                    row.line(),
                    registration_id,
                    raw_date
                );
                return None;
            }
        },
    };

    let details = VisitDetails {
        visit_date,
        complaint: row.owned(Column::Complaint),
        examination: row.owned(Column::Examination),
        diagnosis: row.owned(Column::Diagnosis),
        investigation: row.owned(Column::Investigation),
        advice: row.owned(Column::Advice),
        next_plan: row.owned(Column::NextPlan),
        amount_charged: parse_amount(row.text(Column::Amount), row.line()),
        original_csv_date,
    };

    Some(VisitFragment {
        registration_id: registration_id.to_string(),
        details,
        medication: normalize_medication(row),
    })
}

pub fn normalize_medication(row: &Row<'_>) -> Option<MedicationEntry> {
    let name = row.text(Column::MedicationName)?;
    Some(MedicationEntry {
        name: name.to_string(),
        instructions: row.owned(Column::MedicationInstructions),
        duration: row.owned(Column::MedicationDuration),
    })
}

/// Strict `DD/MM/YYYY`; impossible calendar dates are rejected.
pub fn parse_day_month_year(value: &str) -> Option<NaiveDate> {
    let mut parts = value.trim().split('/');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || day.len() != 2 || month.len() != 2 || year.len() != 4 {
        return None;
    }
    NaiveDate::parse_from_str(value.trim(), "%d/%m/%Y").ok()
}

static PLAIN_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("amount pattern is valid"));

/// Charge amount with thousands separators stripped. Blank is 0; garbage is 0 with a warning.
pub fn parse_amount(value: Option<&str>, line: u64) -> i64 {
    let Some(raw) = value else {
        return 0;
    };
    let compact = raw.trim().replace(',', "");
    if PLAIN_AMOUNT.is_match(&compact) {
        if let Ok(amount) = compact.parse::<i64>() {
            return amount;
        }
        if let Ok(amount) = compact.parse::<f64>() {
            return amount.round() as i64;
        }
    }
    warn!("Unparseable amount {:?} on row {}; defaulting to 0.", raw, line);
    0
}
