use serde::Serialize;

/// Demographics for one registration id, as the create-patients endpoint expects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientRecord {
    #[serde(rename = "pReg")]
    pub registration_id: String,
    pub name: String,
    pub name_normalized: String,
    #[serde(rename = "ageLastRecorded", skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(rename = "ageUnitLastRecorded", skip_serializing_if = "Option::is_none")]
    pub age_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(rename = "tToken", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "contactNo", skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(rename = "nicNo", skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    /// Guardian or occupation, depending on how the clinic filled the column.
    #[serde(rename = "fatherName", skip_serializing_if = "Option::is_none")]
    pub guardian_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "dateOfRecording", skip_serializing_if = "Option::is_none")]
    pub recorded_on: Option<String>,
    #[serde(rename = "recordedByUserId", skip_serializing_if = "Option::is_none")]
    pub recorded_by: Option<String>,
    #[serde(rename = "isImported")]
    pub imported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicationEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Clinical text of a visit, taken from the first row seen for its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDetails {
    pub visit_date: String,
    #[serde(rename = "complaints", skip_serializing_if = "Option::is_none")]
    pub complaint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation: Option<String>,
    #[serde(rename = "advise", skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_plan: Option<String>,
    pub amount_charged: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_csv_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitRecord {
    #[serde(flatten)]
    pub details: VisitDetails,
    pub medications: Vec<MedicationEntry>,
}

/// One element of the add-visits batch body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitItem {
    pub patient_id: String,
    pub visit_data: VisitRecord,
}
