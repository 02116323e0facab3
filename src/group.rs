use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::{
    models::{PatientRecord, VisitItem, VisitRecord},
    normalize::VisitFragment,
};

#[derive(Debug, Default)]
pub struct PatientGrouper {
    patients: IndexMap<String, PatientRecord>,
}

impl PatientGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, registration_id: &str) -> bool {
        self.patients.contains_key(registration_id)
    }

    /// Returns the record back when it is the first for its key, `None` when the key was
    /// already taken.
    pub fn insert(&mut self, record: PatientRecord) -> Option<&PatientRecord> {
        match self.patients.entry(record.registration_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => Some(&*slot.insert(record)),
        }
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }
}

#[derive(Debug, Default)]
pub struct VisitGrouper {
    visits: IndexMap<(String, String), VisitRecord>,
}

impl VisitGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, fragment: VisitFragment) {
        let key = fragment.key();
        let visit = self.visits.entry(key).or_insert_with(|| VisitRecord {
            details: fragment.details,
            medications: Vec::new(),
        });
        if let Some(medication) = fragment.medication {
            visit.medications.push(medication);
        }
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn into_items(self) -> impl Iterator<Item = VisitItem> {
        self.visits
            .into_iter()
            .map(|((patient_id, _), visit_data)| VisitItem {
                patient_id,
                visit_data,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MedicationEntry, VisitDetails};

    fn patient(key: &str, name: &str) -> PatientRecord {
        PatientRecord {
            registration_id: key.to_string(),
            name: name.to_string(),
            name_normalized: name.to_lowercase(),
            age: None,
            age_unit: None,
            sex: None,
            token: None,
            contact_number: None,
            national_id: None,
            guardian_name: None,
            address: None,
            recorded_on: None,
            recorded_by: None,
            imported: true,
        }
    }

    fn fragment(key: &str, date: &str, complaint: &str, med: Option<&str>) -> VisitFragment {
        VisitFragment {
            registration_id: key.to_string(),
            details: VisitDetails {
                visit_date: date.to_string(),
                complaint: Some(complaint.to_string()),
                examination: None,
                diagnosis: None,
                investigation: None,
                advice: None,
                next_plan: None,
                amount_charged: 0,
                original_csv_date: None,
            },
            medication: med.map(|name| MedicationEntry {
                name: name.to_string(),
                instructions: None,
                duration: None,
            }),
        }
    }

    #[test]
    fn first_patient_row_wins() {
        let mut grouper = PatientGrouper::new();
        assert_eq!(
            grouper.insert(patient("PR-1", "First")).map(|p| p.name.as_str()),
            Some("First")
        );
        assert!(grouper.insert(patient("PR-2", "Other")).is_some());
        assert!(grouper.insert(patient("PR-1", "Second")).is_none());
        assert!(grouper.contains("PR-1"));
        assert!(!grouper.contains("PR-3"));
        assert_eq!(grouper.len(), 2);
    }

    #[test]
    fn visit_rows_accumulate_medications_in_order() {
        let mut grouper = VisitGrouper::new();
        grouper.add(fragment("PR-1", "d1", "fever", Some("A")));
        grouper.add(fragment("PR-2", "d1", "cough", None));
        grouper.add(fragment("PR-1", "d1", "ignored", Some("B")));
        grouper.add(fragment("PR-1", "d2", "follow-up", Some("C")));
        grouper.add(fragment("PR-1", "d1", "ignored", None));
        grouper.add(fragment("PR-1", "d1", "ignored", Some("D")));
        assert_eq!(grouper.len(), 3);

        let items: Vec<_> = grouper.into_items().collect();
        let keys: Vec<_> = items
            .iter()
            .map(|i| (i.patient_id.as_str(), i.visit_data.details.visit_date.as_str()))
            .collect();
        assert_eq!(keys, vec![("PR-1", "d1"), ("PR-2", "d1"), ("PR-1", "d2")]);

        let first = &items[0].visit_data;
        assert_eq!(first.details.complaint.as_deref(), Some("fever"));
        let meds: Vec<_> = first.medications.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(meds, vec!["A", "B", "D"]);
        assert!(items[1].visit_data.medications.is_empty());
    }
}
