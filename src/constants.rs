pub const LIVE_FUNCTIONS_BASE_URL: &str = "https://us-central1-theneuron-ac757.cloudfunctions.net";
pub const LOCAL_FUNCTIONS_BASE_URL: &str = "http://127.0.0.1:5001/theneuron-ac757/us-central1";

pub const CREATE_PATIENTS_PATH: &str = "/createPatientHttp";
pub const ADD_VISITS_PATH: &str = "/addHistoricalVisitBatch";
pub const SET_COUNTER_PATH: &str = "/setPatientCounter";

pub const PATIENTS_PAYLOAD_KEY: &str = "patients";
pub const VISITS_PAYLOAD_KEY: &str = "visits";

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_PAUSE_MS: u64 = 1000;
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_COUNTER_TIMEOUT_SECS: u64 = 30;

pub const SEQUENCE_PREFIX: &str = "PR-";
pub const NULL_SENTINEL: &str = "NULL";
pub const MAX_REPORTED_FAILURES: usize = 10;

pub const USER_AGENT: &str = "clinic-import/0.1";
