#![forbid(unsafe_code)]

use proptest::test_runner::Config as ProptestConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const TEST_LOG_SCHEMA_VERSION: &str = "nx.test-log.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Unit,
    Property,
    Conformance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestLogV1 {
    pub schema_version: String,
    pub test_id: String,
    pub fixture_id: String,
    pub seed: Option<u64>,
    pub kind: TestKind,
    pub os: String,
    pub timestamp_unix_ms: u64,
    pub result: TestResult,
    pub duration_ms: u64,
    pub details: Option<String>,
}

impl TestLogV1 {
    #[must_use]
    pub fn unit(
        test_id: impl Into<String>,
        fixture_id: impl Into<String>,
        kind: TestKind,
        result: TestResult,
    ) -> Self {
        Self {
            schema_version: TEST_LOG_SCHEMA_VERSION.to_owned(),
            test_id: test_id.into(),
            fixture_id: fixture_id.into(),
            seed: capture_proptest_seed(),
            kind,
            os: std::env::consts::OS.to_owned(),
            timestamp_unix_ms: now_unix_ms_u64(),
            result,
            duration_ms: 0,
            details: None,
        }
    }
}

pub fn fixture_id_from_json<T: Serialize>(fixture: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(fixture)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[must_use]
pub fn property_test_case_count() -> u32 {
    if let Ok(raw) = std::env::var("NX_PROPTEST_CASES")
        && let Ok(parsed) = raw.parse::<u32>()
        && parsed > 0
    {
        return parsed;
    }

    if std::env::var_os("CI").is_some() {
        1024
    } else {
        256
    }
}

#[must_use]
pub fn capture_proptest_seed() -> Option<u64> {
    if let Ok(raw) = std::env::var("NX_PROPTEST_SEED")
        && let Ok(seed) = raw.parse::<u64>()
    {
        return Some(seed);
    }

    if let Ok(raw) = std::env::var("PROPTEST_RNG_SEED")
        && let Ok(seed) = raw.parse::<u64>()
    {
        return Some(seed);
    }

    None
}

/// Proptest config honoring `NX_PROPTEST_CASES`.
#[must_use]
pub fn proptest_config() -> ProptestConfig {
    ProptestConfig::with_cases(property_test_case_count())
}

/// Installs a test subscriber filtered by `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[must_use]
pub fn test_id(module_path: &str, test_name: &str) -> String {
    format!("{module_path}::{test_name}")
}

#[must_use]
pub fn test_log_dir() -> PathBuf {
    std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("target"))
        .join("nx-test-logs")
}

pub fn write_log(path: &Path, log: &TestLogV1) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| format!("log dir create failed: {err}"))?;
    }
    let payload =
        serde_json::to_string_pretty(log).map_err(|err| format!("log serialize failed: {err}"))?;
    fs::write(path, payload).map_err(|err| format!("log write failed: {err}"))
}

/// Runs `body` against a fixture, records a `TestLogV1`, and panics with the
/// failure detail if the body returns an error.
pub fn run_logged_case<Fixture, F>(test_id: &str, fixture: &Fixture, kind: TestKind, body: F)
where
    Fixture: Serialize,
    F: FnOnce() -> Result<(), String>,
{
    let start = Instant::now();
    let fixture_id = fixture_id_from_json(fixture).unwrap_or_else(|_| "<unserializable>".into());
    let mut log = TestLogV1::unit(test_id, fixture_id, kind, TestResult::Fail);

    let outcome = body();
    log.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    match &outcome {
        Ok(()) => log.result = TestResult::Pass,
        Err(detail) => log.details = Some(detail.clone()),
    }

    let path = test_log_dir().join(format!("{}.json", test_id.replace("::", "__")));
    if let Err(err) = write_log(&path, &log) {
        eprintln!("{err}");
    }

    if let Err(detail) = outcome {
        panic!("{test_id}: {detail}");
    }
}

fn now_unix_ms_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or(0)
}
