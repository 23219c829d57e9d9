use crate::result::error::ExecutionError;
use crate::testspec::TestKind;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Execution bookkeeping attached to every outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestMetadata {
    pub duration_seconds: f64,
    pub test_attempts: u32,
    pub vpn_restart_attempts: u32,
    /// Recent service log output from the target machine, for diagnostics only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_logs: Option<String>,
}

/// Outcome of one test execution
///
/// Serialized as `{ok, value?, error?, meta}` with exactly one of `value` and
/// `error` present.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult<T> {
    Ok { value: T, meta: TestMetadata },
    Err { error: ExecutionError, meta: TestMetadata },
}

impl<T> RunResult<T> {
    pub fn ok(value: T, meta: TestMetadata) -> Self {
        RunResult::Ok { value, meta }
    }

    pub fn err(error: ExecutionError, meta: TestMetadata) -> Self {
        RunResult::Err { error, meta }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RunResult::Ok { .. })
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// Failed only because the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.error().is_some_and(ExecutionError::is_cancelled)
    }

    pub fn meta(&self) -> &TestMetadata {
        match self {
            RunResult::Ok { meta, .. } | RunResult::Err { meta, .. } => meta,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            RunResult::Ok { value, .. } => Some(value),
            RunResult::Err { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            RunResult::Ok { .. } => None,
            RunResult::Err { error, .. } => Some(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RunResult<U> {
        match self {
            RunResult::Ok { value, meta } => RunResult::Ok { value: f(value), meta },
            RunResult::Err { error, meta } => RunResult::Err { error, meta },
        }
    }

    /// Fallible transformation of the success value, keeping the metadata
    pub fn and_then<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> RunResult<U>
    where
        E: Into<ExecutionError>,
    {
        match self {
            RunResult::Ok { value, meta } => match f(value) {
                Ok(value) => RunResult::Ok { value, meta },
                Err(e) => RunResult::Err { error: e.into(), meta },
            },
            RunResult::Err { error, meta } => RunResult::Err { error, meta },
        }
    }

    pub fn into_result(self) -> Result<T, ExecutionError> {
        match self {
            RunResult::Ok { value, .. } => Ok(value),
            RunResult::Err { error, .. } => Err(error),
        }
    }
}

#[derive(Serialize)]
struct RecordRef<'a, T> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ExecutionError>,
    meta: &'a TestMetadata,
}

#[derive(Deserialize)]
struct Record<T> {
    ok: bool,
    value: Option<T>,
    error: Option<ExecutionError>,
    meta: TestMetadata,
}

impl<T: Serialize> Serialize for RunResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RecordRef {
            ok: self.is_ok(),
            value: self.value(),
            error: self.error(),
            meta: self.meta(),
        }
        .serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RunResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = Record::<T>::deserialize(deserializer)?;
        match (record.ok, record.value, record.error) {
            (true, Some(value), None) => Ok(RunResult::Ok {
                value,
                meta: record.meta,
            }),
            (false, None, Some(error)) => Ok(RunResult::Err {
                error,
                meta: record.meta,
            }),
            (ok, value, error) => Err(D::Error::custom(format!(
                "result record with ok={ok} must carry exactly one of value/error \
                 (value present: {}, error present: {})",
                value.is_some(),
                error.is_some()
            ))),
        }
    }
}

/// One machine's outcome for one (vpn, profile, test kind) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedReport<T> {
    pub machine_name: String,
    pub vpn_name: String,
    pub profile_name: String,
    pub test_kind: TestKind,
    pub result: RunResult<T>,
}

impl<T> MixedReport<T> {
    pub fn new(
        machine_name: impl Into<String>,
        vpn_name: impl Into<String>,
        profile_name: impl Into<String>,
        test_kind: TestKind,
        result: RunResult<T>,
    ) -> Self {
        Self {
            machine_name: machine_name.into(),
            vpn_name: vpn_name.into(),
            profile_name: profile_name.into(),
            test_kind,
            result,
        }
    }
}
