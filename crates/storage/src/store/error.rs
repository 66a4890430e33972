#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    InvalidInput(&'static str),
    RevisionMismatch {
        expected: i64,
        actual: i64,
    },
    UnknownId,
    DuplicateExternalId {
        external_id: String,
    },
    UnresolvedParent {
        external_id: String,
        parent_external_id: String,
    },
    JobNotClaimable {
        job_id: String,
        status: String,
    },
    JobNotRunning {
        job_id: String,
        status: String,
    },
    JobClaimMismatch {
        job_id: String,
        expected_runner: Option<String>,
        actual_runner: String,
        expected_revision: i64,
        actual_revision: i64,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::RevisionMismatch { expected, actual } => {
                write!(f, "revision mismatch (expected={expected}, actual={actual})")
            }
            Self::UnknownId => write!(f, "unknown id"),
            Self::DuplicateExternalId { external_id } => {
                write!(f, "duplicate external id ({external_id})")
            }
            Self::UnresolvedParent {
                external_id,
                parent_external_id,
            } => write!(
                f,
                "unresolved parent reference ({external_id} -> {parent_external_id})"
            ),
            Self::JobNotClaimable { job_id, status } => {
                write!(f, "job not claimable (job_id={job_id}, status={status})")
            }
            Self::JobNotRunning { job_id, status } => {
                write!(f, "job not running (job_id={job_id}, status={status})")
            }
            Self::JobClaimMismatch {
                job_id,
                expected_runner,
                actual_runner,
                expected_revision,
                actual_revision,
            } => write!(
                f,
                "job claim mismatch (job_id={job_id}, expected_runner={expected_runner:?}, actual_runner={actual_runner}, expected_revision={expected_revision}, actual_revision={actual_revision})"
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
