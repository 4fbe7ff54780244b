use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or missing field.
    #[error("{0}")]
    Validation(String),
    #[error("room '{room}' is fully booked for these dates ({capacity} beds)")]
    Capacity { room: String, capacity: u32 },
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },
    #[error("check-out {check_out} must be after check-in {check_in}")]
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    /// Room changed between the availability read and the commit.
    #[error("room {0} changed while booking, try again")]
    ConcurrencyConflict(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("journal error: {0}")]
    Journal(String),
}

impl EngineError {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        EngineError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Short human-readable reason, as shown to a user or in an import ledger.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Capacity { .. } => "capacity",
            EngineError::NotFound { .. } => "not_found",
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::ConcurrencyConflict(_) => "concurrency_conflict",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::MissingColumns(_) => "missing_columns",
            EngineError::MalformedInput(_) => "malformed_input",
            EngineError::Config(_) => "config",
            EngineError::Journal(_) => "journal",
        }
    }
}
