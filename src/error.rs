//! Core error type shared by the store, type catalog, query builder, RLS
//! engine, auth core and OAuth core.
//!
//! HTTP-facing conversion into the uniform JSON envelope lives in
//! `http::error`.

use thiserror::Error;

/// A stable wire code attached to every error kind, surfaced verbatim in the
/// JSON error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    ValidationFailed,
    UnknownColumn,
    RlsDenied,
    UniqueViolation,
    FkViolation,
    CheckViolation,
    NotFound,
    InvalidJson,
    Unauthorized,
    ServerError,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::ValidationFailed => "validation_failed",
            Code::UnknownColumn => "unknown_column",
            Code::RlsDenied => "rls_denied",
            Code::UniqueViolation => "unique_violation",
            Code::FkViolation => "fk_violation",
            Code::CheckViolation => "check_violation",
            Code::NotFound => "not_found",
            Code::InvalidJson => "invalid_json",
            Code::Unauthorized => "unauthorized",
            Code::ServerError => "server_error",
        }
    }
}

/// Core error kinds per the error handling design: validation (400),
/// authentication (401), authorization (403), not-found (404), conflict
/// (409), integrity (400), internal (500).
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("authentication required")]
    Authentication,

    #[error("row-level security denied access")]
    RlsDenied,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("foreign key constraint violated")]
    FkViolation,

    #[error("check constraint violated")]
    CheckViolation,

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn code(&self) -> Code {
        match self {
            Error::Validation(_) => Code::ValidationFailed,
            Error::UnknownColumn(_) => Code::UnknownColumn,
            Error::Authentication => Code::Unauthorized,
            Error::RlsDenied => Code::RlsDenied,
            Error::NotFound(_) => Code::NotFound,
            Error::Conflict(_) => Code::UniqueViolation,
            Error::UniqueViolation => Code::UniqueViolation,
            Error::FkViolation => Code::FkViolation,
            Error::CheckViolation => Code::CheckViolation,
            Error::InvalidJson(_) => Code::InvalidJson,
            Error::Internal(_) => Code::ServerError,
        }
    }

    pub fn internal(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Internal(Box::new(e))
    }
}

/// Classify a raw `sqlx::Error` into the taxonomy above by inspecting the
/// underlying SQLite error code, following the store's "never leak the
/// driver's text when a typed kind applies" rule.
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    "2067" | "1555" => return Error::UniqueViolation, // SQLITE_CONSTRAINT_UNIQUE / PRIMARYKEY
                    "787" => return Error::FkViolation,               // SQLITE_CONSTRAINT_FOREIGNKEY
                    "275" => return Error::CheckViolation,            // SQLITE_CONSTRAINT_CHECK
                    "1299" => return Error::Validation("null value violates not-null constraint".into()), // SQLITE_CONSTRAINT_NOTNULL
                    _ => {}
                }
            }
            if db_err.is_unique_violation() {
                return Error::UniqueViolation;
            }
        }
        if matches!(e, sqlx::Error::RowNotFound) {
            return Error::NotFound("row not found".into());
        }
        tracing::error!(error = %e, "store error");
        Error::internal(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
