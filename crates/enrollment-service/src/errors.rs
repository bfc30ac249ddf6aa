//! Enrollment error types.
//!
//! Every variant maps to a status hint and a stable machine code for the
//! routing layer. Messages meant for clients are intentionally generic; the
//! underlying store or renderer errors are logged server-side.

use crate::models::StudentId;
use crate::repositories::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Enrollment error type.
///
/// Maps to status hints:
/// - Validation, NoSeatsAvailable: 400 Bad Request
/// - NotFound, NoPhoto: 404 Not Found
/// - AllocationConflict: 409 Conflict
/// - DocumentRender: 500 Internal Server Error
/// - StoreUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No seats available for the requested site, shift and process")]
    NoSeatsAvailable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Student has no stored photo")]
    NoPhoto,

    #[error("Allocation conflict: concurrent enrollments kept winning the last seats")]
    AllocationConflict,

    /// The enrollment was committed; only the document failed.
    #[error("Document rendering failed for student {student_id}: {reason}")]
    DocumentRender {
        student_id: StudentId,
        reason: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EnrollmentError {
    /// Returns the HTTP status code hint for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EnrollmentError::Validation(_) | EnrollmentError::NoSeatsAvailable => 400,
            EnrollmentError::NotFound(_) | EnrollmentError::NoPhoto => 404,
            EnrollmentError::AllocationConflict => 409,
            EnrollmentError::DocumentRender { .. } => 500,
            EnrollmentError::StoreUnavailable(_) => 503,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EnrollmentError::Validation(_) => "VALIDATION_ERROR",
            EnrollmentError::NoSeatsAvailable => "NO_SEATS_AVAILABLE",
            EnrollmentError::NotFound(_) => "NOT_FOUND",
            EnrollmentError::NoPhoto => "NO_PHOTO",
            EnrollmentError::AllocationConflict => "ALLOCATION_CONFLICT",
            EnrollmentError::DocumentRender { .. } => "DOCUMENT_RENDER_ERROR",
            EnrollmentError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrollmentError::AllocationConflict | EnrollmentError::StoreUnavailable(_)
        )
    }

    /// Message safe to show to clients.
    pub fn client_message(&self) -> String {
        match self {
            EnrollmentError::Validation(reason) => reason.clone(),
            EnrollmentError::NoSeatsAvailable => {
                "No classrooms available for this site, shift and enrollment process".to_string()
            }
            EnrollmentError::NotFound(_) => "Student not found".to_string(),
            EnrollmentError::NoPhoto => "The student has no associated photo".to_string(),
            EnrollmentError::AllocationConflict => {
                "Too many simultaneous enrollments. Please try again.".to_string()
            }
            EnrollmentError::DocumentRender { student_id, reason } => {
                tracing::error!(
                    target: "enrollment.errors",
                    student_id = %student_id,
                    reason = %reason,
                    "Confirmation document could not be rendered"
                );
                "The enrollment was saved but the confirmation document could not be generated"
                    .to_string()
            }
            EnrollmentError::StoreUnavailable(reason) => {
                tracing::warn!(target: "enrollment.errors", reason = %reason, "Store unavailable");
                "Service temporarily unavailable".to_string()
            }
        }
    }

    /// Body for the routing layer: `{ "error": { "code", "message" } }`.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Transient conflicts that survive here were not retried by the caller.
impl From<StoreError> for EnrollmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => EnrollmentError::AllocationConflict,
            StoreError::Rejected(constraint) => EnrollmentError::Validation(format!(
                "record references missing or invalid data ({})",
                constraint
            )),
            StoreError::Database(reason) => EnrollmentError::StoreUnavailable(reason),
            StoreError::Timeout => {
                EnrollmentError::StoreUnavailable("store operation timed out".to_string())
            }
        }
    }
}
