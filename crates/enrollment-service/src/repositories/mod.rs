//! Repository layer for the enrollment store.
//!
//! The store is the only shared state between concurrent enrollments. The
//! seat-binding write (`enroll_with_allocation`) runs the allocator inside the
//! store's own critical section so two requests can never both commit the
//! same last seat.
//!
//! # Components
//!
//! - `classrooms` - scope locking and occupancy queries
//! - `students` - student reads and writes
//! - `pg_store` - `EnrollmentStore` over PostgreSQL

pub mod classrooms;
pub mod pg_store;
pub mod students;

pub use pg_store::PgEnrollmentStore;

use crate::models::{
    ClassroomOccupancy, EnrollmentScope, NewStudent, Placement, PlacementNames, Student,
    StudentId, StudentProfile, StudentSummary,
};
use crate::services::seat_allocator::SeatAllocator;
use async_trait::async_trait;
use thiserror::Error;

/// SQLSTATE for `lock_not_available` (lock_timeout expired).
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE for `serialization_failure`.
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for `deadlock_detected`.
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE for `foreign_key_violation`.
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for `check_violation`.
const SQLSTATE_CHECK_VIOLATION: &str = "23514";

/// Repository-level error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient contention; the operation may succeed if retried.
    #[error("Store conflict: {0}")]
    Conflict(String),

    /// The write broke a schema constraint; retrying cannot help.
    #[error("Store rejected the write: {0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Store operation timed out")]
    Timeout,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::PoolTimedOut = err {
            return StoreError::Timeout;
        }
        let Some(db_err) = err.as_database_error() else {
            return StoreError::Database(err.to_string());
        };
        match db_err.code().as_deref() {
            Some(
                SQLSTATE_LOCK_NOT_AVAILABLE
                | SQLSTATE_SERIALIZATION_FAILURE
                | SQLSTATE_DEADLOCK_DETECTED,
            ) => StoreError::Conflict(err.to_string()),
            Some(SQLSTATE_FOREIGN_KEY_VIOLATION | SQLSTATE_CHECK_VIOLATION) => {
                StoreError::Rejected(
                    db_err
                        .constraint()
                        .map_or_else(|| db_err.message().to_string(), str::to_string),
                )
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Outcome of a seat-binding write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The student was stored, bound to the classroom the allocator picked.
    Bound(Student),
    /// Every classroom of the scope was full; nothing was written.
    Exhausted,
}

/// Read access to classroom occupancy, the allocator's only dependency.
#[async_trait]
pub trait CapacitySource: Send + Sync {
    /// Classrooms of the scope with their occupancy as of now.
    async fn classroom_occupancy(
        &self,
        scope: &EnrollmentScope,
    ) -> Result<Vec<ClassroomOccupancy>, StoreError>;
}

/// Durable record store used by the enrollment coordinator.
#[async_trait]
pub trait EnrollmentStore: CapacitySource {
    /// Atomically pick a classroom with `allocator` and insert the student
    /// bound to it. Implementations must re-read occupancy inside the same
    /// critical section as the insert.
    async fn enroll_with_allocation(
        &self,
        student: &NewStudent,
        allocator: &SeatAllocator,
    ) -> Result<BindOutcome, StoreError>;

    async fn find_student(&self, id: StudentId) -> Result<Option<Student>, StoreError>;

    /// Earliest-created student with this dni.
    async fn find_student_by_dni(&self, dni: &str) -> Result<Option<Student>, StoreError>;

    /// Overwrite the profile fields; keep the stored photo when `photo` is
    /// `None`. The placement is never touched. Returns `None` for unknown ids.
    async fn update_profile(
        &self,
        id: StudentId,
        profile: &StudentProfile,
        photo: Option<&[u8]>,
    ) -> Result<Option<Student>, StoreError>;

    /// Returns `false` for unknown ids.
    async fn delete_student(&self, id: StudentId) -> Result<bool, StoreError>;

    async fn list_students(&self) -> Result<Vec<StudentSummary>, StoreError>;

    /// Current display names of the placement's site, shift and classroom.
    async fn placement_names(
        &self,
        placement: &Placement,
    ) -> Result<Option<PlacementNames>, StoreError>;
}
