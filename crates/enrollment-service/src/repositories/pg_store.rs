//! PostgreSQL implementation of `EnrollmentStore`.
//!
//! # Seat binding
//!
//! Allocation uses pessimistic per-scope serialization:
//! 1. Begin a transaction and cap lock waits with `lock_timeout`
//! 2. `SELECT ... FOR UPDATE` every classroom row of the scope
//! 3. Re-count occupancy in a separate statement
//! 4. Let the allocator pick a classroom
//! 5. Insert the student and commit
//!
//! A second request for the same scope blocks at step 2 until the first
//! commits or rolls back, so it can never see a seat that was just taken.
//! Dropping the future before commit rolls the transaction back.

use super::{
    classrooms, students, BindOutcome, CapacitySource, EnrollmentStore, StoreError,
};
use crate::models::{
    ClassroomOccupancy, EnrollmentScope, NewStudent, Placement, PlacementNames, Student,
    StudentId, StudentProfile, StudentSummary,
};
use crate::observability::metrics::record_db_query;
use crate::services::seat_allocator::SeatAllocator;
use async_trait::async_trait;
use sqlx::PgPool;
use std::future::Future;
use std::time::Instant;
use tracing::instrument;

/// Default cap on waiting for a scope lock, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;

/// Enrollment store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgEnrollmentStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgEnrollmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Override the scope lock wait cap.
    pub fn with_lock_timeout_ms(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    /// Occupancy of every classroom with its scope names, for operators.
    pub async fn capacity_report(&self) -> Result<Vec<classrooms::CapacityReportRow>, StoreError> {
        timed("capacity_report", classrooms::capacity_report(&self.pool)).await
    }

    async fn bind_in_transaction(
        &self,
        student: &NewStudent,
        allocator: &SeatAllocator,
    ) -> Result<BindOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        classrooms::set_lock_timeout(&mut *tx, self.lock_timeout_ms).await?;
        let locked = classrooms::lock_scope(&mut *tx, &student.scope).await?;
        if locked == 0 {
            tx.rollback().await?;
            return Ok(BindOutcome::Exhausted);
        }

        let candidates = classrooms::occupancy_in_scope(&mut *tx, &student.scope).await?;
        let Some(choice) = allocator.select(&candidates) else {
            tx.rollback().await?;
            return Ok(BindOutcome::Exhausted);
        };

        let placement = Placement {
            site_id: student.scope.site_id,
            shift_id: student.scope.shift_id,
            process_id: student.scope.process_id,
            classroom_id: choice.classroom_id,
        };
        let stored = students::insert(
            &mut *tx,
            &student.profile,
            &placement,
            student.photo.as_deref(),
        )
        .await?;

        tx.commit().await?;

        tracing::debug!(
            target: "enrollment.repository.students",
            student_id = %stored.id,
            classroom_id = %placement.classroom_id,
            free_seats_before = choice.free_seats(),
            "Student bound to classroom"
        );

        Ok(BindOutcome::Bound(stored))
    }
}

/// Run a query, record its duration and outcome, and map the error.
async fn timed<T, F>(operation: &'static str, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = query.await.map_err(StoreError::from);
    let status = match &result {
        Ok(_) => "success",
        Err(StoreError::Conflict(_)) => "conflict",
        Err(StoreError::Timeout) => "timeout",
        Err(StoreError::Rejected(_)) => "rejected",
        Err(StoreError::Database(_)) => "error",
    };
    record_db_query(operation, status, start.elapsed());
    result
}

#[async_trait]
impl CapacitySource for PgEnrollmentStore {
    #[instrument(skip_all, fields(scope = %scope))]
    async fn classroom_occupancy(
        &self,
        scope: &EnrollmentScope,
    ) -> Result<Vec<ClassroomOccupancy>, StoreError> {
        timed(
            "classroom_occupancy",
            classrooms::occupancy_in_scope(&self.pool, scope),
        )
        .await
    }
}

#[async_trait]
impl EnrollmentStore for PgEnrollmentStore {
    #[instrument(skip_all, fields(scope = %student.scope))]
    async fn enroll_with_allocation(
        &self,
        student: &NewStudent,
        allocator: &SeatAllocator,
    ) -> Result<BindOutcome, StoreError> {
        timed(
            "enroll_with_allocation",
            self.bind_in_transaction(student, allocator),
        )
        .await
    }

    #[instrument(skip_all, fields(student_id = %id))]
    async fn find_student(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        timed("find_student", students::get_by_id(&self.pool, id)).await
    }

    #[instrument(skip_all)]
    async fn find_student_by_dni(&self, dni: &str) -> Result<Option<Student>, StoreError> {
        timed("find_student_by_dni", students::get_by_dni(&self.pool, dni)).await
    }

    #[instrument(skip_all, fields(student_id = %id, new_photo = photo.is_some()))]
    async fn update_profile(
        &self,
        id: StudentId,
        profile: &StudentProfile,
        photo: Option<&[u8]>,
    ) -> Result<Option<Student>, StoreError> {
        timed(
            "update_profile",
            students::update_profile(&self.pool, id, profile, photo),
        )
        .await
    }

    #[instrument(skip_all, fields(student_id = %id))]
    async fn delete_student(&self, id: StudentId) -> Result<bool, StoreError> {
        timed("delete_student", students::delete(&self.pool, id)).await
    }

    #[instrument(skip_all)]
    async fn list_students(&self) -> Result<Vec<StudentSummary>, StoreError> {
        timed("list_students", students::list(&self.pool)).await
    }

    #[instrument(skip_all, fields(classroom_id = %placement.classroom_id))]
    async fn placement_names(
        &self,
        placement: &Placement,
    ) -> Result<Option<PlacementNames>, StoreError> {
        timed(
            "placement_names",
            students::placement_names(&self.pool, placement),
        )
        .await
    }
}
