//! Classroom repository: scope locks and derived occupancy.
//!
//! # Concurrency
//!
//! `lock_scope` takes row locks on every classroom of a scope, in id order,
//! for the rest of the enclosing transaction. Occupancy must then be read by a
//! separate statement: under READ COMMITTED each statement gets a fresh
//! snapshot, so the count includes students committed by the previous holder
//! of the locks.

use crate::models::{ClassroomId, ClassroomOccupancy, EnrollmentScope};
use sqlx::{PgExecutor, PgPool};
use tracing::instrument;

/// Lock every classroom row of `scope` until the transaction ends.
///
/// Returns the number of classrooms locked.
#[instrument(skip_all, fields(scope = %scope))]
pub async fn lock_scope<'e, E>(executor: E, scope: &EnrollmentScope) -> Result<usize, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let locked: Vec<(ClassroomId,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM classrooms
        WHERE site_id = $1 AND shift_id = $2 AND process_id = $3
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(scope.site_id)
    .bind(scope.shift_id)
    .bind(scope.process_id)
    .fetch_all(executor)
    .await?;

    Ok(locked.len())
}

/// Bound the wait for row locks within the current transaction.
pub async fn set_lock_timeout<'e, E>(executor: E, lock_timeout_ms: u64) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", lock_timeout_ms))
        .execute(executor)
        .await?;
    Ok(())
}

/// Classrooms of `scope` with the number of students bound to each.
#[instrument(skip_all, fields(scope = %scope))]
pub async fn occupancy_in_scope<'e, E>(
    executor: E,
    scope: &EnrollmentScope,
) -> Result<Vec<ClassroomOccupancy>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ClassroomOccupancy>(
        r#"
        SELECT
            c.id AS classroom_id,
            c.name,
            c.priority,
            c.capacity,
            COUNT(s.id) AS occupancy
        FROM classrooms c
        LEFT JOIN students s ON s.classroom_id = c.id
        WHERE c.site_id = $1 AND c.shift_id = $2 AND c.process_id = $3
        GROUP BY c.id, c.name, c.priority, c.capacity
        ORDER BY c.priority ASC, c.id ASC
        "#,
    )
    .bind(scope.site_id)
    .bind(scope.shift_id)
    .bind(scope.process_id)
    .fetch_all(executor)
    .await
}

/// One line of the capacity report.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CapacityReportRow {
    pub site: String,
    pub shift: String,
    pub process: String,
    pub classroom: String,
    pub priority: i32,
    pub capacity: i32,
    pub occupancy: i64,
}

/// Occupancy of every classroom, grouped by scope.
pub async fn capacity_report(pool: &PgPool) -> Result<Vec<CapacityReportRow>, sqlx::Error> {
    sqlx::query_as::<_, CapacityReportRow>(
        r#"
        SELECT
            si.name AS site,
            sh.name AS shift,
            ep.name AS process,
            c.name AS classroom,
            c.priority,
            c.capacity,
            (SELECT COUNT(*) FROM students s WHERE s.classroom_id = c.id) AS occupancy
        FROM classrooms c
        JOIN sites si ON si.id = c.site_id
        JOIN shifts sh ON sh.id = c.shift_id
        JOIN enrollment_processes ep ON ep.id = c.process_id
        ORDER BY si.name, sh.name, ep.name, c.priority, c.id
        "#,
    )
    .fetch_all(pool)
    .await
}
