//! Student repository module for database operations.
//!
//! None of these functions change a student's placement once inserted.

use crate::models::{
    ClassroomId, PaymentPlanId, Placement, PlacementNames, ProcessId, ShiftId, SiteId, Student,
    StudentId, StudentProfile, StudentSummary,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgExecutor, PgPool};

/// Student row (maps to students table).
#[derive(Debug, sqlx::FromRow)]
struct StudentRow {
    id: StudentId,
    name: String,
    last_name: String,
    dni: String,
    phone: String,
    record_number: String,
    enrolled_on: NaiveDate,
    payment_plan_id: PaymentPlanId,
    need_to_pay: bool,
    site_id: SiteId,
    shift_id: ShiftId,
    process_id: ProcessId,
    classroom_id: ClassroomId,
    photo: Option<Vec<u8>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Student {
            id: row.id,
            profile: StudentProfile {
                name: row.name,
                last_name: row.last_name,
                dni: row.dni,
                phone: row.phone,
                record_number: row.record_number,
                enrolled_on: row.enrolled_on,
                payment_plan_id: row.payment_plan_id,
                need_to_pay: row.need_to_pay,
            },
            placement: Placement {
                site_id: row.site_id,
                shift_id: row.shift_id,
                process_id: row.process_id,
                classroom_id: row.classroom_id,
            },
            photo: row.photo,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insert a student bound to `placement`.
///
/// Callers must hold the scope lock (see `classrooms::lock_scope`) and have
/// checked the classroom still has room within the same transaction.
pub async fn insert<'e, E>(
    executor: E,
    profile: &StudentProfile,
    placement: &Placement,
    photo: Option<&[u8]>,
) -> Result<Student, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, StudentRow>(
        r#"
        INSERT INTO students (
            name, last_name, dni, phone, record_number, enrolled_on,
            payment_plan_id, need_to_pay,
            site_id, shift_id, process_id, classroom_id, photo
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING
            id, name, last_name, dni, phone, record_number, enrolled_on,
            payment_plan_id, need_to_pay,
            site_id, shift_id, process_id, classroom_id, photo,
            created_at, updated_at
        "#,
    )
    .bind(&profile.name)
    .bind(&profile.last_name)
    .bind(&profile.dni)
    .bind(&profile.phone)
    .bind(&profile.record_number)
    .bind(profile.enrolled_on)
    .bind(profile.payment_plan_id)
    .bind(profile.need_to_pay)
    .bind(placement.site_id)
    .bind(placement.shift_id)
    .bind(placement.process_id)
    .bind(placement.classroom_id)
    .bind(photo)
    .fetch_one(executor)
    .await?;

    Ok(row.into())
}

/// Get student by id.
pub async fn get_by_id(pool: &PgPool, id: StudentId) -> Result<Option<Student>, sqlx::Error> {
    let row = sqlx::query_as::<_, StudentRow>(
        r#"
        SELECT
            id, name, last_name, dni, phone, record_number, enrolled_on,
            payment_plan_id, need_to_pay,
            site_id, shift_id, process_id, classroom_id, photo,
            created_at, updated_at
        FROM students
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

/// Get the earliest-created student with this dni.
///
/// dni is not unique-constrained; the lowest id wins.
pub async fn get_by_dni(pool: &PgPool, dni: &str) -> Result<Option<Student>, sqlx::Error> {
    let row = sqlx::query_as::<_, StudentRow>(
        r#"
        SELECT
            id, name, last_name, dni, phone, record_number, enrolled_on,
            payment_plan_id, need_to_pay,
            site_id, shift_id, process_id, classroom_id, photo,
            created_at, updated_at
        FROM students
        WHERE dni = $1
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(dni)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

/// Overwrite profile fields. A `None` photo keeps the stored one.
pub async fn update_profile(
    pool: &PgPool,
    id: StudentId,
    profile: &StudentProfile,
    photo: Option<&[u8]>,
) -> Result<Option<Student>, sqlx::Error> {
    let row = sqlx::query_as::<_, StudentRow>(
        r#"
        UPDATE students
        SET name = $2,
            last_name = $3,
            dni = $4,
            phone = $5,
            record_number = $6,
            enrolled_on = $7,
            payment_plan_id = $8,
            need_to_pay = $9,
            photo = COALESCE($10, photo),
            updated_at = NOW()
        WHERE id = $1
        RETURNING
            id, name, last_name, dni, phone, record_number, enrolled_on,
            payment_plan_id, need_to_pay,
            site_id, shift_id, process_id, classroom_id, photo,
            created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(&profile.name)
    .bind(&profile.last_name)
    .bind(&profile.dni)
    .bind(&profile.phone)
    .bind(&profile.record_number)
    .bind(profile.enrolled_on)
    .bind(profile.payment_plan_id)
    .bind(profile.need_to_pay)
    .bind(photo)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

/// Delete a student. Returns whether a row was removed.
pub async fn delete(pool: &PgPool, id: StudentId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// List every student, ordered by id.
pub async fn list(pool: &PgPool) -> Result<Vec<StudentSummary>, sqlx::Error> {
    sqlx::query_as::<_, StudentSummary>(
        r#"
        SELECT
            id, name, last_name, dni, record_number, enrolled_on,
            payment_plan_id, need_to_pay,
            site_id, shift_id, process_id, classroom_id
        FROM students
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Resolve the current display names of a placement.
pub async fn placement_names(
    pool: &PgPool,
    placement: &Placement,
) -> Result<Option<PlacementNames>, sqlx::Error> {
    let row: Option<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT si.name, sh.name, c.name
        FROM classrooms c
        JOIN sites si ON si.id = $1
        JOIN shifts sh ON sh.id = $2
        WHERE c.id = $3
        "#,
    )
    .bind(placement.site_id)
    .bind(placement.shift_id)
    .bind(placement.classroom_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(site, shift, classroom)| PlacementNames {
        site,
        shift,
        classroom,
    }))
}
