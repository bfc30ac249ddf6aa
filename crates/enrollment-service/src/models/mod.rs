//! Enrollment data models.
//!
//! Classroom occupancy is always derived from the students bound to a
//! classroom; nothing here caches it across requests.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Site (campus) identifier.
    SiteId
);
id_type!(
    /// Shift (morning, afternoon, ...) identifier.
    ShiftId
);
id_type!(
    /// Enrollment process (admission round) identifier.
    ProcessId
);
id_type!(
    /// Classroom identifier.
    ClassroomId
);
id_type!(
    /// Student identifier.
    StudentId
);
id_type!(
    /// Payment plan identifier.
    PaymentPlanId
);

/// The (site, shift, process) triple every allocation is evaluated within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentScope {
    pub site_id: SiteId,
    pub shift_id: ShiftId,
    pub process_id: ProcessId,
}

impl fmt::Display for EnrollmentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "site={} shift={} process={}",
            self.site_id, self.shift_id, self.process_id
        )
    }
}

/// A classroom of a scope together with its occupancy at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ClassroomOccupancy {
    pub classroom_id: ClassroomId,
    pub name: String,
    /// Lower is preferred.
    pub priority: i32,
    pub capacity: i32,
    /// Students currently bound to the classroom.
    pub occupancy: i64,
}

impl ClassroomOccupancy {
    /// Seats still free; negative only if the data was corrupted externally.
    pub fn free_seats(&self) -> i64 {
        i64::from(self.capacity) - self.occupancy
    }

    pub fn has_room(&self) -> bool {
        self.free_seats() > 0
    }
}

/// A classroom chosen by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassroomRef {
    pub classroom_id: ClassroomId,
    pub name: String,
}

/// The permanent binding of a student to the classroom picked at enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub site_id: SiteId,
    pub shift_id: ShiftId,
    pub process_id: ProcessId,
    pub classroom_id: ClassroomId,
}

impl Placement {
    pub fn scope(&self) -> EnrollmentScope {
        EnrollmentScope {
            site_id: self.site_id,
            shift_id: self.shift_id,
            process_id: self.process_id,
        }
    }
}

/// Personal and payment fields of a student. These are the only fields a
/// profile update may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub name: String,
    pub last_name: String,
    /// National identity document number.
    pub dni: String,
    pub phone: String,
    pub record_number: String,
    pub enrolled_on: NaiveDate,
    pub payment_plan_id: PaymentPlanId,
    pub need_to_pay: bool,
}

impl StudentProfile {
    /// Canonical uppercase form of every free-text field.
    pub fn normalized(mut self) -> Self {
        self.name = normalize_text(&self.name);
        self.last_name = normalize_text(&self.last_name);
        self.dni = normalize_text(&self.dni);
        self.phone = normalize_text(&self.phone);
        self.record_number = normalize_text(&self.record_number);
        self
    }
}

/// Trim and uppercase a free-text field.
pub fn normalize_text(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Student record as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: StudentId,
    pub profile: StudentProfile,
    pub placement: Placement,
    pub photo: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Student ready to be inserted; the classroom is chosen inside the store's
/// critical section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub profile: StudentProfile,
    pub scope: EnrollmentScope,
    pub photo: Option<Vec<u8>>,
}

/// Projection returned by the student listing. Phone and photo are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StudentSummary {
    pub id: StudentId,
    pub name: String,
    pub last_name: String,
    pub dni: String,
    pub record_number: String,
    pub enrolled_on: NaiveDate,
    pub payment_plan_id: PaymentPlanId,
    pub need_to_pay: bool,
    pub site_id: SiteId,
    pub shift_id: ShiftId,
    pub process_id: ProcessId,
    pub classroom_id: ClassroomId,
}

impl From<&Student> for StudentSummary {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id,
            name: student.profile.name.clone(),
            last_name: student.profile.last_name.clone(),
            dni: student.profile.dni.clone(),
            record_number: student.profile.record_number.clone(),
            enrolled_on: student.profile.enrolled_on,
            payment_plan_id: student.profile.payment_plan_id,
            need_to_pay: student.profile.need_to_pay,
            site_id: student.placement.site_id,
            shift_id: student.placement.shift_id,
            process_id: student.placement.process_id,
            classroom_id: student.placement.classroom_id,
        }
    }
}

/// Display names of a placement, resolved at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementNames {
    pub site: String,
    pub shift: String,
    pub classroom: String,
}

/// Everything printed on a confirmation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationFacts {
    pub name: String,
    pub last_name: String,
    pub dni: String,
    pub phone: String,
    pub record_number: String,
    pub site: String,
    pub shift: String,
    pub classroom: String,
}

impl ConfirmationFacts {
    pub fn new(profile: &StudentProfile, names: PlacementNames) -> Self {
        Self {
            name: profile.name.clone(),
            last_name: profile.last_name.clone(),
            dni: profile.dni.clone(),
            phone: profile.phone.clone(),
            record_number: profile.record_number.clone(),
            site: names.site,
            shift: names.shift,
            classroom: names.classroom,
        }
    }
}

/// A rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Document {
    /// Standard base64 encoding of the document bytes, for JSON transport.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}
