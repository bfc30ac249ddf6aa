//! In-memory `EnrollmentStore`.
//!
//! All state sits behind one async mutex, so `enroll_with_allocation` reads
//! occupancy, runs the allocator and inserts inside a single critical
//! section, the same guarantee the PostgreSQL store gets from its scope lock.
//!
//! Faults can be injected to exercise the coordinator's retry and timeout
//! paths.

use async_trait::async_trait;
use chrono::Utc;
use enrollment_service::models::{
    ClassroomId, ClassroomOccupancy, EnrollmentScope, NewStudent, Placement, PlacementNames,
    ProcessId, ShiftId, SiteId, Student, StudentId, StudentProfile, StudentSummary,
};
use enrollment_service::repositories::{BindOutcome, CapacitySource, EnrollmentStore, StoreError};
use enrollment_service::services::SeatAllocator;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct ClassroomRecord {
    scope: EnrollmentScope,
    name: String,
    capacity: i32,
    priority: i32,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    sites: HashMap<SiteId, String>,
    shifts: HashMap<ShiftId, String>,
    processes: HashMap<ProcessId, String>,
    classrooms: BTreeMap<ClassroomId, ClassroomRecord>,
    students: BTreeMap<StudentId, Student>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn occupancy_of(&self, classroom_id: ClassroomId) -> i64 {
        self.students
            .values()
            .filter(|s| s.placement.classroom_id == classroom_id)
            .count() as i64
    }

    fn occupancy_in_scope(&self, scope: &EnrollmentScope) -> Vec<ClassroomOccupancy> {
        let mut rows: Vec<ClassroomOccupancy> = self
            .classrooms
            .iter()
            .filter(|(_, c)| c.scope == *scope)
            .map(|(id, c)| ClassroomOccupancy {
                classroom_id: *id,
                name: c.name.clone(),
                priority: c.priority,
                capacity: c.capacity,
                occupancy: self.occupancy_of(*id),
            })
            .collect();
        rows.sort_by_key(|row| (row.priority, row.classroom_id));
        rows
    }
}

/// Thread-safe in-memory store with fault injection.
#[derive(Debug, Default)]
pub struct InMemoryEnrollmentStore {
    state: Mutex<State>,
    pending_conflicts: AtomicU32,
    unavailable: AtomicBool,
    enroll_delay_ms: AtomicU32,
    enroll_calls: AtomicUsize,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub async fn add_site(&self, name: &str) -> SiteId {
        let mut state = self.state.lock().await;
        let id = SiteId(state.next_id());
        state.sites.insert(id, name.to_string());
        id
    }

    pub async fn add_shift(&self, name: &str) -> ShiftId {
        let mut state = self.state.lock().await;
        let id = ShiftId(state.next_id());
        state.shifts.insert(id, name.to_string());
        id
    }

    pub async fn add_process(&self, name: &str) -> ProcessId {
        let mut state = self.state.lock().await;
        let id = ProcessId(state.next_id());
        state.processes.insert(id, name.to_string());
        id
    }

    /// Create a site, shift and process and return them as a scope.
    pub async fn add_scope(&self, site: &str, shift: &str, process: &str) -> EnrollmentScope {
        EnrollmentScope {
            site_id: self.add_site(site).await,
            shift_id: self.add_shift(shift).await,
            process_id: self.add_process(process).await,
        }
    }

    pub async fn add_classroom(
        &self,
        scope: EnrollmentScope,
        name: &str,
        capacity: i32,
        priority: i32,
    ) -> ClassroomId {
        let mut state = self.state.lock().await;
        let id = ClassroomId(state.next_id());
        state.classrooms.insert(
            id,
            ClassroomRecord {
                scope,
                name: name.to_string(),
                capacity,
                priority,
            },
        );
        id
    }

    /// Rename a site. Documents rendered afterwards show the new name.
    pub async fn rename_site(&self, id: SiteId, name: &str) {
        self.state.lock().await.sites.insert(id, name.to_string());
    }

    /// Drop a site's name so placements under it can no longer be resolved.
    pub async fn forget_site(&self, id: SiteId) {
        self.state.lock().await.sites.remove(&id);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn occupancy(&self, classroom_id: ClassroomId) -> i64 {
        self.state.lock().await.occupancy_of(classroom_id)
    }

    pub async fn student_count(&self) -> usize {
        self.state.lock().await.students.len()
    }

    /// Number of `enroll_with_allocation` calls, including failed ones.
    pub fn enroll_calls(&self) -> usize {
        self.enroll_calls.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// The next `n` seat-binding writes fail with `StoreError::Conflict`.
    pub fn fail_next_enrolls_with_conflict(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// While set, every call fails with `StoreError::Database`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sleep this long before entering the seat-binding critical section.
    pub fn set_enroll_delay(&self, delay: Duration) {
        self.enroll_delay_ms
            .store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection refused".to_string()));
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CapacitySource for InMemoryEnrollmentStore {
    async fn classroom_occupancy(
        &self,
        scope: &EnrollmentScope,
    ) -> Result<Vec<ClassroomOccupancy>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.occupancy_in_scope(scope))
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn enroll_with_allocation(
        &self,
        student: &NewStudent,
        allocator: &SeatAllocator,
    ) -> Result<BindOutcome, StoreError> {
        self.enroll_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let delay_ms = self.enroll_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
        }

        if self.take_conflict() {
            return Err(StoreError::Conflict("injected lock timeout".to_string()));
        }

        let mut state = self.state.lock().await;
        let candidates = state.occupancy_in_scope(&student.scope);
        let Some(choice) = allocator.select(&candidates) else {
            return Ok(BindOutcome::Exhausted);
        };
        let classroom_id = choice.classroom_id;

        // Let other tasks run while the critical section is held.
        tokio::task::yield_now().await;

        let now = Utc::now();
        let stored = Student {
            id: StudentId(state.next_id()),
            profile: student.profile.clone(),
            placement: Placement {
                site_id: student.scope.site_id,
                shift_id: student.scope.shift_id,
                process_id: student.scope.process_id,
                classroom_id,
            },
            photo: student.photo.clone(),
            created_at: now,
            updated_at: now,
        };
        state.students.insert(stored.id, stored.clone());
        Ok(BindOutcome::Bound(stored))
    }

    async fn find_student(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.students.get(&id).cloned())
    }

    async fn find_student_by_dni(&self, dni: &str) -> Result<Option<Student>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .students
            .values()
            .find(|s| s.profile.dni == dni)
            .cloned())
    }

    async fn update_profile(
        &self,
        id: StudentId,
        profile: &StudentProfile,
        photo: Option<&[u8]>,
    ) -> Result<Option<Student>, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(student) = state.students.get_mut(&id) else {
            return Ok(None);
        };
        student.profile = profile.clone();
        if let Some(photo) = photo {
            student.photo = Some(photo.to_vec());
        }
        student.updated_at = Utc::now();
        Ok(Some(student.clone()))
    }

    async fn delete_student(&self, id: StudentId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.students.remove(&id).is_some())
    }

    async fn list_students(&self) -> Result<Vec<StudentSummary>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .students
            .values()
            .map(StudentSummary::from)
            .collect())
    }

    async fn placement_names(
        &self,
        placement: &Placement,
    ) -> Result<Option<PlacementNames>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let site = state.sites.get(&placement.site_id);
        let shift = state.shifts.get(&placement.shift_id);
        let classroom = state.classrooms.get(&placement.classroom_id);
        Ok(match (site, shift, classroom) {
            (Some(site), Some(shift), Some(classroom)) => Some(PlacementNames {
                site: site.clone(),
                shift: shift.clone(),
                classroom: classroom.name.clone(),
            }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_occupancy_is_ordered() {
        let store = InMemoryEnrollmentStore::new();
        let scope = store.add_scope("S", "T", "P").await;
        let b = store.add_classroom(scope, "B", 5, 2).await;
        let a = store.add_classroom(scope, "A", 5, 1).await;

        let rows = store.classroom_occupancy(&scope).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.classroom_id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = InMemoryEnrollmentStore::new();
        store.fail_next_enrolls_with_conflict(2);
        assert!(store.take_conflict());
        assert!(store.take_conflict());
        assert!(!store.take_conflict());
    }
}
