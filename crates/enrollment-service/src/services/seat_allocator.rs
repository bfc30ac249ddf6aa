//! Seat allocator.
//!
//! Picks one classroom with free capacity from a scope's occupancy snapshot.
//!
//! # Ordering
//!
//! 1. `priority` ascending (lower wins)
//! 2. free seats descending, spreading load across equal-priority rooms
//! 3. classroom id ascending, so equal rows always resolve the same way
//!
//! The allocator has no side effects. Seats are consumed only when the store
//! inserts the student, and the store calls `select` inside the same critical
//! section as that insert.

use crate::models::{ClassroomOccupancy, ClassroomRef, EnrollmentScope};
use crate::repositories::{CapacitySource, StoreError};
use std::cmp::Ordering;
use tracing::instrument;

/// Result of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Assigned(ClassroomRef),
    /// Every classroom of the scope is full (or the scope has none).
    Exhausted,
}

/// Stateless classroom selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeatAllocator;

impl SeatAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Best classroom with room among `candidates`, if any.
    pub fn select<'a>(&self, candidates: &'a [ClassroomOccupancy]) -> Option<&'a ClassroomOccupancy> {
        candidates
            .iter()
            .filter(|classroom| classroom.has_room())
            .min_by(|a, b| preference(a, b))
    }

    /// Read a fresh occupancy snapshot for `scope` and pick from it.
    ///
    /// Nothing is reserved: a concurrent enrollment may take the seat before
    /// the caller acts on the answer.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn allocate<S: CapacitySource + ?Sized>(
        &self,
        source: &S,
        scope: &EnrollmentScope,
    ) -> Result<Allocation, StoreError> {
        let candidates = source.classroom_occupancy(scope).await?;
        Ok(match self.select(&candidates) {
            Some(classroom) => Allocation::Assigned(ClassroomRef {
                classroom_id: classroom.classroom_id,
                name: classroom.name.clone(),
            }),
            None => Allocation::Exhausted,
        })
    }
}

fn preference(a: &ClassroomOccupancy, b: &ClassroomOccupancy) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.free_seats().cmp(&a.free_seats()))
        .then_with(|| a.classroom_id.cmp(&b.classroom_id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ClassroomId;

    fn classroom(id: i64, priority: i32, capacity: i32, occupancy: i64) -> ClassroomOccupancy {
        ClassroomOccupancy {
            classroom_id: ClassroomId(id),
            name: format!("ROOM-{}", id),
            priority,
            capacity,
            occupancy,
        }
    }

    #[test]
    fn test_select_prefers_lower_priority() {
        let candidates = vec![classroom(1, 2, 30, 0), classroom(2, 1, 30, 29)];
        let chosen = SeatAllocator::new().select(&candidates).unwrap();
        assert_eq!(chosen.classroom_id, ClassroomId(2));
    }

    #[test]
    fn test_select_breaks_ties_by_free_seats() {
        // Free seats 3 and 5 at the same priority
        let candidates = vec![classroom(1, 1, 10, 7), classroom(2, 1, 10, 5)];
        let chosen = SeatAllocator::new().select(&candidates).unwrap();
        assert_eq!(chosen.classroom_id, ClassroomId(2));
    }

    #[test]
    fn test_select_skips_full_classrooms() {
        // A(prio 1, cap 2, occ 2), B(prio 1, cap 2, occ 1), C(prio 2, cap 5, occ 0)
        let candidates = vec![
            classroom(1, 1, 2, 2),
            classroom(2, 1, 2, 1),
            classroom(3, 2, 5, 0),
        ];
        let chosen = SeatAllocator::new().select(&candidates).unwrap();
        assert_eq!(chosen.classroom_id, ClassroomId(2));
    }

    #[test]
    fn test_select_falls_back_when_preferred_is_full() {
        let candidates = vec![classroom(1, 1, 2, 2), classroom(2, 2, 5, 4)];
        let chosen = SeatAllocator::new().select(&candidates).unwrap();
        assert_eq!(chosen.classroom_id, ClassroomId(2));
    }

    #[test]
    fn test_select_exhausted() {
        let candidates = vec![classroom(1, 1, 2, 2), classroom(2, 2, 1, 1)];
        assert!(SeatAllocator::new().select(&candidates).is_none());
        assert!(SeatAllocator::new().select(&[]).is_none());
    }

    #[test]
    fn test_select_ignores_overfull_rows() {
        let candidates = vec![classroom(1, 0, 2, 3), classroom(2, 1, 2, 0)];
        let chosen = SeatAllocator::new().select(&candidates).unwrap();
        assert_eq!(chosen.classroom_id, ClassroomId(2));
    }

    #[test]
    fn test_select_is_deterministic_on_full_ties() {
        let forward = vec![classroom(4, 1, 5, 0), classroom(3, 1, 5, 0)];
        let backward = vec![classroom(3, 1, 5, 0), classroom(4, 1, 5, 0)];
        let allocator = SeatAllocator::new();
        assert_eq!(
            allocator.select(&forward).unwrap().classroom_id,
            ClassroomId(3)
        );
        assert_eq!(
            allocator.select(&backward).unwrap().classroom_id,
            ClassroomId(3)
        );
    }
}
