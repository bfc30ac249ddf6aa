//! Service layer for the enrollment service.
//!
//! # Components
//!
//! - `seat_allocator` - Pure classroom selection from an occupancy snapshot
//! - `document` - Confirmation document rendering
//! - `enrollment` - Coordinator tying allocation, persistence and rendering

pub mod document;
pub mod enrollment;
pub mod seat_allocator;

pub use document::{ConfirmationSheetRenderer, DocumentRenderer, RenderError};
pub use enrollment::{
    AllocationPolicy, EnrollmentCoordinator, EnrollmentReceipt, EnrollmentRequest, PhotoPayload,
    ProfileUpdate,
};
pub use seat_allocator::{Allocation, SeatAllocator};
