//! Enrollment Service Library
//!
//! Registers students into a (site, shift, process) scope and binds each one
//! to a classroom with free capacity:
//!
//! - Priority-ordered seat allocation with load spreading
//! - Atomic allocate-and-persist, safe under concurrent enrollments
//! - Confirmation document rendering and regeneration
//! - Student profile maintenance and removal
//!
//! # Architecture
//!
//! ```text
//! services/enrollment.rs -> services/seat_allocator.rs
//!                        -> repositories/*.rs (EnrollmentStore)
//!                        -> services/document.rs (DocumentRenderer)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `models` - Data models
//! - `observability` - Tracing setup and metrics
//! - `repositories` - Store trait and PostgreSQL implementation
//! - `services` - Allocation, rendering and coordination

pub mod config;
pub mod errors;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
