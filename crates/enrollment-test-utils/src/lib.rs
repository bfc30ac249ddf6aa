//! # Enrollment Test Utilities
//!
//! Shared test utilities for the enrollment service.
//!
//! This crate provides:
//! - `InMemoryEnrollmentStore` - `EnrollmentStore` with fault injection
//! - `MockRenderer` - `DocumentRenderer` that records its calls
//! - Fixtures for profiles, scopes and photos
//!
//! ## Usage
//!
//! ```rust,ignore
//! use enrollment_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = Arc::new(InMemoryEnrollmentStore::new());
//!     let scope = store.add_scope("NORTH", "MORNING", "2026").await;
//!     store.add_classroom(scope, "A", 10, 1).await;
//!
//!     let coordinator = EnrollmentCoordinator::new(store.clone(), Arc::new(MockRenderer::succeeding()));
//!     let receipt = coordinator.enroll(request(scope, "1001"), None).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod memory_store;
pub mod mock_renderer;

pub use fixtures::*;
pub use memory_store::*;
pub use mock_renderer::*;
