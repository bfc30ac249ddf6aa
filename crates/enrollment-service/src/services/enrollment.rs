//! Enrollment coordinator.
//!
//! Orchestrates the enrollment flow:
//! 1. Validate and normalize the request (no store access on bad input)
//! 2. Allocate a classroom and persist the student as one store operation
//! 3. Retry transient store conflicts a bounded number of times
//! 4. Resolve display names and render the confirmation document
//!
//! Rendering happens after the seat is committed. A render failure is
//! reported as `DocumentRender` and never releases the seat; the document can
//! be regenerated later with `render_existing_document`.
//!
//! Every store call is bounded by `AllocationPolicy::store_call_timeout`.
//! Dropping an `enroll` future before the store commits consumes no seat.

use crate::config::{Config, DEFAULT_MAX_PHOTO_BYTES};
use crate::errors::EnrollmentError;
use crate::models::{
    normalize_text, ConfirmationFacts, Document, EnrollmentScope, NewStudent, Placement,
    Student, StudentId, StudentProfile, StudentSummary,
};
use crate::observability::metrics::{
    record_allocation_attempt, record_document_render, record_operation,
};
use crate::repositories::{BindOutcome, EnrollmentStore, StoreError};
use crate::services::document::{DocumentRenderer, RenderError};
use crate::services::seat_allocator::{Allocation, SeatAllocator};
use base64::Engine;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Longest accepted free-text field, in characters.
pub const MAX_TEXT_FIELD_CHARS: usize = 255;

/// Bounds on how hard an enrollment fights for a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPolicy {
    /// Allocate-and-persist attempts before surfacing `AllocationConflict`.
    pub max_attempts: u32,
    /// Attempt `n` sleeps `n * retry_backoff` before the next one.
    pub retry_backoff: Duration,
    /// Timeout around every store call.
    pub store_call_timeout: Duration,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            store_call_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for AllocationPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.allocation_max_attempts,
            retry_backoff: config.allocation_retry_backoff,
            store_call_timeout: config.store_call_timeout,
        }
    }
}

/// Photo as sent by clients: base64, optionally wrapped in a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPayload(pub String);

impl PhotoPayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Decoded bytes; `None` for a blank payload.
    ///
    /// Photos larger than `max_bytes` are rejected; the size is checked on the
    /// encoded length before decoding and again on the decoded bytes.
    pub fn decode(&self, max_bytes: usize) -> Result<Option<Vec<u8>>, EnrollmentError> {
        let trimmed = self.0.trim();
        let encoded = match trimmed.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => trimmed,
        };
        if encoded.is_empty() {
            return Ok(None);
        }

        let too_large = |size: usize| {
            EnrollmentError::Validation(format!(
                "photo must be at most {} bytes, got {}",
                max_bytes, size
            ))
        };

        // Every 4 base64 characters carry at most 3 bytes.
        let decoded_lower_bound = (encoded.len() / 4).saturating_mul(3).saturating_sub(2);
        if decoded_lower_bound > max_bytes {
            return Err(too_large(decoded_lower_bound));
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| EnrollmentError::Validation(format!("photo is not valid base64: {}", e)))?;
        if bytes.len() > max_bytes {
            return Err(too_large(bytes.len()));
        }
        Ok(Some(bytes))
    }
}

/// A new registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub profile: StudentProfile,
    pub scope: EnrollmentScope,
}

/// Fields a profile update may change. There are no placement fields, so an
/// update can never move a student.
pub type ProfileUpdate = StudentProfile;

/// Result of a successful enroll or profile update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentReceipt {
    pub student_id: StudentId,
    pub placement: Placement,
    pub document: Document,
}

/// Why a document could not be produced for a stored student.
#[derive(Debug)]
enum RenderFailure {
    Store(StoreError),
    MissingNames,
    Renderer(RenderError),
}

impl RenderFailure {
    fn reason(&self) -> String {
        match self {
            RenderFailure::Store(err) => err.to_string(),
            RenderFailure::MissingNames => {
                "site, shift or classroom no longer resolvable".to_string()
            }
            RenderFailure::Renderer(err) => err.to_string(),
        }
    }
}

/// Coordinates allocation, persistence and document rendering.
pub struct EnrollmentCoordinator {
    store: Arc<dyn EnrollmentStore>,
    renderer: Arc<dyn DocumentRenderer>,
    allocator: SeatAllocator,
    policy: AllocationPolicy,
    max_photo_bytes: usize,
}

impl EnrollmentCoordinator {
    pub fn new(store: Arc<dyn EnrollmentStore>, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self {
            store,
            renderer,
            allocator: SeatAllocator::new(),
            policy: AllocationPolicy::default(),
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
        }
    }

    /// Build a coordinator with the policy and photo limit from `config`.
    pub fn from_config(
        store: Arc<dyn EnrollmentStore>,
        renderer: Arc<dyn DocumentRenderer>,
        config: &Config,
    ) -> Self {
        Self::new(store, renderer)
            .with_policy(AllocationPolicy::from(config))
            .with_max_photo_bytes(config.max_photo_bytes)
    }

    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Largest decoded photo accepted by `enroll` and `update_profile`.
    pub fn with_max_photo_bytes(mut self, max_photo_bytes: usize) -> Self {
        self.max_photo_bytes = max_photo_bytes;
        self
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// Enroll a student into the best classroom of the requested scope.
    ///
    /// # Errors
    ///
    /// - `Validation` - malformed input, nothing was read or written
    /// - `NoSeatsAvailable` - every classroom of the scope is full
    /// - `AllocationConflict` - contention outlasted the retry bound
    /// - `DocumentRender` - the student is enrolled but has no document yet
    /// - `StoreUnavailable` - store failure or timeout
    #[instrument(skip_all, fields(scope = %request.scope))]
    pub async fn enroll(
        &self,
        request: EnrollmentRequest,
        photo: Option<PhotoPayload>,
    ) -> Result<EnrollmentReceipt, EnrollmentError> {
        let start = Instant::now();
        let result = self.enroll_inner(request, photo).await;
        record_operation("enroll", result.as_ref().map(|_| ()), start.elapsed());
        result
    }

    async fn enroll_inner(
        &self,
        request: EnrollmentRequest,
        photo: Option<PhotoPayload>,
    ) -> Result<EnrollmentReceipt, EnrollmentError> {
        validate_profile(&request.profile)?;
        validate_scope(&request.scope)?;
        let photo = decode_photo(photo.as_ref(), self.max_photo_bytes)?;

        let new_student = NewStudent {
            profile: request.profile.normalized(),
            scope: request.scope,
            photo,
        };

        let student = self.bind_with_retries(&new_student).await?;

        info!(
            target: "enrollment.service.coordinator",
            student_id = %student.id,
            classroom_id = %student.placement.classroom_id,
            "Student enrolled"
        );

        let document = self
            .render_for(&student)
            .await
            .map_err(|failure| EnrollmentError::DocumentRender {
                student_id: student.id,
                reason: failure.reason(),
            })?;

        Ok(EnrollmentReceipt {
            student_id: student.id,
            placement: student.placement,
            document,
        })
    }

    /// Run allocate-and-persist, retrying transient conflicts.
    async fn bind_with_retries(&self, student: &NewStudent) -> Result<Student, EnrollmentError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = self
                .call_store(self.store.enroll_with_allocation(student, &self.allocator))
                .await;

            match outcome {
                Ok(BindOutcome::Bound(stored)) => {
                    record_allocation_attempt("bound");
                    return Ok(stored);
                }
                Ok(BindOutcome::Exhausted) => {
                    record_allocation_attempt("exhausted");
                    info!(
                        target: "enrollment.service.coordinator",
                        scope = %student.scope,
                        "No seats available"
                    );
                    return Err(EnrollmentError::NoSeatsAvailable);
                }
                Err(StoreError::Conflict(reason)) => {
                    record_allocation_attempt("conflict");
                    warn!(
                        target: "enrollment.service.coordinator",
                        scope = %student.scope,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        reason = %reason,
                        "Allocation conflict"
                    );
                    if attempt < max_attempts {
                        let backoff = self.policy.retry_backoff.saturating_mul(attempt);
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(err) => {
                    record_allocation_attempt("error");
                    return Err(err.into());
                }
            }
        }

        Err(EnrollmentError::AllocationConflict)
    }

    /// Update a student's profile and re-render the document from the stored
    /// state. The placement is never changed; a `None` photo keeps the stored
    /// one.
    #[instrument(skip_all, fields(student_id = %id))]
    pub async fn update_profile(
        &self,
        id: StudentId,
        profile: ProfileUpdate,
        photo: Option<PhotoPayload>,
    ) -> Result<EnrollmentReceipt, EnrollmentError> {
        let start = Instant::now();
        let result = self.update_profile_inner(id, profile, photo).await;
        record_operation(
            "update_profile",
            result.as_ref().map(|_| ()),
            start.elapsed(),
        );
        result
    }

    async fn update_profile_inner(
        &self,
        id: StudentId,
        profile: ProfileUpdate,
        photo: Option<PhotoPayload>,
    ) -> Result<EnrollmentReceipt, EnrollmentError> {
        validate_profile(&profile)?;
        let photo = decode_photo(photo.as_ref(), self.max_photo_bytes)?;
        let profile = profile.normalized();

        let student = self
            .call_store(self.store.update_profile(id, &profile, photo.as_deref()))
            .await?
            .ok_or_else(|| EnrollmentError::NotFound(format!("student {}", id)))?;

        info!(
            target: "enrollment.service.coordinator",
            student_id = %student.id,
            photo_replaced = photo.is_some(),
            "Student profile updated"
        );

        let document = self
            .render_for(&student)
            .await
            .map_err(|failure| EnrollmentError::DocumentRender {
                student_id: student.id,
                reason: failure.reason(),
            })?;

        Ok(EnrollmentReceipt {
            student_id: student.id,
            placement: student.placement,
            document,
        })
    }

    /// Regenerate the confirmation document of the student with this dni.
    ///
    /// # Errors
    ///
    /// - `NotFound` - no student has this dni
    /// - `NoPhoto` - the student exists but has no stored photo
    #[instrument(skip_all)]
    pub async fn render_existing_document(&self, dni: &str) -> Result<Document, EnrollmentError> {
        let start = Instant::now();
        let result = self.render_existing_inner(dni).await;
        record_operation(
            "render_existing_document",
            result.as_ref().map(|_| ()),
            start.elapsed(),
        );
        result
    }

    async fn render_existing_inner(&self, dni: &str) -> Result<Document, EnrollmentError> {
        let dni = normalize_text(dni);
        if dni.is_empty() {
            return Err(EnrollmentError::Validation("dni is required".to_string()));
        }

        let student = self
            .call_store(self.store.find_student_by_dni(&dni))
            .await?
            .ok_or_else(|| EnrollmentError::NotFound("student with this dni".to_string()))?;

        if student.photo.is_none() {
            return Err(EnrollmentError::NoPhoto);
        }

        self.render_for(&student)
            .await
            .map_err(|failure| match failure {
                RenderFailure::Store(err) => err.into(),
                other => EnrollmentError::DocumentRender {
                    student_id: student.id,
                    reason: other.reason(),
                },
            })
    }

    /// Delete a student, freeing its seat for the next allocation.
    #[instrument(skip_all, fields(student_id = %id))]
    pub async fn remove(&self, id: StudentId) -> Result<(), EnrollmentError> {
        let start = Instant::now();
        let result = match self.call_store(self.store.delete_student(id)).await {
            Ok(true) => {
                info!(target: "enrollment.service.coordinator", student_id = %id, "Student removed");
                Ok(())
            }
            Ok(false) => Err(EnrollmentError::NotFound(format!("student {}", id))),
            Err(err) => Err(err.into()),
        };
        record_operation("remove", result.as_ref().map(|_| ()), start.elapsed());
        result
    }

    /// Plain projection of every student.
    #[instrument(skip_all)]
    pub async fn list_students(&self) -> Result<Vec<StudentSummary>, EnrollmentError> {
        Ok(self.call_store(self.store.list_students()).await?)
    }

    /// Which classroom an enrollment would get right now. Reserves nothing.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn preview_allocation(
        &self,
        scope: &EnrollmentScope,
    ) -> Result<Allocation, EnrollmentError> {
        validate_scope(scope)?;
        Ok(self
            .call_store(self.allocator.allocate(self.store.as_ref(), scope))
            .await?)
    }

    async fn render_for(&self, student: &Student) -> Result<Document, RenderFailure> {
        let names = self
            .call_store(self.store.placement_names(&student.placement))
            .await
            .map_err(RenderFailure::Store)?
            .ok_or(RenderFailure::MissingNames)?;

        let facts = ConfirmationFacts::new(&student.profile, names);
        match self.renderer.render(&facts, student.photo.as_deref()) {
            Ok(document) => {
                record_document_render("success");
                Ok(document)
            }
            Err(err) => {
                record_document_render("error");
                warn!(
                    target: "enrollment.service.coordinator",
                    student_id = %student.id,
                    error = %err,
                    "Document rendering failed"
                );
                Err(RenderFailure::Renderer(err))
            }
        }
    }

    /// Bound a store call by the policy timeout.
    async fn call_store<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.policy.store_call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    target: "enrollment.service.coordinator",
                    timeout_ms = self.policy.store_call_timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    }
}

fn decode_photo(
    photo: Option<&PhotoPayload>,
    max_bytes: usize,
) -> Result<Option<Vec<u8>>, EnrollmentError> {
    match photo {
        Some(payload) => payload.decode(max_bytes),
        None => Ok(None),
    }
}

fn validate_profile(profile: &StudentProfile) -> Result<(), EnrollmentError> {
    let required = [
        ("name", &profile.name),
        ("last_name", &profile.last_name),
        ("dni", &profile.dni),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(EnrollmentError::Validation(format!("{} is required", field)));
        }
    }

    let text_fields = [
        ("name", &profile.name),
        ("last_name", &profile.last_name),
        ("dni", &profile.dni),
        ("phone", &profile.phone),
        ("record_number", &profile.record_number),
    ];
    for (field, value) in text_fields {
        if value.chars().count() > MAX_TEXT_FIELD_CHARS {
            return Err(EnrollmentError::Validation(format!(
                "{} must be at most {} characters",
                field, MAX_TEXT_FIELD_CHARS
            )));
        }
    }

    if profile.payment_plan_id.0 <= 0 {
        return Err(EnrollmentError::Validation(
            "payment_plan_id must be positive".to_string(),
        ));
    }

    Ok(())
}

fn validate_scope(scope: &EnrollmentScope) -> Result<(), EnrollmentError> {
    if scope.site_id.0 <= 0 || scope.shift_id.0 <= 0 || scope.process_id.0 <= 0 {
        return Err(EnrollmentError::Validation(
            "site, shift and process ids must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::models::{PaymentPlanId, ProcessId, ShiftId, SiteId};
    use chrono::NaiveDate;

    fn profile() -> StudentProfile {
        StudentProfile {
            name: "ana".to_string(),
            last_name: "pérez".to_string(),
            dni: "123".to_string(),
            phone: String::new(),
            record_number: String::new(),
            enrolled_on: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            payment_plan_id: PaymentPlanId(1),
            need_to_pay: false,
        }
    }

    #[test]
    fn test_photo_payload_plain_base64() {
        let photo = PhotoPayload::new("aGVsbG8=").decode(DEFAULT_MAX_PHOTO_BYTES).unwrap();
        assert_eq!(photo, Some(b"hello".to_vec()));
    }

    #[test]
    fn test_photo_payload_data_url() {
        let photo = PhotoPayload::new("data:image/png;base64,aGVsbG8=")
            .decode(DEFAULT_MAX_PHOTO_BYTES)
            .unwrap();
        assert_eq!(photo, Some(b"hello".to_vec()));
    }

    #[test]
    fn test_photo_payload_blank_is_none() {
        assert_eq!(PhotoPayload::new("   ").decode(DEFAULT_MAX_PHOTO_BYTES).unwrap(), None);
        assert_eq!(
            PhotoPayload::new("data:image/png;base64,").decode(DEFAULT_MAX_PHOTO_BYTES).unwrap(),
            None
        );
    }

    #[test]
    fn test_photo_payload_invalid() {
        let result = PhotoPayload::new("not base64!!").decode(DEFAULT_MAX_PHOTO_BYTES);
        assert!(matches!(result, Err(EnrollmentError::Validation(_))));
    }

    #[test]
    fn test_photo_payload_size_limit() {
        // "aGVsbG8=" decodes to 5 bytes
        assert_eq!(
            PhotoPayload::new("aGVsbG8=").decode(5).unwrap(),
            Some(b"hello".to_vec())
        );
        match PhotoPayload::new("aGVsbG8=").decode(4) {
            Err(EnrollmentError::Validation(msg)) => assert!(msg.contains("at most 4 bytes")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_photo_payload_rejects_oversized_before_decoding() {
        let encoded = "A".repeat(4 * 1024);
        match PhotoPayload::new(encoded).decode(1024) {
            Err(EnrollmentError::Validation(msg)) => assert!(msg.contains("at most 1024 bytes")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_profile_requires_names_and_dni() {
        assert!(validate_profile(&profile()).is_ok());

        for blank in ["name", "last_name", "dni"] {
            let mut p = profile();
            match blank {
                "name" => p.name = "  ".to_string(),
                "last_name" => p.last_name = String::new(),
                _ => p.dni = "\t".to_string(),
            }
            match validate_profile(&p) {
                Err(EnrollmentError::Validation(msg)) => assert!(msg.starts_with(blank)),
                other => panic!("expected validation error for {}, got {:?}", blank, other),
            }
        }
    }

    #[test]
    fn test_validate_profile_rejects_long_fields() {
        let mut p = profile();
        p.phone = "9".repeat(MAX_TEXT_FIELD_CHARS + 1);
        assert!(matches!(
            validate_profile(&p),
            Err(EnrollmentError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_profile_rejects_bad_payment_plan() {
        let mut p = profile();
        p.payment_plan_id = PaymentPlanId(0);
        assert!(matches!(
            validate_profile(&p),
            Err(EnrollmentError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_scope() {
        let scope = EnrollmentScope {
            site_id: SiteId(1),
            shift_id: ShiftId(1),
            process_id: ProcessId(1),
        };
        assert!(validate_scope(&scope).is_ok());
        assert!(validate_scope(&EnrollmentScope {
            shift_id: ShiftId(-4),
            ..scope
        })
        .is_err());
    }

    #[test]
    fn test_policy_from_config() {
        let vars = std::collections::HashMap::from([
            ("DATABASE_URL".to_string(), "postgresql://localhost/x".to_string()),
            ("ALLOCATION_MAX_ATTEMPTS".to_string(), "4".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();
        let policy = AllocationPolicy::from(&config);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.retry_backoff, config.allocation_retry_backoff);
        assert_eq!(policy.store_call_timeout, config.store_call_timeout);
    }

    #[test]
    fn test_backoff_step_never_overflows() {
        let policy = AllocationPolicy {
            retry_backoff: Duration::MAX,
            ..AllocationPolicy::default()
        };
        assert_eq!(policy.retry_backoff.saturating_mul(3), Duration::MAX);
    }
}
