//! Request and payload fixtures.

use base64::Engine;
use chrono::NaiveDate;
use enrollment_service::models::{EnrollmentScope, PaymentPlanId, StudentProfile};
use enrollment_service::services::{EnrollmentRequest, PhotoPayload};

/// Raw bytes behind `photo_payload()`.
pub const PHOTO_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-photo";

/// Profile with lowercase, padded text so normalization is observable.
pub fn profile(dni: &str) -> StudentProfile {
    StudentProfile {
        name: " ana ".to_string(),
        last_name: "garcía".to_string(),
        dni: dni.to_string(),
        phone: "555-0100".to_string(),
        record_number: "r-1".to_string(),
        enrolled_on: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        payment_plan_id: PaymentPlanId(1),
        need_to_pay: true,
    }
}

pub fn request(scope: EnrollmentScope, dni: &str) -> EnrollmentRequest {
    EnrollmentRequest {
        profile: profile(dni),
        scope,
    }
}

/// `PHOTO_BYTES` as a `data:` URL.
pub fn photo_payload() -> PhotoPayload {
    photo_payload_of(PHOTO_BYTES)
}

pub fn photo_payload_of(bytes: &[u8]) -> PhotoPayload {
    PhotoPayload::new(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}
