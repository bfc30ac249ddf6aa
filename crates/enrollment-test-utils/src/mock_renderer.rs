//! Mock `DocumentRenderer` for coordinator tests.

use enrollment_service::models::{ConfirmationFacts, Document};
use enrollment_service::services::{DocumentRenderer, RenderError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Content type of documents produced by a succeeding `MockRenderer`.
pub const MOCK_CONTENT_TYPE: &str = "application/x-test-confirmation";

/// Renderer that records every call and either succeeds or always fails.
///
/// A successful document's bytes are `"{dni}|{site}|{shift}|{classroom}|{photo_len}"`.
#[derive(Debug)]
pub struct MockRenderer {
    fail: bool,
    call_count: AtomicUsize,
    last_facts: Mutex<Option<ConfirmationFacts>>,
}

impl MockRenderer {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            call_count: AtomicUsize::new(0),
            last_facts: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding()
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_facts(&self) -> Option<ConfirmationFacts> {
        self.last_facts.lock().unwrap().clone()
    }
}

impl DocumentRenderer for MockRenderer {
    fn render(
        &self,
        facts: &ConfirmationFacts,
        photo: Option<&[u8]>,
    ) -> Result<Document, RenderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_facts.lock().unwrap() = Some(facts.clone());

        if self.fail {
            return Err(RenderError::Failed("mock renderer failure".to_string()));
        }

        let text = format!(
            "{}|{}|{}|{}|{}",
            facts.dni,
            facts.site,
            facts.shift,
            facts.classroom,
            photo.map_or(0, <[u8]>::len)
        );
        Ok(Document {
            content_type: MOCK_CONTENT_TYPE.to_string(),
            bytes: text.into_bytes(),
        })
    }
}
