//! Confirmation document rendering.
//!
//! The coordinator treats a renderer as a pure function of the facts and the
//! photo. `ConfirmationSheetRenderer` produces a plain UTF-8 sheet; the photo
//! is embedded base64-encoded, wrapped at 76 columns.

use crate::config::DEFAULT_MAX_PHOTO_BYTES;
use crate::models::{ConfirmationFacts, Document};
use base64::Engine;
use std::fmt::Write as _;
use thiserror::Error;

/// Content type of documents produced by `ConfirmationSheetRenderer`.
pub const SHEET_CONTENT_TYPE: &str = "text/plain; charset=utf-8";


const PHOTO_LINE_WIDTH: usize = 76;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("photo is {size} bytes, limit is {limit}")]
    PhotoTooLarge { size: usize, limit: usize },

    #[error("renderer failed: {0}")]
    Failed(String),
}

/// Turns confirmation facts into document bytes.
pub trait DocumentRenderer: Send + Sync {
    fn render(
        &self,
        facts: &ConfirmationFacts,
        photo: Option<&[u8]>,
    ) -> Result<Document, RenderError>;
}

/// Plain-text confirmation sheet.
#[derive(Debug, Clone)]
pub struct ConfirmationSheetRenderer {
    title: String,
    max_photo_bytes: usize,
}

impl Default for ConfirmationSheetRenderer {
    fn default() -> Self {
        Self {
            title: "ENROLLMENT CONFIRMATION".to_string(),
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
        }
    }
}

impl ConfirmationSheetRenderer {
    pub fn new(title: impl Into<String>, max_photo_bytes: usize) -> Self {
        Self {
            title: title.into(),
            max_photo_bytes,
        }
    }
}

impl DocumentRenderer for ConfirmationSheetRenderer {
    fn render(
        &self,
        facts: &ConfirmationFacts,
        photo: Option<&[u8]>,
    ) -> Result<Document, RenderError> {
        if let Some(photo) = photo {
            if photo.len() > self.max_photo_bytes {
                return Err(RenderError::PhotoTooLarge {
                    size: photo.len(),
                    limit: self.max_photo_bytes,
                });
            }
        }

        let mut sheet = String::new();
        let fields = [
            ("Name", facts.name.as_str()),
            ("Last name", facts.last_name.as_str()),
            ("DNI", facts.dni.as_str()),
            ("Phone", facts.phone.as_str()),
            ("Record number", facts.record_number.as_str()),
            ("Site", facts.site.as_str()),
            ("Shift", facts.shift.as_str()),
            ("Classroom", facts.classroom.as_str()),
        ];

        writeln!(sheet, "{}", self.title).map_err(|e| RenderError::Failed(e.to_string()))?;
        writeln!(sheet, "{}", "=".repeat(self.title.chars().count()))
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        for (label, value) in fields {
            writeln!(sheet, "{:<15}{}", format!("{}:", label), value)
                .map_err(|e| RenderError::Failed(e.to_string()))?;
        }

        match photo {
            Some(photo) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(photo);
                writeln!(sheet, "\nPhoto ({} bytes):", photo.len())
                    .map_err(|e| RenderError::Failed(e.to_string()))?;
                for line in encoded
                    .as_bytes()
                    .chunks(PHOTO_LINE_WIDTH)
                    .filter_map(|chunk| std::str::from_utf8(chunk).ok())
                {
                    sheet.push_str(line);
                    sheet.push('\n');
                }
            }
            None => sheet.push_str("\nPhoto: none\n"),
        }

        Ok(Document {
            content_type: SHEET_CONTENT_TYPE.to_string(),
            bytes: sheet.into_bytes(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn facts() -> ConfirmationFacts {
        ConfirmationFacts {
            name: "ANA".to_string(),
            last_name: "PÉREZ".to_string(),
            dni: "X1234567B".to_string(),
            phone: "555".to_string(),
            record_number: "R-9".to_string(),
            site: "NORTH CAMPUS".to_string(),
            shift: "MORNING".to_string(),
            classroom: "ROOM 101".to_string(),
        }
    }

    #[test]
    fn test_render_contains_facts() {
        let document = ConfirmationSheetRenderer::default()
            .render(&facts(), None)
            .unwrap();
        let text = String::from_utf8(document.bytes).unwrap();

        assert_eq!(document.content_type, SHEET_CONTENT_TYPE);
        assert!(text.starts_with("ENROLLMENT CONFIRMATION\n"));
        assert!(text.contains("DNI:           X1234567B"));
        assert!(text.contains("Site:          NORTH CAMPUS"));
        assert!(text.contains("Classroom:     ROOM 101"));
        assert!(text.contains("Photo: none"));
    }

    #[test]
    fn test_render_embeds_photo() {
        let document = ConfirmationSheetRenderer::default()
            .render(&facts(), Some(b"\x89PNG"))
            .unwrap();
        let text = String::from_utf8(document.bytes).unwrap();

        assert!(text.contains("Photo (4 bytes):"));
        assert!(text.contains("iVBORw=="));
    }

    #[test]
    fn test_render_wraps_photo_lines() {
        let photo = vec![0u8; 200];
        let document = ConfirmationSheetRenderer::default()
            .render(&facts(), Some(&photo))
            .unwrap();
        let text = String::from_utf8(document.bytes).unwrap();

        assert!(text.lines().all(|line| line.chars().count() <= 76));

        let encoded: String = text
            .split_once("Photo (200 bytes):\n")
            .map(|(_, rest)| rest.lines().collect())
            .unwrap();
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .unwrap(),
            photo
        );
    }

    #[test]
    fn test_render_rejects_oversized_photo() {
        let renderer = ConfirmationSheetRenderer::new("TEST", 8);
        let result = renderer.render(&facts(), Some(&[0u8; 9]));
        assert!(matches!(
            result,
            Err(RenderError::PhotoTooLarge { size: 9, limit: 8 })
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = ConfirmationSheetRenderer::default();
        let first = renderer.render(&facts(), Some(b"abc")).unwrap();
        let second = renderer.render(&facts(), Some(b"abc")).unwrap();
        assert_eq!(first, second);
    }
}
