//! §4.1 — Section parser: turns an HTML or DOCX source document into a
//! `ParsedDocument` of clearance-tagged sections.

mod docx;
mod html;

pub use docx::parse_docx;
pub use html::parse_html;

use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagKind {
    Block,
    Inline,
    Section,
}

/// Tags classified as inline content per §4.1.
pub const INLINE_TAGS: &[&str] = &["span", "a", "strong", "em", "b", "i", "code", "mark"];

pub fn classify_tag(tag_name: &str) -> TagKind {
    if INLINE_TAGS.contains(&tag_name.to_ascii_lowercase().as_str()) {
        TagKind::Inline
    } else {
        TagKind::Block
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub section_id: String,
    pub clearance: Tier,
    pub title: String,
    pub tag_name: TagKind,
    pub text_length: usize,
    pub content_hash: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMetadata {
    pub title: String,
    pub doc_type: String,
    pub author: Option<String>,
    pub created_date: Option<String>,
    pub department: Option<String>,
    pub overall_classification: Tier,
    pub section_count: usize,
    pub source_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub metadata: DocMetadata,
    pub sections: Vec<Section>,
}

/// First 16 hex characters of SHA-256(content).
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// Assigns deterministic `sec-NNN` ids to sections lacking a stable id,
/// in encounter order, so output is byte-identical across runs for a
/// fixed input.
pub(crate) struct SectionIdAllocator {
    next: usize,
}

impl SectionIdAllocator {
    pub fn starting_at(next: usize) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("sec-{:03}", self.next);
        self.next += 1;
        id
    }
}

pub(crate) fn finalize(sections: Vec<Section>, doc_type: &str, title: String, source_format: &str) -> ParsedDocument {
    let overall_classification = sections
        .iter()
        .map(|s| s.clearance)
        .fold(Tier::Internal, Tier::max);

    // Order is whatever the parser built (residual leading section first,
    // then document order) — already deterministic for a fixed input, so
    // no further reordering here.
    let section_count = sections.len();
    ParsedDocument {
        metadata: DocMetadata {
            title,
            doc_type: doc_type.to_string(),
            author: None,
            created_date: None,
            department: None,
            overall_classification,
            section_count,
            source_format: source_format.to_string(),
        },
        sections,
    }
}
