//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Characters of chunk text shown in a citation preview.
pub const PREVIEW_CHARS: usize = 200;

/// A document fragment with its embedding and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique, stable identifier
    pub id: String,

    /// Fragment text as extracted from the document
    pub text: String,

    /// Embedding vector
    pub embedding: Vec<f32>,

    /// Document the fragment came from (file name or URL)
    pub source_document: String,

    /// Document category (e.g., "fees", "calendar", "policies")
    pub category: String,

    /// Page number or section heading, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_or_section: Option<String>,

    /// Position of the fragment within its document
    pub sequence_index: u32,

    /// OCR confidence in [0, 1] for scanned sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
}

impl Chunk {
    /// Derive the id of a fragment from its document and position.
    ///
    /// Re-indexing the same document produces the same ids, so upserts
    /// replace fragments instead of duplicating them.
    pub fn stable_id(source_document: &str, sequence_index: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_document.as_bytes());
        hasher.update([0u8]);
        hasher.update(sequence_index.to_le_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Text preview used in citations.
    pub fn preview(&self) -> String {
        if self.text.chars().count() > PREVIEW_CHARS {
            let head: String = self.text.chars().take(PREVIEW_CHARS).collect();
            format!("{}...", head)
        } else {
            self.text.clone()
        }
    }
}

/// A chunk as delivered by the ingestion side (one JSON object per line).
///
/// `id` and `embedding` may be omitted; the engine derives the id with
/// [`Chunk::stable_id`] and computes the embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub source_document: String,
    pub category: String,
    #[serde(default)]
    pub page_or_section: Option<String>,
    #[serde(default)]
    pub sequence_index: u32,
    #[serde(default)]
    pub ocr_confidence: Option<f32>,
}

impl ChunkRecord {
    /// Convert into a chunk with the given embedding.
    pub fn into_chunk(self, embedding: Vec<f32>) -> Chunk {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Chunk::stable_id(&self.source_document, self.sequence_index));
        Chunk {
            id,
            text: self.text,
            embedding,
            source_document: self.source_document,
            category: self.category,
            page_or_section: self.page_or_section,
            sequence_index: self.sequence_index,
            ocr_confidence: self.ocr_confidence,
        }
    }
}

/// Metadata filter: a conjunction of exact, case-insensitive matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source_document: Option<String>,
}

impl ChunkFilter {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            source_document: None,
        }
    }

    pub fn source_document(source_document: impl Into<String>) -> Self {
        Self {
            category: None,
            source_document: Some(source_document.into()),
        }
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        let category_ok = self
            .category
            .as_ref()
            .map_or(true, |c| c.eq_ignore_ascii_case(&chunk.category));
        let source_ok = self
            .source_document
            .as_ref()
            .map_or(true, |s| s.eq_ignore_ascii_case(&chunk.source_document));
        category_ok && source_ok
    }
}

/// Per-document statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source_document: String,
    pub category: String,
    pub chunk_count: usize,

    /// Most recent write of any of the document's chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
}

/// A chunk considered for an answer, with the scores that ranked it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub fused_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl RetrievalCandidate {
    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }
}

/// Question classes the router distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    PolicySearch,
    FeeLookup,
    CalendarLookup,
    PolicySummary,
    PolicyComparison,
    GeneralRag,
}

impl IntentKind {
    pub const ALL: [IntentKind; 6] = [
        IntentKind::PolicySearch,
        IntentKind::FeeLookup,
        IntentKind::CalendarLookup,
        IntentKind::PolicySummary,
        IntentKind::PolicyComparison,
        IntentKind::GeneralRag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::PolicySearch => "policy_search",
            IntentKind::FeeLookup => "fee_lookup",
            IntentKind::CalendarLookup => "calendar_lookup",
            IntentKind::PolicySummary => "policy_summary",
            IntentKind::PolicyComparison => "policy_comparison",
            IntentKind::GeneralRag => "general_rag",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted intent parameters, ordered by name.
pub type Parameters = BTreeMap<String, String>;

/// A classified question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Intent {
    pub fn new(kind: IntentKind) -> Self {
        Self {
            kind,
            parameters: Parameters::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn general() -> Self {
        Self::new(IntentKind::GeneralRag)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// A source reference attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,

    /// 1-based position of the chunk in the context given to the model
    pub rank: usize,

    pub source_document: String,
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_or_section: Option<String>,

    pub text_preview: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
}

/// How a citation is rendered for people.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CitationStyle {
    #[default]
    Standard,
    Mla,
    Apa,
}

impl Citation {
    pub fn from_chunk(chunk: &Chunk, rank: usize) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            rank,
            source_document: chunk.source_document.clone(),
            category: chunk.category.clone(),
            page_or_section: chunk.page_or_section.clone(),
            text_preview: chunk.preview(),
            ocr_confidence: chunk.ocr_confidence,
        }
    }

    pub fn format(&self, style: CitationStyle) -> String {
        let source = &self.source_document;
        match (style, &self.page_or_section) {
            (CitationStyle::Standard, Some(page)) => format!("According to {} ({})", source, page),
            (CitationStyle::Standard, None) => format!("According to {}", source),
            (CitationStyle::Mla, Some(page)) => format!("({} {})", source, page),
            (CitationStyle::Mla, None) => format!("({})", source),
            (CitationStyle::Apa, Some(page)) => format!("({}, {})", source, page),
            (CitationStyle::Apa, None) => format!("({})", source),
        }
    }
}

/// The result of answering one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub is_grounded: bool,
    pub used_function: bool,
    pub intent: IntentKind,
    #[serde(default)]
    pub parameters: Parameters,

    /// Number of chunks supplied to synthesis
    #[serde(default)]
    pub retrieved_count: usize,
}

/// One earlier exchange of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub question: String,
    pub answer: String,
}

/// Item of a streamed answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    /// Incremental answer text
    Token(String),
    /// Final answer, identical to the non-streaming result
    Completed(Answer),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: "c1".to_string(),
            text: text.to_string(),
            embedding: vec![],
            source_document: "Academic Calendar.pdf".to_string(),
            category: "Calendar".to_string(),
            page_or_section: Some("Page 2".to_string()),
            sequence_index: 0,
            ocr_confidence: None,
        }
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = Chunk::stable_id("fees.pdf", 3);
        assert_eq!(a, Chunk::stable_id("fees.pdf", 3));
        assert_ne!(a, Chunk::stable_id("fees.pdf", 4));
        assert_ne!(a, Chunk::stable_id("fees.pdf3", 0));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_record_without_id_gets_stable_id() {
        let record: ChunkRecord = serde_json::from_str(
            r#"{"text":"Tuition is due by July 1.","source_document":"fees.pdf","category":"fees","sequence_index":2}"#,
        )
        .unwrap();
        let chunk = record.into_chunk(vec![0.0; 3]);
        assert_eq!(chunk.id, Chunk::stable_id("fees.pdf", 2));
        assert!(chunk.page_or_section.is_none());
    }

    #[test]
    fn test_filter_is_case_insensitive_conjunction() {
        let c = chunk("text");
        assert!(ChunkFilter::category("calendar").matches(&c));
        assert!(ChunkFilter::default().matches(&c));
        let both = ChunkFilter {
            category: Some("calendar".to_string()),
            source_document: Some("other.pdf".to_string()),
        };
        assert!(!both.matches(&c));
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "a".repeat(250);
        let citation = Citation::from_chunk(&chunk(&long), 1);
        assert_eq!(citation.text_preview.len(), PREVIEW_CHARS + 3);
        assert!(citation.text_preview.ends_with("..."));

        let short = Citation::from_chunk(&chunk("Last day to drop: July 15"), 1);
        assert_eq!(short.text_preview, "Last day to drop: July 15");
    }

    #[test]
    fn test_citation_styles() {
        let citation = Citation::from_chunk(&chunk("x"), 1);
        assert_eq!(
            citation.format(CitationStyle::Standard),
            "According to Academic Calendar.pdf (Page 2)"
        );
        assert_eq!(citation.format(CitationStyle::Apa), "(Academic Calendar.pdf, Page 2)");
    }

    #[test]
    fn test_intent_kind_names() {
        assert_eq!(IntentKind::GeneralRag.to_string(), "general_rag");
        assert_eq!(
            serde_json::to_string(&IntentKind::PolicyComparison).unwrap(),
            "\"policy_comparison\""
        );
    }
}
