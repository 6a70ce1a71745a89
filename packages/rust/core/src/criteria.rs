//! Criteria extraction from heterogeneous detail documents.
//!
//! Qualification and award criteria can sit at the top level, inside the
//! `criteria` block, or per lot. They can also be replaced by flags saying
//! the criteria live in the tender documents or a PDF, or by a free-text
//! note. Each signal is resolved by an ordered chain of named lookups.

use serde_json::Value;
use tracing::debug;

use tenderwatch_shared::{Criterion, MissingField, ProjectDetail, localized};

/// Which of the two criteria families to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaKind {
    Qualification,
    Award,
}

impl CriteriaKind {
    /// Key of the entries array.
    pub fn entries_key(self) -> &'static str {
        match self {
            Self::Qualification => "qualificationCriteria",
            Self::Award => "awardCriteria",
        }
    }

    fn in_documents_key(self) -> &'static str {
        match self {
            Self::Qualification => "qualificationCriteriaInDocuments",
            Self::Award => "awardCriteriaInDocuments",
        }
    }

    fn as_pdf_key(self) -> &'static str {
        match self {
            Self::Qualification => "qualificationCriteriaAsPDF",
            Self::Award => "awardCriteriaAsPDF",
        }
    }

    fn selection_key(self) -> &'static str {
        match self {
            Self::Qualification => "qualificationCriteriaSelection",
            Self::Award => "awardCriteriaSelection",
        }
    }

    fn note_key(self) -> &'static str {
        match self {
            Self::Qualification => "qualificationCriteriaNote",
            Self::Award => "awardCriteriaNote",
        }
    }

    /// German name used in prompts and notifications.
    pub fn label(self) -> &'static str {
        self.missing_field().label()
    }

    /// Missing-info entry reported when nothing is known.
    pub fn missing_field(self) -> MissingField {
        match self {
            Self::Qualification => MissingField::QualificationCriteria,
            Self::Award => MissingField::AwardCriteria,
        }
    }
}

/// The two "criteria live elsewhere" flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    InDocuments,
    AsPdf,
}

impl Flag {
    fn key(self, kind: CriteriaKind) -> &'static str {
        match self {
            Self::InDocuments => kind.in_documents_key(),
            Self::AsPdf => kind.as_pdf_key(),
        }
    }

    /// Value of the `…Selection` field that implies this flag.
    fn selection_value(self) -> &'static str {
        match self {
            Self::InDocuments => "criteria_in_documents",
            Self::AsPdf => "criteria_as_pdf",
        }
    }
}

/// Raw criteria signals read from a document, before any model summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedCriteria {
    pub entries: Vec<Criterion>,
    pub in_documents: Option<bool>,
    pub as_pdf: Option<bool>,
    /// Free-text note in the working language, trimmed.
    pub note: Option<String>,
}

/// Read every criteria signal of `kind` from `detail`.
pub fn extract(detail: &ProjectDetail, kind: CriteriaKind, lang: &str) -> ExtractedCriteria {
    ExtractedCriteria {
        entries: resolve_entries(detail, kind),
        in_documents: resolve_flag(detail, kind, Flag::InDocuments),
        as_pdf: resolve_flag(detail, kind, Flag::AsPdf),
        note: resolve_note(detail, kind, lang),
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

type EntriesLookup = fn(&ProjectDetail, CriteriaKind) -> Option<Vec<Criterion>>;

const ENTRY_CHAIN: &[(&str, EntriesLookup)] = &[
    ("top_level", top_level_entries),
    ("criteria_block", block_entries),
    ("lots", lot_entries),
];

fn resolve_entries(detail: &ProjectDetail, kind: CriteriaKind) -> Vec<Criterion> {
    for (source, lookup) in ENTRY_CHAIN {
        if let Some(entries) = lookup(detail, kind) {
            debug!(kind = ?kind, source, count = entries.len(), "criteria entries found");
            return entries;
        }
    }
    Vec::new()
}

/// Non-empty array at `value`.
fn entries_at(value: Option<&Value>) -> Option<Vec<Criterion>> {
    let items = value?.as_array()?;
    (!items.is_empty()).then(|| items.iter().cloned().map(Criterion).collect())
}

fn top_level_entries(detail: &ProjectDetail, kind: CriteriaKind) -> Option<Vec<Criterion>> {
    entries_at(detail.get(kind.entries_key()))
}

fn block_entries(detail: &ProjectDetail, kind: CriteriaKind) -> Option<Vec<Criterion>> {
    entries_at(detail.criteria_block()?.get(kind.entries_key()))
}

/// Union over lots: each lot's own array, else its criteria block's array.
fn lot_entries(detail: &ProjectDetail, kind: CriteriaKind) -> Option<Vec<Criterion>> {
    let key = kind.entries_key();
    let entries: Vec<Criterion> = detail
        .lots()
        .filter_map(|lot| {
            entries_at(lot.get(key))
                .or_else(|| entries_at(lot.get("criteria").and_then(|c| c.get(key))))
        })
        .flatten()
        .collect();
    (!entries.is_empty()).then_some(entries)
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

type FlagLookup = fn(&ProjectDetail, CriteriaKind, Flag) -> Option<bool>;

/// Explicit flags, consulted only while the previous one is absent.
const FLAG_CHAIN: &[(&str, FlagLookup)] = &[
    ("top_level", top_level_flag),
    ("criteria_block", block_flag),
];

/// First explicit flag wins. A matching `…Selection` value forces `true`.
fn resolve_flag(detail: &ProjectDetail, kind: CriteriaKind, flag: Flag) -> Option<bool> {
    let explicit = FLAG_CHAIN.iter().find_map(|(source, lookup)| {
        let value = lookup(detail, kind, flag)?;
        debug!(kind = ?kind, flag = ?flag, source, value, "criteria flag found");
        Some(value)
    });

    if selection_flag(detail, kind, flag) {
        debug!(kind = ?kind, flag = ?flag, "criteria flag set by selection");
        return Some(true);
    }
    explicit
}

/// Accepts JSON booleans and `yes`/`no`/`true`/`false` strings.
fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn top_level_flag(detail: &ProjectDetail, kind: CriteriaKind, flag: Flag) -> Option<bool> {
    detail.get(flag.key(kind)).and_then(parse_flag)
}

fn block_flag(detail: &ProjectDetail, kind: CriteriaKind, flag: Flag) -> Option<bool> {
    detail
        .criteria_block()?
        .get(flag.key(kind))
        .and_then(parse_flag)
}

fn selection_flag(detail: &ProjectDetail, kind: CriteriaKind, flag: Flag) -> bool {
    detail
        .criteria_block()
        .and_then(|block| block.get(kind.selection_key()))
        .and_then(Value::as_str)
        .is_some_and(|selection| selection == flag.selection_value())
}

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

fn resolve_note(detail: &ProjectDetail, kind: CriteriaKind, lang: &str) -> Option<String> {
    let key = kind.note_key();
    detail
        .criteria_block()
        .and_then(|block| block.get(key))
        .and_then(|v| localized(v, lang))
        .or_else(|| detail.get(key).and_then(|v| localized(v, lang)))
}
