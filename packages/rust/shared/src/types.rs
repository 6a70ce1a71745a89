//! Core domain types: tender summaries/details, company profile, enriched records.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TenderError};

// ---------------------------------------------------------------------------
// Lenient JSON helpers
// ---------------------------------------------------------------------------

/// Render a scalar JSON value as a string. Identifiers arrive as strings or numbers.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pick a language entry out of a localized text object (`{"de": "...", "fr": "..."}`).
///
/// Plain strings are accepted as-is. Blank values count as absent.
pub fn localized(value: &Value, lang: &str) -> Option<String> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get(lang)?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}

// ---------------------------------------------------------------------------
// ProjectSummary
// ---------------------------------------------------------------------------

/// One hit from the project search endpoint. Only drives the detail fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    /// Project identifier.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// Publication identifier.
    #[serde(default, deserialize_with = "lenient_string")]
    pub publication_id: Option<String>,
    /// Publication type (`tender`, `advance_notice`, ...).
    #[serde(default)]
    pub pub_type: Option<String>,
    /// CPV classification as returned by search (shape varies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpv_code: Option<Value>,
}

// ---------------------------------------------------------------------------
// ProjectDetail
// ---------------------------------------------------------------------------

/// Raw tender document from the detail endpoint.
///
/// The upstream schema is heterogeneous, so the document stays untyped and
/// is read through accessors that treat `null` as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectDetail(pub Value);

impl ProjectDetail {
    /// Top-level field, `None` when absent or `null`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// The nested `criteria` block, if it is an object.
    pub fn criteria_block(&self) -> Option<&Map<String, Value>> {
        self.get("criteria").and_then(Value::as_object)
    }

    /// Entries of the `lots` array.
    pub fn lots(&self) -> impl Iterator<Item = &Value> {
        self.get("lots")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
    }

    /// Project identifier carried by the document itself.
    pub fn project_id(&self) -> Option<String> {
        self.get("projectId").and_then(value_to_string)
    }

    /// Best-effort identifier for log lines.
    pub fn log_id(&self) -> String {
        self.project_id()
            .or_else(|| self.get("id").and_then(value_to_string))
            .unwrap_or_else(|| "unknown".into())
    }
}

// ---------------------------------------------------------------------------
// CompanyProfile
// ---------------------------------------------------------------------------

/// Static description of the bidding company, handed to the model verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expertise: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    /// Largest contract the company can take on, in EUR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_contract_value_eur: Option<u64>,
    /// Any further keys the profile file carries.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompanyProfile {
    /// Load a profile from a JSON file. A missing file yields an empty profile.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "company profile not found, using empty profile");
                return Ok(Self::default());
            }
            Err(e) => return Err(TenderError::io(path, e)),
        };

        let profile: Self = serde_json::from_str(&content).map_err(|e| {
            TenderError::parse(format!("invalid company profile {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), name = ?profile.name, "company profile loaded");
        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// Enriched record
// ---------------------------------------------------------------------------

/// Team a project is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Products,
    Engineering,
    #[serde(rename = "Data&AI")]
    DataAi,
}

impl Team {
    pub const ALL: [Team; 3] = [Team::Products, Team::Engineering, Team::DataAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "Products",
            Self::Engineering => "Engineering",
            Self::DataAi => "Data&AI",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPV code with its label in the working language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpvCode {
    pub code: Option<String>,
    pub label: Option<String>,
}

/// Normalized project fields. Every key is always serialized; `null` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub title: Option<String>,
    pub customer: Option<String>,
    pub location: Option<String>,
    pub project_number: Option<String>,
    pub project_id: Option<String>,
    pub publication_date: Option<String>,
    pub offer_deadline: Option<String>,
    pub contract_start: Option<String>,
    pub qna_deadline: Option<String>,
    pub cpv_code: Option<CpvCode>,
}

/// A single qualification or award criterion, kept exactly as published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criterion(pub Value);

impl Criterion {
    /// Criterion title in `lang`.
    pub fn title(&self, lang: &str) -> Option<String> {
        self.0.get("title").and_then(|v| localized(v, lang))
    }

    /// Criterion description in `lang`.
    pub fn description(&self, lang: &str) -> Option<String> {
        self.0.get("description").and_then(|v| localized(v, lang))
    }

    /// Award weighting, as published (usually a percentage number).
    pub fn weighting(&self) -> Option<String> {
        self.0.get("weighting").and_then(value_to_string)
    }
}

/// Everything known about one criteria type. The signals are independent:
/// a record may carry entries, flags and a summary at the same time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaSignals {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Criterion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_documents: Option<bool>,
    #[serde(default, rename = "asPdf", skip_serializing_if = "Option::is_none")]
    pub as_pdf: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl CriteriaSignals {
    /// Whether any of the four signals says something about these criteria.
    pub fn is_present(&self) -> bool {
        !self.entries.is_empty()
            || self.in_documents == Some(true)
            || self.as_pdf == Some(true)
            || self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Tracked fields reported when they could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissingField {
    #[serde(rename = "ID")]
    ProjectId,
    #[serde(rename = "Q&A")]
    QnaDeadline,
    #[serde(rename = "Eignungskriterien")]
    QualificationCriteria,
    #[serde(rename = "Zuschlagskriterien")]
    AwardCriteria,
}

impl MissingField {
    /// Human-readable label shown in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProjectId => "ID",
            Self::QnaDeadline => "Q&A",
            Self::QualificationCriteria => "Eignungskriterien",
            Self::AwardCriteria => "Zuschlagskriterien",
        }
    }
}

/// Final enriched record for one tender. Written to the batch artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub summary: String,
    pub project: ProjectInfo,
    pub team: Team,
    pub apply_score: u8,
    #[serde(default)]
    pub qualification_criteria: CriteriaSignals,
    #[serde(default)]
    pub award_criteria: CriteriaSignals,
    #[serde(default)]
    pub missing_info: Vec<MissingField>,
}
