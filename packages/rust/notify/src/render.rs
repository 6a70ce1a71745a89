//! Renders an enriched record into a block-structured chat message.
//!
//! The envelope is always `[divider, section, context, divider]`; the
//! section carries the whole message as `mrkdwn`, the context line carries
//! the deep link to the publication.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use tenderwatch_shared::{CriteriaSignals, Criterion, EnrichmentResult};

/// Shown for unknown values.
pub const PLACEHOLDER: &str = "—";

/// Shown when nothing is missing.
const NOTHING_MISSING: &str = "Keine";

/// Maximum length of the plain-text fallback, in characters.
pub const FALLBACK_MAX_CHARS: usize = 150;

const DATE_FORMAT: &str = "%d.%m.%Y";

/// ISO 8601 timestamps with an offset that RFC 3339 parsing rejects.
const OFFSET_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// ISO 8601 timestamps without an offset, `T` or space separated.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Webhook body: plain-text fallback plus structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub text: String,
    pub blocks: Vec<Block>,
}

/// One layout block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Divider,
    Section { text: TextObject },
    Context { elements: Vec<TextObject> },
}

/// Markdown-formatted text element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: TextKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextKind {
    #[serde(rename = "mrkdwn")]
    Mrkdwn,
}

impl TextObject {
    fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Mrkdwn,
            text: text.into(),
        }
    }
}

/// Where deep links point and which language localized fields are read in.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub portal_url: String,
    pub language: String,
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Build the notification for one enriched record.
pub fn render(result: &EnrichmentResult, opts: &RenderOptions) -> NotificationPayload {
    let text = render_text(result, &opts.language);
    let link = deep_link(result.project.project_id.as_deref(), opts);

    NotificationPayload {
        text: truncate_chars(&text, FALLBACK_MAX_CHARS),
        blocks: vec![
            Block::Divider,
            Block::Section {
                text: TextObject::mrkdwn(text),
            },
            Block::Context {
                elements: vec![TextObject::mrkdwn(link)],
            },
            Block::Divider,
        ],
    }
}

fn render_text(result: &EnrichmentResult, lang: &str) -> String {
    let project = &result.project;
    let or_placeholder = |v: &Option<String>| v.clone().unwrap_or_else(|| PLACEHOLDER.into());

    let cpv = project.cpv_code.clone().unwrap_or_default();
    let missing = if result.missing_info.is_empty() {
        NOTHING_MISSING.to_string()
    } else {
        result
            .missing_info
            .iter()
            .map(|m| m.label())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut text = String::new();
    let _ = write!(
        text,
        "\n:rocket: *Team: {team}*  *#{number}*\n\
         \n:file_folder: *Projekt:* {title} / {customer}\n\
         \n:star: *Apply Score:* *{score}*\n\
         \n:page_facing_up: *Zusammenfassung:*\n>{summary}\n\n\
         :calendar:   •   *Q&A:* {qna}   •   *Frist:* {deadline}   •   *Start:* {start} \n\
         \n:pushpin: *CPV:* `{cpv_code}` – {cpv_label}\n\
         \n:mag: *Fehlende Infos:* {missing}\n",
        team = result.team,
        number = or_placeholder(&project.project_number),
        title = or_placeholder(&project.title),
        customer = or_placeholder(&project.customer),
        score = result.apply_score,
        summary = if result.summary.trim().is_empty() {
            PLACEHOLDER
        } else {
            result.summary.trim()
        },
        qna = format_date(project.qna_deadline.as_deref()),
        deadline = format_date(project.offer_deadline.as_deref()),
        start = format_date(project.contract_start.as_deref()),
        cpv_code = or_placeholder(&cpv.code),
        cpv_label = or_placeholder(&cpv.label),
    );

    text.push_str(&render_criteria(
        &result.qualification_criteria,
        ":bookmark_tabs:",
        "Eignungskriterien",
        lang,
        |c| c.description(lang),
    ));
    text.push_str(&render_criteria(
        &result.award_criteria,
        ":trophy:",
        "Zuschlagskriterien",
        lang,
        |c| c.weighting().map(|w| format!("Gewichtung {w}%")),
    ));

    text
}

/// First applicable of: summary, bullet list, PDF notice, documents notice.
fn render_criteria(
    signals: &CriteriaSignals,
    icon: &str,
    heading: &str,
    lang: &str,
    detail: impl Fn(&Criterion) -> Option<String>,
) -> String {
    if let Some(summary) = signals.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return format!("\n{icon} *{heading}:*\n{summary}\n");
    }

    let bullets: Vec<String> = signals
        .entries
        .iter()
        .filter_map(|c| {
            let title = c.title(lang)?;
            Some(match detail(c) {
                Some(extra) => format!("• *{title}* – {extra}"),
                None => format!("• *{title}*"),
            })
        })
        .collect();
    if !bullets.is_empty() {
        return format!("{icon} *{heading}:*\n{}\n", bullets.join("\n"));
    }

    if signals.as_pdf == Some(true) {
        format!("{icon} Kriterien sind als pdf hinterlegt\n")
    } else if signals.in_documents == Some(true) {
        format!("{icon} Kriterien sind in den Dokumenten hinterlegt\n")
    } else {
        String::new()
    }
}

fn deep_link(project_id: Option<&str>, opts: &RenderOptions) -> String {
    let portal = opts.portal_url.trim_end_matches('/');
    match project_id {
        Some(id) => format!(
            "<{portal}/{}/project-detail/{id}#ausschreibung|🔗 Vollständige Ausschreibung>",
            opts.language
        ),
        None => format!("<{portal}/{}|🔗 Ausschreibungsportal>", opts.language),
    }
}

/// Format a date as `DD.MM.YYYY`.
///
/// Accepts ISO 8601 date-times, with or without an offset and `T` or space
/// separated, and bare `YYYY-MM-DD`.
/// `None` or blank gives [`PLACEHOLDER`]; anything unparseable is returned unchanged.
pub fn format_date(value: Option<&str>) -> String {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return PLACEHOLDER.into();
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(DATE_FORMAT).to_string();
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return dt.format(DATE_FORMAT).to_string();
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return dt.format(DATE_FORMAT).to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format(DATE_FORMAT).to_string();
    }

    raw.to_string()
}

/// Truncate to at most `max` characters without splitting a code point.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
