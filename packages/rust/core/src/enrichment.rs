//! LLM enrichment of tender details.
//!
//! One forced function call per project yields summary, normalized fields,
//! team and apply score. Criteria are then reconciled from the document
//! itself (see [`crate::criteria`]) and `missingInfo` is recomputed from the
//! merged record. The model's own `missingInfo` is never trusted.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use tenderwatch_shared::{
    CompanyProfile, CpvCode, CriteriaSignals, Criterion, EnrichmentResult, MissingField,
    ProjectDetail, ProjectInfo, Result, Team, TenderError, value_to_string,
};

use crate::criteria::{self, CriteriaKind};
use crate::model::{FunctionSpec, LanguageModel};

/// Name of the forced analysis function.
pub const ENRICH_FUNCTION: &str = "enrich_project";

const SYSTEM_PROMPT: &str = "Du bist RFP-Analyst für das Unternehmen aus COMPANY_PROFILE. \
Nutze nur deutsche Felder und analysiere wie folgt:\n\
1. Zusammenfassung (2-3 Sätze)\n\
2. Extrahiere relevante Felder\n\
3. Teamzuordnung\n\
4. Apply-Score 1-10\n\
5. Liste fehlende Felder";

// ---------------------------------------------------------------------------
// Prompt & schema
// ---------------------------------------------------------------------------

/// User message carrying the detail record and company profile.
pub fn build_prompt(detail: &ProjectDetail, profile: &CompanyProfile) -> Result<String> {
    let detail_json = serde_json::to_string_pretty(detail)
        .map_err(|e| TenderError::Enrichment(format!("failed to serialize detail: {e}")))?;
    let profile_json = serde_json::to_string_pretty(profile)
        .map_err(|e| TenderError::Enrichment(format!("failed to serialize profile: {e}")))?;
    Ok(format!(
        "PROJECT_JSON =\n{detail_json}\n\nCOMPANY_PROFILE =\n{profile_json}"
    ))
}

/// Schema of the `enrich_project` function.
pub fn enrich_function() -> FunctionSpec {
    let teams: Vec<&str> = Team::ALL.iter().map(Team::as_str).collect();
    let text = json!({"type": ["string", "null"]});

    FunctionSpec {
        name: ENRICH_FUNCTION.into(),
        description: "Analysiere ein SIMAP-Projekt, fasse es kurz zusammen, extrahiere nur \
            deutsche Werte, ordne es einem Team zu, gib einen Apply-Score von 1 (kein Fit) \
            bis 10 (perfekter Fit) basierend auf dem Firmenprofil und liste fehlende Felder auf."
            .into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "project": {
                    "type": "object",
                    "properties": {
                        "title": text,
                        "customer": text,
                        "location": text,
                        "projectNumber": text,
                        "projectId": text,
                        "publicationDate": text,
                        "offerDeadline": text,
                        "contractStart": text,
                        "qnaDeadline": text,
                        "cpvCode": {
                            "type": "object",
                            "properties": {"code": text, "label": text},
                            "required": ["code", "label"]
                        }
                    },
                    "required": [
                        "title", "customer", "location", "projectNumber", "projectId",
                        "publicationDate", "offerDeadline", "contractStart", "qnaDeadline",
                        "cpvCode"
                    ]
                },
                "team": {"type": "string", "enum": teams},
                "applyScore": {"type": "integer", "minimum": 1, "maximum": 10},
                "missingInfo": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["summary", "project", "team", "applyScore", "missingInfo"]
        }),
    }
}

fn summary_prompt(kind: CriteriaKind) -> String {
    format!(
        "Fasse die folgenden {} in kurzen Stichpunkten auf Deutsch zusammen, \
         in weniger als 300 Zeichen. Verwende kein Markdown und kein HTML, nur reinen Text. \
         Falls Details fehlen, schreibe am Ende einmal, dass weitere Kriterien auf SIMAP zu finden sind.",
        kind.label()
    )
}

// ---------------------------------------------------------------------------
// Model output
// ---------------------------------------------------------------------------

/// Arguments of the `enrich_project` call. Unknown keys (including the
/// model's `missingInfo`) are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelAnalysis {
    summary: String,
    project: Map<String, Value>,
    team: Team,
    apply_score: i64,
}

fn decode_analysis(arguments: Value) -> Result<ModelAnalysis> {
    let analysis: ModelAnalysis = serde_json::from_value(arguments).map_err(|e| {
        TenderError::Enrichment(format!("model output does not match {ENRICH_FUNCTION}: {e}"))
    })?;
    if !(1..=10).contains(&analysis.apply_score) {
        return Err(TenderError::Enrichment(format!(
            "apply score {} is outside 1..=10",
            analysis.apply_score
        )));
    }
    Ok(analysis)
}

/// Fill every project key, overriding `projectId` with the document's own.
fn normalize_project(raw: &Map<String, Value>, detail: &ProjectDetail) -> ProjectInfo {
    let text = |key: &str| raw.get(key).and_then(value_to_string);
    let cpv_code = raw.get("cpvCode").and_then(Value::as_object).map(|cpv| CpvCode {
        code: cpv.get("code").and_then(value_to_string),
        label: cpv.get("label").and_then(value_to_string),
    });

    let model_id = text("projectId");
    let project_id = detail.project_id();
    if model_id.is_some() && model_id != project_id {
        debug!(model = ?model_id, document = ?project_id, "overriding model project id");
    }

    ProjectInfo {
        title: text("title"),
        customer: text("customer"),
        location: text("location"),
        project_number: text("projectNumber"),
        project_id,
        publication_date: text("publicationDate"),
        offer_deadline: text("offerDeadline"),
        contract_start: text("contractStart"),
        qna_deadline: text("qnaDeadline"),
        cpv_code,
    }
}

/// Tracked fields that are still unknown, in fixed order.
pub fn compute_missing_info(
    project: &ProjectInfo,
    qualification: &CriteriaSignals,
    award: &CriteriaSignals,
) -> Vec<MissingField> {
    let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

    let mut missing = Vec::new();
    if blank(&project.project_id) {
        missing.push(MissingField::ProjectId);
    }
    if blank(&project.qna_deadline) {
        missing.push(MissingField::QnaDeadline);
    }
    if !qualification.is_present() {
        missing.push(MissingField::QualificationCriteria);
    }
    if !award.is_present() {
        missing.push(MissingField::AwardCriteria);
    }
    missing
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Runs enrichment against a [`LanguageModel`].
pub struct Enricher<'a, M> {
    model: &'a M,
    language: String,
}

impl<'a, M: LanguageModel> Enricher<'a, M> {
    /// `language` selects localized note and title values.
    pub fn new(model: &'a M, language: impl Into<String>) -> Self {
        Self {
            model,
            language: language.into(),
        }
    }

    /// Enrich one detail record. Fails only when the primary model call fails
    /// or its output does not conform.
    #[instrument(skip_all, fields(project_id = %detail.log_id()))]
    pub async fn enrich(
        &self,
        detail: &ProjectDetail,
        profile: &CompanyProfile,
    ) -> Result<EnrichmentResult> {
        let user = build_prompt(detail, profile)?;
        let arguments = self
            .model
            .call_function(SYSTEM_PROMPT, &user, &enrich_function())
            .await?;
        let analysis = decode_analysis(arguments)?;

        let project = normalize_project(&analysis.project, detail);
        let qualification_criteria = self.reconcile(detail, CriteriaKind::Qualification).await;
        let award_criteria = self.reconcile(detail, CriteriaKind::Award).await;
        let missing_info = compute_missing_info(&project, &qualification_criteria, &award_criteria);

        info!(
            team = %analysis.team,
            apply_score = analysis.apply_score,
            missing = missing_info.len(),
            "project enriched"
        );

        Ok(EnrichmentResult {
            summary: analysis.summary.trim().to_string(),
            project,
            team: analysis.team,
            apply_score: analysis.apply_score as u8,
            qualification_criteria,
            award_criteria,
            missing_info,
        })
    }

    /// Enrich each detail in order. One result per input; failures do not stop the batch.
    ///
    /// `on_item(current, total, detail)` runs before each item, `current` counting from 1.
    pub async fn enrich_batch(
        &self,
        details: &[ProjectDetail],
        profile: &CompanyProfile,
        on_item: impl Fn(usize, usize, &ProjectDetail),
    ) -> Vec<Result<EnrichmentResult>> {
        let total = details.len();
        let mut results = Vec::with_capacity(total);
        for (i, detail) in details.iter().enumerate() {
            on_item(i + 1, total, detail);
            let result = self.enrich(detail, profile).await;
            if let Err(e) = &result {
                warn!(project_id = %detail.log_id(), error = %e, "enrichment failed");
            }
            results.push(result);
        }
        results
    }

    async fn reconcile(&self, detail: &ProjectDetail, kind: CriteriaKind) -> CriteriaSignals {
        let extracted = criteria::extract(detail, kind, &self.language);

        let summary = if extracted.entries.is_empty() {
            extracted.note
        } else {
            self.summarize(kind, &extracted.entries).await
        };

        CriteriaSignals {
            entries: extracted.entries,
            in_documents: extracted.in_documents,
            as_pdf: extracted.as_pdf,
            summary,
        }
    }

    /// Short bullet summary of the entries. Any failure yields `None`.
    async fn summarize(&self, kind: CriteriaKind, entries: &[Criterion]) -> Option<String> {
        let user = match serde_json::to_string_pretty(entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(kind = ?kind, error = %e, "failed to serialize criteria");
                return None;
            }
        };

        match self.model.complete(&summary_prompt(kind), &user).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(kind = ?kind, error = %e, "criteria summarization failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued function-call results; completions return a fixed text or fail.
    struct FakeModel {
        analyses: Mutex<VecDeque<Result<Value>>>,
        summary: Option<String>,
        completions: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn new(analyses: Vec<Result<Value>>, summary: Option<&str>) -> Self {
            Self {
                analyses: Mutex::new(analyses.into()),
                summary: summary.map(str::to_string),
                completions: Mutex::new(Vec::new()),
            }
        }
    }

    impl LanguageModel for FakeModel {
        async fn complete(&self, system: &str, _user: &str) -> Result<String> {
            self.completions.lock().unwrap().push(system.to_string());
            self.summary
                .clone()
                .ok_or_else(|| TenderError::Network("summary endpoint down".into()))
        }

        async fn call_function(
            &self,
            _system: &str,
            user: &str,
            function: &FunctionSpec,
        ) -> Result<Value> {
            assert_eq!(function.name, ENRICH_FUNCTION);
            assert!(user.starts_with("PROJECT_JSON ="));
            self.analyses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TenderError::Enrichment("no more analyses".into())))
        }
    }

    fn analysis(project_id: Option<&str>, qna: Option<&str>) -> Value {
        json!({
            "summary": "  Erneuerung der Workflow-Plattform des Bundes.  ",
            "project": {
                "title": "Erneuerung Workflow-Plattform",
                "customer": "Bundesamt für Informatik",
                "location": "Bern",
                "projectNumber": 24123,
                "projectId": project_id,
                "publicationDate": "2024-09-17",
                "offerDeadline": "2024-10-31",
                "contractStart": null,
                "qnaDeadline": qna,
                "cpvCode": {"code": "72000000", "label": "IT-Dienste"}
            },
            "team": "Engineering",
            "applyScore": 8,
            "missingInfo": ["Kunde"]
        })
    }

    fn fixture() -> ProjectDetail {
        let raw = std::fs::read_to_string("../../../fixtures/json/detail.fixture.json")
            .expect("read detail fixture");
        serde_json::from_str(&raw).expect("parse detail fixture")
    }

    fn profile() -> CompanyProfile {
        CompanyProfile {
            name: Some("Example Solutions AG".into()),
            ..CompanyProfile::default()
        }
    }

    #[tokio::test]
    async fn bare_detail_reports_everything_missing() {
        let model = FakeModel::new(vec![Ok(analysis(Some("model-invented"), None))], None);
        let enricher = Enricher::new(&model, "de");
        let detail = ProjectDetail(json!({"id": "pub-1"}));

        let result = enricher.enrich(&detail, &profile()).await.expect("enrich");

        assert_eq!(result.project.project_id, None);
        assert_eq!(
            result.missing_info,
            vec![
                MissingField::ProjectId,
                MissingField::QnaDeadline,
                MissingField::QualificationCriteria,
                MissingField::AwardCriteria,
            ]
        );
        assert!(model.completions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fixture_merges_document_criteria() {
        let model = FakeModel::new(
            vec![Ok(analysis(Some("wrong-id"), Some("2024-10-04")))],
            Some("• Referenzprojekte\n• ISO 27001"),
        );
        let enricher = Enricher::new(&model, "de");

        let result = enricher.enrich(&fixture(), &profile()).await.expect("enrich");

        assert_eq!(
            result.project.project_id.as_deref(),
            Some("a1b2c3d4-0000-4000-8000-000000000001")
        );
        assert_eq!(result.project.project_number.as_deref(), Some("24123"));
        assert_eq!(result.project.contract_start, None);
        assert_eq!(result.summary, "Erneuerung der Workflow-Plattform des Bundes.");
        assert_eq!(result.team, Team::Engineering);
        assert_eq!(result.apply_score, 8);

        let q = &result.qualification_criteria;
        assert_eq!(q.entries.len(), 2);
        assert_eq!(q.in_documents, Some(true));
        assert_eq!(q.summary.as_deref(), Some("• Referenzprojekte\n• ISO 27001"));

        let a = &result.award_criteria;
        assert!(a.entries.is_empty());
        assert_eq!(a.summary.as_deref(), Some("Preis 40 %, Qualität 60 %"));

        assert!(result.missing_info.is_empty());
        let prompts = model.completions.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Eignungskriterien"));
    }

    #[tokio::test]
    async fn summarization_failure_is_soft() {
        let model = FakeModel::new(vec![Ok(analysis(None, None))], None);
        let enricher = Enricher::new(&model, "de");

        let result = enricher.enrich(&fixture(), &profile()).await.expect("enrich");

        let q = &result.qualification_criteria;
        assert_eq!(q.entries.len(), 2);
        assert_eq!(q.summary, None);
        assert_eq!(result.missing_info, vec![MissingField::QnaDeadline]);
    }

    #[tokio::test]
    async fn nonconforming_output_fails_the_item() {
        let mut unknown_team = analysis(None, None);
        unknown_team["team"] = json!("Marketing");
        let mut score_too_high = analysis(None, None);
        score_too_high["applyScore"] = json!(11);
        let mut no_summary = analysis(None, None);
        no_summary.as_object_mut().unwrap().remove("summary");

        for bad in [unknown_team, score_too_high, no_summary] {
            let model = FakeModel::new(vec![Ok(bad)], None);
            let enricher = Enricher::new(&model, "de");
            let err = enricher.enrich(&fixture(), &profile()).await.unwrap_err();
            assert!(matches!(err, TenderError::Enrichment(_)), "got: {err}");
        }
    }

    #[tokio::test]
    async fn batch_keeps_order_and_isolates_failures() {
        let model = FakeModel::new(
            vec![
                Err(TenderError::Enrichment("timeout".into())),
                Ok(analysis(None, Some("2024-10-04"))),
            ],
            Some("• Referenzen"),
        );
        let enricher = Enricher::new(&model, "de");
        let details = vec![ProjectDetail(json!({"id": "a"})), fixture()];

        let seen = Mutex::new(Vec::new());
        let results = enricher
            .enrich_batch(&details, &profile(), |current, total, detail| {
                seen.lock().unwrap().push((current, total, detail.log_id()));
            })
            .await;

        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                (1, 2, "a".to_string()),
                (2, 2, "a1b2c3d4-0000-4000-8000-000000000001".to_string()),
            ]
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        let second = results[1].as_ref().expect("second item enriched");
        assert_eq!(
            second.project.project_id.as_deref(),
            Some("a1b2c3d4-0000-4000-8000-000000000001")
        );
    }

    #[test]
    fn prompt_keeps_umlauts_unescaped() {
        let prompt = build_prompt(&fixture(), &profile()).expect("prompt");
        assert!(prompt.starts_with("PROJECT_JSON =\n{"));
        assert!(prompt.contains("Bundesamt für Informatik"));
        assert!(prompt.contains("COMPANY_PROFILE =\n"));
        assert!(prompt.contains("Example Solutions AG"));
    }

    #[test]
    fn schema_lists_the_closed_team_set() {
        let function = enrich_function();
        assert_eq!(
            function.parameters["properties"]["team"]["enum"],
            json!(["Products", "Engineering", "Data&AI"])
        );
        assert_eq!(function.parameters["properties"]["applyScore"]["maximum"], 10);
    }

    #[test]
    fn blank_qna_counts_as_missing() {
        let project = ProjectInfo {
            project_id: Some("x".into()),
            qna_deadline: Some("  ".into()),
            ..ProjectInfo::default()
        };
        let present = CriteriaSignals {
            as_pdf: Some(true),
            ..CriteriaSignals::default()
        };
        assert_eq!(
            compute_missing_info(&project, &present, &CriteriaSignals::default()),
            vec![MissingField::QnaDeadline, MissingField::AwardCriteria]
        );
    }
}
