//! End-to-end run: search → details → enrichment → notifications → batch file.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tenderwatch_notify::{RenderOptions, WebhookNotifier, render};
use tenderwatch_shared::{CompanyProfile, EnrichmentResult, Result};
use tenderwatch_source::{SourceClient, SummaryQuery};

use crate::enrichment::Enricher;
use crate::model::LanguageModel;
use crate::output;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Search parameters.
    pub query: SummaryQuery,
    /// Minimum apply score to notify; `None` notifies every record.
    pub threshold: Option<u8>,
    /// Batch artifact path.
    pub output: PathBuf,
    /// Deep-link base and working language.
    pub render: RenderOptions,
}

/// Counters of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub summaries: usize,
    pub details: usize,
    pub enriched: usize,
    pub enrichment_failures: usize,
    pub notified: usize,
    pub notification_failures: usize,
    pub skipped_below_threshold: usize,
    pub output: PathBuf,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each item of the enrichment phase.
    fn item(&self, current: usize, total: usize, label: &str);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _label: &str) {}
    fn done(&self, _report: &RunReport) {}
}

/// Run the full pipeline.
///
/// 1. Fetch summaries and details
/// 2. Enrich each detail (failures are logged and counted)
/// 3. Render and post records at or above the threshold; `notifier: None` is a dry run
/// 4. Write every enriched record to the batch file
///
/// Only a failure to write the batch file is returned as an error.
#[instrument(skip_all, fields(output = %config.output.display()))]
pub async fn run<M: LanguageModel>(
    config: &PipelineConfig,
    source: &SourceClient,
    model: &M,
    notifier: Option<&WebhookNotifier>,
    profile: &CompanyProfile,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();
    let mut report = RunReport {
        run_id: Uuid::now_v7(),
        started_at: Utc::now(),
        summaries: 0,
        details: 0,
        enriched: 0,
        enrichment_failures: 0,
        notified: 0,
        notification_failures: 0,
        skipped_below_threshold: 0,
        output: config.output.clone(),
        elapsed: Duration::ZERO,
    };

    info!(run_id = %report.run_id, "starting run");

    // --- Phase 1: Source ---
    progress.phase("Searching tenders");
    let summaries = source.fetch_summaries(&config.query).await;
    report.summaries = summaries.len();

    progress.phase("Fetching details");
    let details = source.fetch_details(&summaries).await;
    report.details = details.len();

    // --- Phase 2: Enrichment ---
    progress.phase("Enriching projects");
    let enricher = Enricher::new(model, config.render.language.clone());
    let outcomes = enricher
        .enrich_batch(&details, profile, |current, total, detail| {
            progress.item(current, total, &detail.log_id());
        })
        .await;
    let attempted = outcomes.len();
    let results: Vec<EnrichmentResult> = outcomes.into_iter().filter_map(|r| r.ok()).collect();
    report.enriched = results.len();
    report.enrichment_failures = attempted - results.len();

    // --- Phase 3: Notifications ---
    progress.phase("Sending notifications");
    for result in &results {
        if !meets_threshold(result, config.threshold) {
            report.skipped_below_threshold += 1;
            debug!(
                project_number = ?result.project.project_number,
                apply_score = result.apply_score,
                "below threshold, not notifying"
            );
            continue;
        }

        let payload = render(result, &config.render);
        let Some(notifier) = notifier else {
            info!(text = %payload.text, "dry run, notification not sent");
            continue;
        };

        match notifier.post(&payload).await {
            Ok(()) => report.notified += 1,
            Err(e) => {
                report.notification_failures += 1;
                warn!(
                    project_number = ?result.project.project_number,
                    error = %e,
                    "notification failed"
                );
            }
        }
    }

    // --- Phase 4: Batch artifact ---
    progress.phase("Writing batch file");
    output::write_batch(&config.output, &results)?;

    report.elapsed = start.elapsed();
    progress.done(&report);

    info!(
        run_id = %report.run_id,
        summaries = report.summaries,
        details = report.details,
        enriched = report.enriched,
        enrichment_failures = report.enrichment_failures,
        notified = report.notified,
        notification_failures = report.notification_failures,
        skipped = report.skipped_below_threshold,
        elapsed_ms = report.elapsed.as_millis(),
        "run complete"
    );

    Ok(report)
}

fn meets_threshold(result: &EnrichmentResult, threshold: Option<u8>) -> bool {
    threshold.is_none_or(|t| result.apply_score >= t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tenderwatch_shared::{SourceConfig, TenderError};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::model::FunctionSpec;

    const SEARCH: &str = "/api/publications/v2/project/project-search";

    /// Answers every analysis call with the same score, or fails them all.
    struct ScoringModel {
        score: Option<u8>,
    }

    impl LanguageModel for ScoringModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok("• Referenzprojekte".into())
        }

        async fn call_function(
            &self,
            _system: &str,
            _user: &str,
            _function: &FunctionSpec,
        ) -> Result<Value> {
            let score = self
                .score
                .ok_or_else(|| TenderError::Enrichment("model unavailable".into()))?;
            Ok(json!({
                "summary": "Plattform-Erneuerung.",
                "project": {"title": "Workflow", "projectNumber": "24123", "qnaDeadline": "2024-10-04"},
                "team": "Products",
                "applyScore": score,
                "missingInfo": []
            }))
        }
    }

    /// Keeps every enrichment item callback.
    #[derive(Default)]
    struct RecordingProgress {
        items: std::sync::Mutex<Vec<(usize, usize, String)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, _name: &str) {}

        fn item(&self, current: usize, total: usize, label: &str) {
            self.items
                .lock()
                .unwrap()
                .push((current, total, label.to_string()));
        }

        fn done(&self, _report: &RunReport) {}
    }

    fn temp_output() -> PathBuf {
        std::env::temp_dir()
            .join(format!("tw-pipeline-test-{}", Uuid::now_v7()))
            .join("enriched_projects.json")
    }

    async fn mock_source(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(SEARCH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projects": [
                    {"id": 1, "publicationId": "p1", "pubType": "tender"},
                    {"id": 2, "publicationId": "p2", "pubType": "notice"}
                ],
                "pagination": {"itemsPerPage": 20}
            })))
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/publications/v1/project/1/publication-details/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "projectId": "1",
                "criteria": {"awardCriteriaSelection": "criteria_as_pdf"},
                "qualificationCriteria": [{"title": {"de": "Referenzprojekte"}}]
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn setup(
        server: &MockServer,
        threshold: Option<u8>,
        output: PathBuf,
    ) -> (PipelineConfig, SourceClient) {
        let source_config = SourceConfig {
            base_url: server.uri(),
            request_delay_ms: 0,
            ..SourceConfig::new(3)
        };
        let pipeline = PipelineConfig {
            query: SummaryQuery::from(&source_config),
            threshold,
            output,
            render: RenderOptions {
                portal_url: "https://www.simap.ch".into(),
                language: "de".into(),
            },
        };
        (pipeline, SourceClient::new(source_config).unwrap())
    }

    #[tokio::test]
    async fn run_notifies_and_writes_batch() {
        let server = MockServer::start().await;
        mock_source(&server).await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let output = temp_output();
        let (config, source) = setup(&server, Some(7), output.clone());
        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri()), 10).unwrap();
        let model = ScoringModel { score: Some(9) };

        let report = run(
            &config,
            &source,
            &model,
            Some(&notifier),
            &CompanyProfile::default(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.summaries, 2);
        assert_eq!(report.details, 1);
        assert_eq!(report.enriched, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.skipped_below_threshold, 0);

        let batch = output::read_batch(&output).expect("batch file");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].project.project_id.as_deref(), Some("1"));
        assert_eq!(batch[0].award_criteria.as_pdf, Some(true));
        assert!(batch[0].missing_info.is_empty());
    }

    #[tokio::test]
    async fn threshold_filters_notifications() {
        let server = MockServer::start().await;
        mock_source(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let output = temp_output();
        let (config, source) = setup(&server, Some(7), output.clone());
        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri()), 10).unwrap();
        let model = ScoringModel { score: Some(4) };

        let report = run(
            &config,
            &source,
            &model,
            Some(&notifier),
            &CompanyProfile::default(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.enriched, 1);
        assert_eq!(report.notified, 0);
        assert_eq!(report.skipped_below_threshold, 1);
        assert_eq!(output::read_batch(&output).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_is_written_when_every_enrichment_fails() {
        let server = MockServer::start().await;
        mock_source(&server).await;

        let output = temp_output();
        let (config, source) = setup(&server, None, output.clone());
        let model = ScoringModel { score: None };
        let progress = RecordingProgress::default();

        let report = run(
            &config,
            &source,
            &model,
            None,
            &CompanyProfile::default(),
            &progress,
        )
        .await
        .expect("run");

        assert_eq!(report.enriched, 0);
        assert_eq!(report.enrichment_failures, 1);
        assert_eq!(progress.items.into_inner().unwrap(), vec![(1, 1, "1".to_string())]);
        assert!(output::read_batch(&output).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_post_is_counted_not_fatal() {
        let server = MockServer::start().await;
        mock_source(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let output = temp_output();
        let (config, source) = setup(&server, None, output.clone());
        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri()), 10).unwrap();
        let model = ScoringModel { score: Some(2) };

        let report = run(
            &config,
            &source,
            &model,
            Some(&notifier),
            &CompanyProfile::default(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.notified, 0);
        assert_eq!(report.notification_failures, 1);
        assert!(output.exists());
    }

    #[test]
    fn no_threshold_notifies_everything() {
        let result = EnrichmentResult {
            summary: String::new(),
            project: Default::default(),
            team: tenderwatch_shared::Team::Products,
            apply_score: 1,
            qualification_criteria: Default::default(),
            award_criteria: Default::default(),
            missing_info: vec![],
        };
        assert!(meets_threshold(&result, None));
        assert!(!meets_threshold(&result, Some(2)));
        assert!(meets_threshold(&result, Some(1)));
    }
}
