use serde_json::{json, Map, Value};
use tracing::debug;

use super::{pause, percent, TaskSummary};
use crate::api::{ApiClient, PageSet, Paginator};
use crate::config::Config;
use crate::error::AppError;
use crate::models::{answer_accepted, parse_score, ExamPlan, Question};
use crate::report::{Event, EventReporter, Severity};

pub const EXAM_LIST_ENDPOINT: &str = "app/trainExamPlan/queryExamPlans";
pub const EXAM_START_ENDPOINT: &str = "app/trainExamPlan/startExamPlan";
pub const EXAM_ANSWER_ENDPOINT: &str = "app/trainExamPlan/startAnswer";
pub const EXAM_SUBMIT_ENDPOINT: &str = "app/trainExamPlan/startFinalAnswer";

const TITLE: &str = "Exams";

/// Unfinished plans first, then finished ones that can be retaken.
const FINISHED_FILTERS: [&str; 2] = ["0", "1"];

pub struct ExamRunner<'a> {
    config: &'a Config,
    client: &'a ApiClient,
    reporter: EventReporter,
}

impl<'a> ExamRunner<'a> {
    pub fn new(config: &'a Config, client: &'a ApiClient) -> Self {
        Self {
            config,
            client,
            reporter: client.reporter().clone(),
        }
    }

    pub async fn run(&self) -> TaskSummary {
        let mut summary = TaskSummary::default();
        self.reporter.info(TITLE, "Starting exam tasks");

        let records = match self.list_plans().await {
            Ok(records) => records,
            Err(e) => {
                self.reporter
                    .error(TITLE, &format!("Failed to fetch exams: {}", e.message));
                return summary;
            }
        };

        let total = records.len();
        summary.found = total;
        if total == 0 {
            self.reporter.info(TITLE, "No exam tasks");
            return summary;
        }
        self.reporter.success(TITLE, &format!("Found {} exam tasks", total));

        for (index, record) in records.into_iter().enumerate() {
            let progress = percent(index + 1, total);
            let plan = match ExamPlan::from_value(record) {
                Some(plan) if plan.is_complete() => plan,
                _ => {
                    self.emit(Severity::Error, TITLE, "Incomplete exam record, skipped", progress);
                    summary.skipped += 1;
                    continue;
                }
            };
            let name = plan.name().unwrap_or_default();
            self.reporter.info(TITLE, &format!("Starting exam: {}", name));

            if self.take(&plan, &name).await {
                summary.completed += 1;
                let completed = self.reporter.record_exam_completed();
                self.emit(
                    Severity::Success,
                    TITLE,
                    &format!("Completed {}, {} exams completed so far", name, completed),
                    progress,
                );
            } else {
                summary.failed += 1;
                self.emit(Severity::Info, TITLE, &format!("{} not passed", name), progress);
            }
        }
        debug!(?summary, "Exam tasks done");
        summary
    }

    async fn list_plans(&self) -> Result<Vec<Value>, AppError> {
        let paginator = Paginator::new(self.client, self.config.page_size);
        let mut records = Vec::new();
        for is_finished in FINISHED_FILTERS {
            let mut params = Map::new();
            params.insert("isFinished".to_string(), json!(is_finished));
            params.insert("isMy".to_string(), json!("1"));
            params.insert("total".to_string(), json!(0));
            let PageSet { records: page, .. } = paginator.fetch_all(EXAM_LIST_ENDPOINT, &params).await?;
            records.extend(page);
        }
        Ok(records)
    }

    /// Start, answer and submit one exam. True when the score passes.
    async fn take(&self, plan: &ExamPlan, name: &str) -> bool {
        let limit = self.config.exam_time_limit;
        let outcome = self
            .client
            .post(EXAM_START_ENDPOINT, plan.start_payload(limit))
            .await;
        if let Some(message) = outcome.api_failure() {
            self.reporter
                .error(name, &format!("Failed to fetch questions: {}", message));
            return false;
        }
        let Some(questions) = outcome.payload().and_then(Question::list_from) else {
            self.reporter
                .error(name, "Failed to fetch questions: no question data");
            return false;
        };

        self.reporter
            .info(name, &format!("Answering {} questions", questions.len()));
        for (index, question) in questions.iter().enumerate() {
            pause(self.config).await;
            let body = question.answer_payload(index, limit, self.config.exam_answer_delay);
            let outcome = self.client.post(EXAM_ANSWER_ENDPOINT, body).await;
            let title = format!("{} Q{}", name, index + 1);
            if outcome.payload().is_some_and(answer_accepted) {
                self.reporter.success(&title, "Answer accepted");
            } else {
                self.reporter.error(&title, "Answer rejected");
            }
        }
        self.reporter.success(name, "Answering finished");

        self.submit(plan, name).await
    }

    async fn submit(&self, plan: &ExamPlan, name: &str) -> bool {
        let outcome = self
            .client
            .post(EXAM_SUBMIT_ENDPOINT, plan.submit_payload())
            .await;
        let Some(score) = outcome.payload().and_then(parse_score) else {
            self.reporter.error(name, "Submission failed: no score returned");
            return false;
        };

        if score >= self.config.exam_pass_score {
            self.reporter
                .success(name, &format!("Exam passed with score {}", score));
            true
        } else {
            self.reporter
                .error(name, &format!("Exam failed with score {}", score));
            false
        }
    }

    fn emit(&self, severity: Severity, title: &str, content: &str, progress: f64) {
        self.reporter
            .emit(Event::new(severity, title, content).progress(progress));
    }
}
