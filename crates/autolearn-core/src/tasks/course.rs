use serde_json::{json, Map, Value};
use tracing::debug;

use super::{pause, percent, TaskSummary};
use crate::api::{ApiClient, Paginator};
use crate::config::Config;
use crate::models::Course;
use crate::report::{Event, EventReporter, Severity};

pub const COURSE_LIST_ENDPOINT: &str = "app/trainCoursePlan/queryAppTCPList";
pub const COURSE_UPDATE_ENDPOINT: &str = "app/trainCoursePlan/updateTCP";

const TITLE: &str = "Courses";

pub struct CourseRunner<'a> {
    config: &'a Config,
    client: &'a ApiClient,
    reporter: EventReporter,
}

impl<'a> CourseRunner<'a> {
    pub fn new(config: &'a Config, client: &'a ApiClient) -> Self {
        Self {
            config,
            client,
            reporter: client.reporter().clone(),
        }
    }

    /// Mark every unfinished video course as watched.
    pub async fn run(&self) -> TaskSummary {
        let mut summary = TaskSummary::default();
        self.reporter.info(TITLE, "Starting course tasks");

        let mut params = Map::new();
        params.insert("isFinished".to_string(), json!("0"));
        params.insert("total".to_string(), json!(0));
        let pages = match Paginator::new(self.client, self.config.page_size)
            .fetch_all(COURSE_LIST_ENDPOINT, &params)
            .await
        {
            Ok(pages) => pages,
            Err(e) => {
                self.reporter
                    .error(TITLE, &format!("Failed to fetch courses: {}", e.message));
                return summary;
            }
        };

        let total = pages.records.len();
        summary.found = total;
        if total == 0 {
            self.reporter.info(TITLE, "No pending course tasks");
            return summary;
        }
        self.reporter
            .success(TITLE, &format!("Found {} course tasks", total));

        for (index, record) in pages.records.into_iter().enumerate() {
            let progress = percent(index + 1, total);
            match self.complete(record, progress).await {
                Step::Completed => summary.completed += 1,
                Step::Skipped => summary.skipped += 1,
                Step::Failed => summary.failed += 1,
            }
        }
        debug!(?summary, "Course tasks done");
        summary
    }

    async fn complete(&self, record: Value, progress: f64) -> Step {
        let course = match Course::from_value(record) {
            Some(course) if course.is_complete() => course,
            _ => {
                self.emit(Severity::Error, TITLE, "Incomplete course record, skipped", progress);
                return Step::Skipped;
            }
        };
        let name = course.name().unwrap_or_default();
        if !course.is_video() {
            self.emit(
                Severity::Warning,
                TITLE,
                &format!("{}: non-video courses are not supported yet", name),
                progress,
            );
            return Step::Skipped;
        }

        self.reporter
            .info(TITLE, &format!("Starting course: {}", name));
        pause(self.config).await;

        let outcome = self
            .client
            .post(COURSE_UPDATE_ENDPOINT, course.completion_payload())
            .await;
        if let Some(message) = outcome.api_failure() {
            self.emit(
                Severity::Error,
                &name,
                &format!("Course completion failed: {}", message),
                progress,
            );
            return Step::Failed;
        }

        self.reporter.success(&name, "Course completed");
        let completed = self.reporter.record_course_completed();
        self.emit(
            Severity::Success,
            TITLE,
            &format!("Completed {}, {} courses completed so far", name, completed),
            progress,
        );
        Step::Completed
    }

    fn emit(&self, severity: Severity, title: &str, content: &str, progress: f64) {
        self.reporter
            .emit(Event::new(severity, title, content).progress(progress));
    }
}

enum Step {
    Completed,
    Skipped,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{
        json_response, live_messages, request_body, test_reporter, MockTransport, TEST_BASE_URL,
    };
    use crate::api::StreamTransport;
    use std::sync::Arc;

    fn config() -> Config {
        Config {
            api_base_url: TEST_BASE_URL.to_string(),
            api_max_retries: 1,
            page_size: 10,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_completes_video_courses_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let (reporter, channel) = test_reporter(dir.path());
        let mock = MockTransport::new(|_, request| {
            if request.url.ends_with(COURSE_LIST_ENDPOINT) {
                json_response(json!({"total": 4, "rows": [
                    {"courseId": 1, "courseName": "Video A", "courseTrainTypeCode": "1", "videoTime": 300, "params": {}},
                    {"courseId": 2, "courseName": "Reading B", "courseTrainTypeCode": "2"},
                    {"courseName": "No id"},
                    {"courseId": 4, "courseName": "Video D", "courseTrainTypeCode": "1", "videoTime": 60}
                ]}))
            } else if request_body(request)["courseId"] == 4 {
                json_response(json!({"code": 500, "msg": "locked"}))
            } else {
                json_response(json!({"code": 200}))
            }
        });
        let config = config();
        let client = ApiClient::with_transports(&config, reporter.clone(), Some(mock.clone()), Arc::new(StreamTransport::new()));

        let summary = CourseRunner::new(&config, &client).run().await;

        assert_eq!(
            summary,
            TaskSummary { found: 4, completed: 1, skipped: 2, failed: 1 }
        );
        assert_eq!(reporter.counters().courses_completed, 1);

        let updates: Vec<Value> = mock
            .requests()
            .iter()
            .filter(|r| r.url.ends_with(COURSE_UPDATE_ENDPOINT))
            .map(request_body)
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0]["haveVideoTime"], 300);
        assert_eq!(updates[0]["isFinished"], "1");

        let messages = live_messages(&channel);
        let last = messages.last().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert_eq!(last.progress, Some(100));
        assert!(messages
            .iter()
            .any(|m| m.title == TITLE && m.progress == Some(25) && m.content.contains("Completed Video A")));
    }

    #[tokio::test]
    async fn test_list_failure_stops_runner() {
        let dir = tempfile::tempdir().unwrap();
        let (reporter, channel) = test_reporter(dir.path());
        let mock = MockTransport::new(|_, _| json_response(json!({"code": 500, "msg": "offline"})));
        let config = config();
        let client = ApiClient::with_transports(&config, reporter, Some(mock.clone()), Arc::new(StreamTransport::new()));

        let summary = CourseRunner::new(&config, &client).run().await;

        assert_eq!(summary, TaskSummary::default());
        assert_eq!(mock.calls(), 1);
        let messages = live_messages(&channel);
        assert_eq!(messages.last().unwrap().content, "Failed to fetch courses: offline");
    }

    #[tokio::test]
    async fn test_no_courses() {
        let dir = tempfile::tempdir().unwrap();
        let (reporter, channel) = test_reporter(dir.path());
        let mock = MockTransport::new(|_, _| json_response(json!({"total": 0, "rows": []})));
        let config = config();
        let client = ApiClient::with_transports(&config, reporter, Some(mock), Arc::new(StreamTransport::new()));

        let summary = CourseRunner::new(&config, &client).run().await;
        assert_eq!(summary.found, 0);
        assert_eq!(live_messages(&channel).last().unwrap().content, "No pending course tasks");
    }
}
