use serde_json::{json, Map, Value};

use super::{field_or_null, field_text};

/// `startAnswer` responds with this bare value when an answer is accepted.
pub const ANSWER_ACCEPTED: i64 = 2;

/// One exam plan row from `queryExamPlans`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamPlan(Map<String, Value>);

impl ExamPlan {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn name(&self) -> Option<String> {
        field_text(&self.0, "exaName")
    }

    /// The plan id, passed back exactly as the portal sent it.
    pub fn plan_id(&self) -> Option<&Value> {
        self.0.get("exaPlanId").filter(|v| !v.is_null())
    }

    pub fn is_complete(&self) -> bool {
        self.name().is_some() && self.plan_id().is_some()
    }

    /// Body for `startExamPlan`.
    pub fn start_payload(&self, time_limit_secs: u64) -> Value {
        let or = |key: &str, default: Value| self.0.get(key).cloned().unwrap_or(default);
        json!({
            "reExaTimeSec": time_limit_secs.to_string(),
            "isFinished": or("isFinished", json!(0)),
            "isPass": or("isPass", json!(0)),
            "exaTypeCode": or("exaTypeCode", json!("")),
            "exaCount": or("exaCount", json!(0)),
            "exaPlanId": field_or_null(&self.0, "exaPlanId"),
        })
    }

    /// Body for `startFinalAnswer`.
    pub fn submit_payload(&self) -> Value {
        json!({ "exaPlanId": field_or_null(&self.0, "exaPlanId") })
    }
}

/// One entry of `userSubjects`. Carries its own correct answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Question(Map<String, Value>);

impl Question {
    /// Questions from a `startExamPlan` response, `None` when the list is missing.
    pub fn list_from(payload: &Value) -> Option<Vec<Question>> {
        let subjects = payload.get("userSubjects")?.as_array()?;
        Some(
            subjects
                .iter()
                .map(|s| Question(s.as_object().cloned().unwrap_or_default()))
                .collect(),
        )
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Body for `startAnswer` for the question at zero-based `index`.
    /// The remaining time counts down one answer delay per question.
    pub fn answer_payload(&self, index: usize, time_limit_secs: u64, answer_delay_secs: u64) -> Value {
        let elapsed = (index as u64 + 1).saturating_mul(answer_delay_secs);
        let remaining = time_limit_secs as i64 - elapsed.min(i64::MAX as u64) as i64;
        json!({
            "reExaTimeSec": remaining,
            "exaPlanId": field_or_null(&self.0, "exaPlanId"),
            "isTrue": "1",
            "subId": field_or_null(&self.0, "subId"),
            "subChoose": field_or_null(&self.0, "subTrueAnswer"),
            "sortNum": field_or_null(&self.0, "sortNum"),
        })
    }
}

/// Whether a `startAnswer` response means the answer was taken.
pub fn answer_accepted(payload: &Value) -> bool {
    payload.as_i64() == Some(ANSWER_ACCEPTED)
}

/// The `score` of a `startFinalAnswer` response, as a number or numeric string.
/// Fractions are truncated.
pub fn parse_score(payload: &Value) -> Option<i64> {
    match payload.get("score")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_payload_defaults() {
        let plan = ExamPlan::from_value(json!({"exaName": "Q3", "exaPlanId": "p-9", "isPass": 1})).unwrap();
        assert_eq!(
            plan.start_payload(1800),
            json!({
                "reExaTimeSec": "1800",
                "isFinished": 0,
                "isPass": 1,
                "exaTypeCode": "",
                "exaCount": 0,
                "exaPlanId": "p-9"
            })
        );
        assert_eq!(plan.submit_payload(), json!({"exaPlanId": "p-9"}));
    }

    #[test]
    fn test_answer_payload_counts_down() {
        let questions = Question::list_from(&json!({
            "userSubjects": [
                {"exaPlanId": 5, "subId": 100, "subTrueAnswer": "A", "sortNum": 1},
                {"exaPlanId": 5, "subId": 101, "subTrueAnswer": "B,C", "sortNum": 2}
            ]
        }))
        .unwrap();

        let second = questions[1].answer_payload(1, 1800, 30);
        assert_eq!(second["reExaTimeSec"], 1740);
        assert_eq!(second["subChoose"], "B,C");
        assert_eq!(second["subId"], 101);
        assert_eq!(second["isTrue"], "1");
        assert_eq!(second["sortNum"], 2);
        assert_eq!(questions[0].answer_payload(0, 1800, 30)["reExaTimeSec"], 1770);
    }

    #[test]
    fn test_missing_subjects() {
        assert!(Question::list_from(&json!({"code": 200})).is_none());
        assert!(Question::list_from(&json!({"userSubjects": "none"})).is_none());
        assert_eq!(Question::list_from(&json!({"userSubjects": []})).unwrap().len(), 0);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(&json!({"score": 95})), Some(95));
        assert_eq!(parse_score(&json!({"score": "88"})), Some(88));
        assert_eq!(parse_score(&json!({"score": 90.5})), Some(90));
        assert_eq!(parse_score(&json!({"score": null})), None);
        assert_eq!(parse_score(&json!({})), None);
    }

    #[test]
    fn test_answer_accepted() {
        assert!(answer_accepted(&json!(2)));
        assert!(!answer_accepted(&json!("2")));
        assert!(!answer_accepted(&json!({"code": 500})));
    }

    #[test]
    fn test_plan_completeness() {
        assert!(!ExamPlan::from_value(json!({"exaName": "x", "exaPlanId": null})).unwrap().is_complete());
        assert!(ExamPlan::from_value(json!({"exaName": "x", "exaPlanId": 0})).unwrap().is_complete());
    }
}
