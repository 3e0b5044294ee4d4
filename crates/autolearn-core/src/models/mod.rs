//! Portal payloads for courses and exams.
//!
//! Records are kept as the raw JSON maps the portal returns and are echoed
//! back largely unmodified, so only the fields the task runners read get
//! accessors:
//!
//! - `Course`: a training course plan row
//! - `ExamPlan`, `Question`: an exam plan row and one of its questions

pub mod course;
pub mod exam;

pub use course::Course;
pub use exam::{answer_accepted, parse_score, ExamPlan, Question};

use serde_json::{Map, Value};

/// Text form of a field that may arrive as a string or a number.
pub(crate) fn field_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A field echoed back as-is, `null` when absent.
pub(crate) fn field_or_null(map: &Map<String, Value>, key: &str) -> Value {
    map.get(key).cloned().unwrap_or(Value::Null)
}
