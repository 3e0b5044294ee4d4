use serde_json::{Map, Value};

use super::{field_or_null, field_text};

/// Course type code for video courses, the only kind that can be completed.
pub const VIDEO_COURSE_TYPE: &str = "1";

/// One unfinished course plan row from `queryAppTCPList`.
#[derive(Debug, Clone, PartialEq)]
pub struct Course(Map<String, Value>);

impl Course {
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
        field_text(&self.0, "courseName")
    }

    pub fn id(&self) -> Option<String> {
        field_text(&self.0, "courseId")
    }

    /// Rows without a name or id cannot be reported or completed.
    pub fn is_complete(&self) -> bool {
        self.name().is_some() && self.id().is_some()
    }

    pub fn is_video(&self) -> bool {
        field_text(&self.0, "courseTrainTypeCode").as_deref() == Some(VIDEO_COURSE_TYPE)
    }

    /// Body for `updateTCP`: the row itself, marked finished with the full
    /// video time watched.
    pub fn completion_payload(&self) -> Value {
        let mut body = self.0.clone();
        let video_time = field_or_null(&self.0, "videoTime");
        body.insert("isFinished".to_string(), Value::from("1"));
        body.insert("status".to_string(), Value::from("1"));
        body.insert("haveVideoTime".to_string(), video_time.clone());
        body.insert("pauseVideoTime".to_string(), video_time);

        let params = match self.0.get("params") {
            Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
            Some(Value::Array(items)) if !items.is_empty() => Value::Array(items.clone()),
            _ => Value::Object(Map::new()),
        };
        body.insert("params".to_string(), params);
        Value::Object(body)
    }
}
