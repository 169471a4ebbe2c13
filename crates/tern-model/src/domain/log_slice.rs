use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of event produced while slicing a log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogSliceType {
    Start,
    Content,
    Done,
    Fail,
    Result,
    Phase,
    Abandoned,
}

impl LogSliceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSliceType::Start => "START",
            LogSliceType::Content => "CONTENT",
            LogSliceType::Done => "DONE",
            LogSliceType::Fail => "FAIL",
            LogSliceType::Result => "RESULT",
            LogSliceType::Phase => "PHASE",
            LogSliceType::Abandoned => "ABANDONED",
        }
    }

    /// Returns `true` for the events that close a started slice.
    pub fn is_closing(&self) -> bool {
        matches!(
            self,
            LogSliceType::Done | LogSliceType::Fail | LogSliceType::Abandoned
        )
    }
}

impl fmt::Display for LogSliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event of a sliced log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSliceEvent {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: LogSliceType,
    pub payload: String,
}

impl LogSliceEvent {
    pub fn new(name: impl Into<String>, r#type: LogSliceType, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type,
            payload: payload.into(),
        }
    }
}

impl fmt::Display for LogSliceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {:?})", self.r#type, self.name, self.payload)
    }
}
