//! App error type for ingestion and sidecar commands. Implements Display and Serialize for frontend.

use crate::ffmpeg::parse_tool_error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ToolNotFound(String),

    #[error("{tool} failed (code {code}): {stderr}")]
    ToolFailed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("{0}")]
    Parse(String),

    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: &'static str, secs: u64 },
}

impl AppError {
    pub fn tool_failed(tool: &'static str, code: i32, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool,
            code,
            stderr: stderr.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// True when the failure came from the external tool itself (missing, crashed, bad exit,
    /// unparseable output). Those degrade to "no metadata" instead of failing ingestion.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            AppError::ToolNotFound(_)
                | AppError::ToolFailed { .. }
                | AppError::Parse(_)
                | AppError::TimedOut { .. }
        )
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AppError::ToolFailed { tool, code, stderr } => {
                let payload = parse_tool_error(tool, stderr, Some(*code));
                let json =
                    serde_json::json!({ "summary": payload.summary, "detail": payload.detail });
                serializer.serialize_str(&json.to_string())
            }
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_serializes_as_plain_message() {
        let e = AppError::parse("Invalid params payload: missing field `index`");
        assert_eq!(
            serde_json::to_string(&e).unwrap(),
            r#""Invalid params payload: missing field `index`""#
        );
        assert!(!e.to_string().contains("ffmpeg"));
    }

    #[test]
    fn tool_failures_are_classified() {
        assert!(AppError::tool_failed("ffprobe", 1, "bad").is_tool_failure());
        assert!(AppError::parse("bad json").is_tool_failure());
        assert!(AppError::TimedOut { tool: "ffmpeg", secs: 5 }.is_tool_failure());
        let io = AppError::from(std::io::Error::other("disk"));
        assert!(!io.is_tool_failure());
    }

    #[test]
    fn serialize_tool_failure_as_summary_json() {
        let e = AppError::tool_failed("ffprobe", 1, "Invalid data found");
        let s = serde_json::to_string(&e).unwrap();
        let inner: String = serde_json::from_str(&s).unwrap();
        let v: serde_json::Value = serde_json::from_str(&inner).unwrap();
        assert_eq!(v["summary"], "ffprobe failed.");
        assert_eq!(v["detail"], "Invalid data found");
    }

    #[test]
    fn timed_out_display() {
        let e = AppError::TimedOut {
            tool: "ffprobe",
            secs: 30,
        };
        assert_eq!(e.to_string(), "ffprobe timed out after 30s");
    }
}
