//! Streaming response types.

use serde::{Deserialize, Serialize};

/// A chunk from a streaming model response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content is starting.
    TextStart,
    /// Text content delta.
    TextDelta(String),
    /// Text content ended.
    TextEnd,

    /// A tool call is starting.
    ToolCallStart {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
    },
    /// Tool call completed.
    ToolCall {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Complete arguments JSON.
        arguments: String,
    },

    /// A step in the response is finishing.
    FinishStep {
        /// Token usage for this step.
        usage: Usage,
        /// Reason for finishing.
        finish_reason: FinishReason,
    },

    /// An error occurred.
    Error(String),
}

impl StreamChunk {
    /// Create a text delta chunk.
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta(delta.into())
    }

    /// Create a tool call completed chunk.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Create a finish chunk with empty usage.
    pub fn finish(finish_reason: FinishReason) -> Self {
        Self::FinishStep {
            usage: Usage::default(),
            finish_reason,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens used.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens (input + output).
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Merge with another usage (adding all counts).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Reason for finishing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Normal completion (end of turn).
    #[default]
    EndTurn,
    /// Stopped due to stop sequence.
    Stop,
    /// Stopped due to max tokens.
    MaxTokens,
    /// Stopped for tool use.
    ToolUse,
    /// Content was filtered.
    ContentFilter,
    /// Unknown or other reason.
    Other,
}

impl FinishReason {
    /// Parse from a Converse `stopReason`.
    pub fn from_converse(reason: &str) -> Self {
        match reason {
            "end_turn" => Self::EndTurn,
            "stop_sequence" => Self::Stop,
            "max_tokens" => Self::MaxTokens,
            "tool_use" => Self::ToolUse,
            "content_filtered" | "guardrail_intervened" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_merge() {
        let mut usage1 = Usage::new(100, 50);
        let usage2 = Usage::new(200, 100);

        usage1.merge(&usage2);

        assert_eq!(usage1.input_tokens, 300);
        assert_eq!(usage1.output_tokens, 150);
        assert_eq!(usage1.total(), 450);
    }

    #[test]
    fn test_finish_reason_parsing() {
        assert_eq!(FinishReason::from_converse("end_turn"), FinishReason::EndTurn);
        assert_eq!(FinishReason::from_converse("tool_use"), FinishReason::ToolUse);
        assert_eq!(
            FinishReason::from_converse("guardrail_intervened"),
            FinishReason::ContentFilter
        );
        assert_eq!(FinishReason::from_converse("weird"), FinishReason::Other);
    }
}
