//! 推送给客户端的报告事件，统一为 `{type, payload}` 结构

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generator::research::decision::DecisionSource;
use crate::generator::research::metrics::QualityMetrics;
use crate::generator::types::ReportMode;
use crate::i18n::ReportLanguage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ReportEvent {
    Init {
        request_id: Uuid,
        topic: String,
        mode: ReportMode,
        language: ReportLanguage,
    },
    Thought(String),
    Toc(Vec<String>),
    StepStart {
        index: usize,
        title: String,
    },
    RagSearch {
        round: u32,
        query: String,
    },
    RagResult {
        filename: String,
        snippet: String,
        score: f64,
    },
    TakeNote {
        content: String,
    },
    ResearchDecision {
        round: u32,
        /// "continue" 或 "stop"
        decision: String,
        reason: String,
        source: DecisionSource,
        confidence: f64,
        metrics: QualityMetrics,
    },
    ReportChunk(String),
    StepDone {
        index: usize,
    },
    Done {
        request_id: Uuid,
        chapters: usize,
        report_chars: usize,
        elapsed_ms: i64,
    },
    Error(String),
}

impl ReportEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ReportEvent::Init { .. } => "init",
            ReportEvent::Thought(_) => "thought",
            ReportEvent::Toc(_) => "toc",
            ReportEvent::StepStart { .. } => "step_start",
            ReportEvent::RagSearch { .. } => "rag_search",
            ReportEvent::RagResult { .. } => "rag_result",
            ReportEvent::TakeNote { .. } => "take_note",
            ReportEvent::ResearchDecision { .. } => "research_decision",
            ReportEvent::ReportChunk(_) => "report_chunk",
            ReportEvent::StepDone { .. } => "step_done",
            ReportEvent::Done { .. } => "done",
            ReportEvent::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportEvent::Done { .. } | ReportEvent::Error(_))
    }

    /// SSE 帧：`data: <json>\n\n`
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "payload": e.to_string() }).to_string()
        });
        format!("data: {}\n\n", json)
    }
}
