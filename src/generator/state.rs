use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::evidence::fingerprint;
use crate::generator::types::ReportMode;
use crate::i18n::ReportLanguage;

/// 单次报告请求的全部可变状态，由生成任务独占，流结束即丢弃
#[derive(Debug, Clone)]
pub struct GenerationState {
    pub request_id: Uuid,
    pub topic: String,
    pub mode: ReportMode,
    pub language: ReportLanguage,
    pub toc: Vec<String>,
    /// 只追加的报告正文，唯一需要导出的内容
    pub report_text: String,
    pub global_notebook: Vec<String>,
    /// 本次请求中已采用过的片段指纹
    pub used_snippet_fingerprints: HashSet<String>,
    pub started_at: DateTime<Utc>,
    pub completed_chapters: usize,
}

impl GenerationState {
    pub fn new(topic: &str, mode: ReportMode, language: ReportLanguage) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            topic: topic.to_string(),
            mode,
            language,
            toc: Vec::new(),
            report_text: String::new(),
            global_notebook: Vec::new(),
            used_snippet_fingerprints: HashSet::new(),
            started_at: Utc::now(),
            completed_chapters: 0,
        }
    }

    pub fn append_report(&mut self, text: &str) {
        self.report_text.push_str(text);
    }

    pub fn record_note(&mut self, note: String) {
        self.global_notebook.push(note);
    }

    pub fn is_snippet_used(&self, snippet: &str) -> bool {
        self.used_snippet_fingerprints
            .contains(&fingerprint(snippet))
    }

    /// 记录片段指纹，首次记录时返回 true
    pub fn mark_snippet_used(&mut self, snippet: &str) -> bool {
        self.used_snippet_fingerprints.insert(fingerprint(snippet))
    }

    pub fn complete_chapter(&mut self) {
        self.report_text.push_str("\n\n");
        self.completed_chapters += 1;
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}
