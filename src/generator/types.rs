use serde::{Deserialize, Serialize};

use crate::evidence::is_no_evidence;
use crate::i18n::ReportLanguage;

/// 报告模式，决定角色设定与轮次策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// 结构化报关单审查
    Customs,
    /// 开放式研究
    Research,
}

impl std::fmt::Display for ReportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportMode::Customs => write!(f, "customs"),
            ReportMode::Research => write!(f, "research"),
        }
    }
}

impl ReportMode {
    pub fn label(&self, language: ReportLanguage) -> &'static str {
        match (self, language) {
            (ReportMode::Customs, ReportLanguage::Chinese) => "报关单合规审查",
            (ReportMode::Customs, ReportLanguage::English) => "customs declaration audit",
            (ReportMode::Customs, ReportLanguage::Vietnamese) => "kiểm tra tờ khai hải quan",
            (ReportMode::Research, ReportLanguage::Chinese) => "开放式研究",
            (ReportMode::Research, ReportLanguage::English) => "open research",
            (ReportMode::Research, ReportLanguage::Vietnamese) => "nghiên cứu mở",
        }
    }
}

/// 单轮检索记录，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// 轮次，从1开始
    pub round: u32,
    pub query: String,
    pub snippet: String,
    /// 相似度，范围 [0,1]
    pub score: f64,
    /// 证据来源文件，检索失败时为 "system"
    pub source: String,
}

impl SearchRecord {
    /// 本轮是否拿到了真实证据
    pub fn has_evidence(&self) -> bool {
        !is_no_evidence(&self.snippet)
    }

    /// 写入全局笔记本的摘要
    pub fn note(&self, chapter_title: &str) -> String {
        let excerpt: String = self.snippet.chars().take(80).collect();
        let ellipsis = if self.snippet.chars().count() > 80 {
            "..."
        } else {
            ""
        };
        format!(
            "[{}] R{} 「{}」 → {}{} ({:.0}%)",
            chapter_title,
            self.round,
            self.query,
            excerpt,
            ellipsis,
            self.score * 100.0
        )
    }
}

/// 章节在目录中的位置
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterInfo {
    /// 从0开始的章节序号
    pub index: usize,
    pub title: String,
    pub total: usize,
}

impl ChapterInfo {
    /// 最后一章为总结章节，不触发检索
    pub fn is_synthesis(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// 每轮重建的检索上下文；质量评分只依赖这里的数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub chapter_index: usize,
    pub chapter_title: String,
    pub total_chapters: usize,
    pub current_round: u32,
    pub min_rounds: u32,
    pub max_rounds: u32,
    pub mode: ReportMode,
    /// 之前轮次的记录，不含本轮
    pub search_history: Vec<SearchRecord>,
    pub current_query: String,
    pub current_snippet: String,
    pub current_score: f64,
}

impl ResearchContext {
    /// 本轮及之前所有片段
    pub fn all_snippets(&self) -> impl Iterator<Item = &str> {
        self.search_history
            .iter()
            .map(|r| r.snippet.as_str())
            .chain(std::iter::once(self.current_snippet.as_str()))
    }

    /// 本章是否已拿到过至少一条真实证据
    pub fn has_any_evidence(&self) -> bool {
        self.all_snippets().any(|s| !is_no_evidence(s))
    }

    /// 回退到上一轮时的上下文，用于计算质量趋势
    pub fn previous_round(&self) -> Option<ResearchContext> {
        let (last, earlier) = self.search_history.split_last()?;
        Some(ResearchContext {
            current_round: last.round,
            search_history: earlier.to_vec(),
            current_query: last.query.clone(),
            current_snippet: last.snippet.clone(),
            current_score: last.score,
            ..self.clone()
        })
    }
}
