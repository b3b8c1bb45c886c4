use std::sync::Arc;

use tracing::{debug, warn};

use crate::generator::outline::strip_numbering;
use crate::generator::research::metrics::normalize_query;
use crate::i18n::ReportLanguage;
use crate::llm::LanguageModel;
use crate::utils::text::{strip_code_fences, truncate_chars};

/// 检索词的最大长度（字符）
const MAX_QUERY_CHARS: usize = 64;

/// 按轮次生成检索词：首轮取关键词，第二轮换角度，之后深挖法规与流程
pub struct QueryPlanner {
    llm: Arc<dyn LanguageModel>,
    language: ReportLanguage,
}

impl QueryPlanner {
    pub fn new(llm: Arc<dyn LanguageModel>, language: ReportLanguage) -> Self {
        Self { llm, language }
    }

    pub async fn next_query(
        &self,
        topic: &str,
        chapter_title: &str,
        round: u32,
        used_queries: &[String],
    ) -> String {
        let strategy = match round {
            1 => "从章节标题中提取最核心的一个检索关键词。",
            2 => "换一个不同的角度提出检索词，必须与已用检索词不同。",
            _ => "深入挖掘与本章相关的法律依据、监管流程或处罚关系，避免与已用检索词重复。",
        };
        let used = if used_queries.is_empty() {
            "（无）".to_string()
        } else {
            used_queries.join("；")
        };

        let system_prompt = format!(
            "你是本地知识库的检索助手。只输出一个简短的检索词，不要解释，不要加引号。\n{}",
            self.language.prompt_instruction()
        );
        let user_prompt = format!(
            "报告主题：{}\n章节：{}\n第 {} 轮检索。{}\n已用检索词：{}",
            truncate_chars(topic, 300),
            chapter_title,
            round,
            strategy,
            used
        );

        let candidate = match self.llm.complete(&system_prompt, &user_prompt).await {
            Ok(raw) => clean_query(&raw),
            Err(e) => {
                warn!(chapter = %chapter_title, round, error = %e, "⚠️ 检索词生成失败，使用兜底检索词");
                String::new()
            }
        };

        if candidate.is_empty() || is_used(&candidate, used_queries) {
            let fallback = fallback_query(chapter_title, round, used_queries, self.language);
            debug!(chapter = %chapter_title, round, query = %fallback, "使用兜底检索词");
            return fallback;
        }
        candidate
    }
}

/// 取模型回复的第一行并去掉引号、标签等修饰
fn clean_query(raw: &str) -> String {
    let cleaned = strip_code_fences(raw);
    let line = cleaned
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    let line = ["检索词：", "检索词:", "query:", "Query:", "từ khóa:"]
        .iter()
        .find_map(|label| line.strip_prefix(*label))
        .unwrap_or(line);

    let line = line.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '「' | '」' | '“' | '”' | '《' | '》')
    });
    line.chars().take(MAX_QUERY_CHARS).collect()
}

fn is_used(query: &str, used_queries: &[String]) -> bool {
    let normalized = normalize_query(query);
    used_queries.iter().any(|q| normalize_query(q) == normalized)
}

/// 由章节标题推导的确定性检索词
///
/// 标题首个词加上轮次对应的后缀；仍然重复时追加轮次号。
pub fn fallback_query(
    chapter_title: &str,
    round: u32,
    used_queries: &[String],
    language: ReportLanguage,
) -> String {
    let title = strip_numbering(chapter_title);
    let base = title
        .split(|c: char| c.is_whitespace() || matches!(c, '、' | '，' | ',' | '：' | ':' | '/'))
        .find(|token| !token.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| chapter_title.trim().to_string());

    let suffixes = language.query_suffixes();
    let suffix = suffixes[(round.max(1) as usize - 1) % suffixes.len()];
    let query = if suffix.is_empty() {
        base
    } else {
        format!("{} {}", base, suffix)
    };

    if !is_used(&query, used_queries) {
        return query;
    }

    let numbered = format!("{} {}", query, round);
    if !is_used(&numbered, used_queries) {
        return numbered;
    }

    (2..)
        .map(|n| format!("{} {}-{}", query, round, n))
        .find(|candidate| !is_used(candidate, used_queries))
        .unwrap_or(numbered)
}
