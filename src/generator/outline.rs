//! 报告目录规划

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::generator::types::ReportMode;
use crate::i18n::ReportLanguage;
use crate::llm::LanguageModel;
use crate::utils::text::{extract_delimited, strip_code_fences, truncate_chars};

/// 标题前已有的编号：1. / 1.2 / 一、 / (1) / 第一章 / Chapter 1: / II.
static NUMBERING_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:第[0-9一二三四五六七八九十]+[章节部分]|(?:chapter|section|chương|phần)\s*[0-9]+[.:、]?|[0-9]+(?:\.[0-9]+)*(?:[.、)）:：]|\s)|[（(][0-9一二三四五六七八九十]+[)）]|[一二三四五六七八九十]+[、.]|[ivx]+\.)\s*",
    )
    .expect("numbering regex is valid")
});

/// 对象形式的章节元素中可能承载标题的键
const TITLE_KEYS: [&str; 5] = ["title", "name", "chapter", "heading", "section"];

/// 去掉标题前的 markdown 标记和编号
pub fn strip_numbering(title: &str) -> String {
    let trimmed = title.trim().trim_start_matches(['#', '*']).trim();
    NUMBERING_PREFIX
        .replace(trimmed, "")
        .trim()
        .trim_end_matches('*')
        .trim()
        .to_string()
}

fn element_title(element: &Value) -> Option<String> {
    match element {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => TITLE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .or_else(|| map.values().find_map(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// 规整章节标题：去编号、去空标题、按上限截断并重新编号
///
/// 超过 `max_chapters` 时保留最后的总结章节。
pub fn normalize_titles<S: AsRef<str>>(titles: &[S], max_chapters: usize) -> Vec<String> {
    let mut titles: Vec<String> = titles
        .iter()
        .map(|t| strip_numbering(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect();

    let max_chapters = max_chapters.max(1);
    if titles.len() > max_chapters {
        if let Some(last) = titles.pop() {
            titles.truncate(max_chapters - 1);
            titles.push(last);
        }
    }

    titles
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {}", i + 1, t))
        .collect()
}

/// 解析模型返回的目录；无法解析或结果为空时返回 None
pub fn parse_outline(raw: &str, max_chapters: usize) -> Option<Vec<String>> {
    let cleaned = strip_code_fences(raw);
    let json = extract_delimited(&cleaned, '[', ']')?;
    let elements: Vec<Value> = serde_json::from_str(json).ok()?;

    let titles: Vec<String> = elements.iter().filter_map(element_title).collect();
    let toc = normalize_titles(&titles, max_chapters);
    (!toc.is_empty()).then_some(toc)
}

/// 通过一次模型调用规划章节目录，任何失败都回退到标准目录
pub struct OutlinePlanner {
    llm: Arc<dyn LanguageModel>,
    language: ReportLanguage,
    guidance: String,
}

impl OutlinePlanner {
    pub fn new(llm: Arc<dyn LanguageModel>, language: ReportLanguage, guidance: &str) -> Self {
        Self {
            llm,
            language,
            guidance: guidance.to_string(),
        }
    }

    pub async fn plan(&self, topic: &str, mode: ReportMode, max_chapters: usize) -> Vec<String> {
        let system_prompt = format!(
            "{}\n\n你负责为报告规划章节目录。只输出一个 JSON 字符串数组，例如 [\"1. 标题\", \"2. 标题\"]，不要输出其他内容。最后一章必须是总结与建议。\n{}",
            self.guidance,
            self.language.prompt_instruction()
        );
        let user_prompt = format!(
            "报告类型：{}\n章节数量：3 到 {} 章\n\n主题/数据：\n{}",
            mode.label(self.language),
            max_chapters,
            truncate_chars(topic, 2000)
        );

        match self.llm.complete(&system_prompt, &user_prompt).await {
            Ok(raw) => match parse_outline(&raw, max_chapters) {
                Some(toc) => {
                    info!(chapters = toc.len(), "📑 目录规划完成");
                    toc
                }
                None => {
                    warn!(reply = %truncate_chars(&raw, 200), "⚠️ 目录解析失败，使用标准目录");
                    self.fallback(mode, max_chapters)
                }
            },
            Err(e) => {
                warn!(error = %e, "⚠️ 目录规划调用失败，使用标准目录");
                self.fallback(mode, max_chapters)
            }
        }
    }

    fn fallback(&self, mode: ReportMode, max_chapters: usize) -> Vec<String> {
        normalize_titles(&self.language.fallback_outline(mode), max_chapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    use crate::llm::ChunkStream;

    /// 目录规划调用总是失败
    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Err(anyhow!("offline"))
        }

        async fn complete_stream(&self, _system: &str, _user: &str) -> Result<ChunkStream> {
            Err(anyhow!("offline"))
        }
    }

    #[test]
    fn test_strip_numbering_variants() {
        assert_eq!(strip_numbering("1. 申报概览"), "申报概览");
        assert_eq!(strip_numbering("2、风险分析"), "风险分析");
        assert_eq!(strip_numbering("3.1 价格审查"), "价格审查");
        assert_eq!(strip_numbering("第三章 处罚依据"), "处罚依据");
        assert_eq!(strip_numbering("（四）总结"), "总结");
        assert_eq!(strip_numbering("## Chapter 2: Risk Analysis"), "Risk Analysis");
        assert_eq!(strip_numbering("**1. Overview**"), "Overview");
        assert_eq!(strip_numbering("2024年进口趋势"), "2024年进口趋势");
    }

    #[test]
    fn test_parse_outline_strings_and_objects() {
        let raw = r#"```json
[
  "1. 背景",
  {"title": "三、风险因素"},
  {"id": 3, "summary": "结论与建议"}
]
```"#;
        let toc = parse_outline(raw, 8).unwrap();
        assert_eq!(toc, vec!["1. 背景", "2. 风险因素", "3. 结论与建议"]);
    }

    #[test]
    fn test_parse_outline_with_surrounding_text() {
        let raw = "好的，目录如下：[\"概述\", \"分析\", \"总结\"] 以上。";
        let toc = parse_outline(raw, 8).unwrap();
        assert_eq!(toc, vec!["1. 概述", "2. 分析", "3. 总结"]);
    }

    #[test]
    fn test_parse_outline_truncates_keeping_last() {
        let raw = r#"["a", "b", "c", "d", "e", "summary"]"#;
        let toc = parse_outline(raw, 4).unwrap();
        assert_eq!(toc, vec!["1. a", "2. b", "3. c", "4. summary"]);
    }

    #[test]
    fn test_parse_outline_rejects_invalid() {
        assert!(parse_outline("not json", 8).is_none());
        assert!(parse_outline("[]", 8).is_none());
        assert!(parse_outline(r#"["", "  ", 3]"#, 8).is_none());
    }

    #[tokio::test]
    async fn test_fallback_outline_respects_max_chapters() {
        let planner = OutlinePlanner::new(Arc::new(FailingModel), ReportLanguage::Chinese, "");

        let toc = planner.plan("报关单审查", ReportMode::Customs, 3).await;
        assert_eq!(toc, vec!["1. 申报数据概览", "2. 商品归类与税则审查", "3. 改进建议与总结"]);

        let full = planner.plan("报关单审查", ReportMode::Customs, 8).await;
        assert_eq!(full, ReportLanguage::Chinese.fallback_outline(ReportMode::Customs));
    }

    #[test]
    fn test_normalize_titles_single_chapter_keeps_summary() {
        let titles = ["1. 背景", "2. 分析", "3. 总结"];
        assert_eq!(normalize_titles(&titles, 0), vec!["1. 总结"]);
    }
}
