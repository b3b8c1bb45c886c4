//! 检索继续/停止的研判：硬性轮次边界 → AI 研判 → 规则兜底

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RoundPolicy;
use crate::generator::research::metrics::{CoverageArea, QualityMetrics};
use crate::generator::types::ResearchContext;
use crate::i18n::ReportLanguage;
use crate::llm::LanguageModel;
use crate::utils::text::{extract_delimited, strip_code_fences, truncate_chars};

/// AI 研判时附带的历史轮次上限
const JUDGE_HISTORY_ROUNDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Ai,
    Rule,
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionSource::Ai => write!(f, "ai"),
            DecisionSource::Rule => write!(f, "rule"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub continue_research: bool,
    pub reason: String,
    pub source: DecisionSource,
    pub confidence: f64,
    #[serde(default)]
    pub missing_aspects: Vec<String>,
}

impl Decision {
    fn rule(continue_research: bool, confidence: f64, reason: String) -> Self {
        Self {
            continue_research,
            reason,
            source: DecisionSource::Rule,
            confidence,
            missing_aspects: Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        if self.continue_research {
            "continue"
        } else {
            "stop"
        }
    }
}

/// 研判策略
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, context: &ResearchContext, metrics: &QualityMetrics)
    -> Result<Decision>;
}

/// 基于阈值的确定性研判，永不失败
#[derive(Debug, Clone)]
pub struct RuleJudge {
    policy: RoundPolicy,
}

impl RuleJudge {
    pub fn new(policy: RoundPolicy) -> Self {
        Self { policy }
    }

    pub fn decide(&self, context: &ResearchContext, metrics: &QualityMetrics) -> Decision {
        let total = metrics.total_quality;

        if total >= self.policy.early_stop_threshold {
            return Decision::rule(
                false,
                0.9,
                format!(
                    "质量评分 {:.2} 达到提前结束阈值 {:.2}",
                    total, self.policy.early_stop_threshold
                ),
            );
        }

        // 从未拿到真实证据时不止损，继续换角度检索直到轮次上限
        if total < self.policy.force_stop_threshold
            && context.current_round > context.min_rounds
            && context.has_any_evidence()
        {
            return Decision::rule(
                false,
                0.7,
                format!(
                    "质量评分 {:.2} 低于止损阈值 {:.2}，继续检索收益有限",
                    total, self.policy.force_stop_threshold
                ),
            );
        }

        Decision::rule(
            true,
            0.6,
            format!("质量评分 {:.2} 尚未达到结束条件，继续检索", total),
        )
    }
}

#[async_trait]
impl Judge for RuleJudge {
    async fn judge(
        &self,
        context: &ResearchContext,
        metrics: &QualityMetrics,
    ) -> Result<Decision> {
        Ok(self.decide(context, metrics))
    }
}

/// 由大模型根据检索摘要给出研判
pub struct AiJudge {
    llm: Arc<dyn LanguageModel>,
    language: ReportLanguage,
}

#[derive(Debug, Deserialize)]
struct JudgeReply {
    decision: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    missing_aspects: Vec<String>,
}

impl AiJudge {
    pub fn new(llm: Arc<dyn LanguageModel>, language: ReportLanguage) -> Self {
        Self { llm, language }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"你是证据检索研判员，负责判断当前章节的证据是否已足够开始撰写。
只输出一个 JSON 对象，不要输出其他内容：
{{"decision": "continue" 或 "stop", "confidence": 0到1之间的小数, "reason": "一句话理由", "missing_aspects": ["仍缺少的证据类别"]}}
{}"#,
            self.language.prompt_instruction()
        )
    }

    fn user_prompt(&self, context: &ResearchContext, metrics: &QualityMetrics) -> String {
        let history = context
            .search_history
            .iter()
            .rev()
            .take(JUDGE_HISTORY_ROUNDS)
            .rev()
            .map(|r| {
                format!(
                    "- R{} 「{}」 相似度 {:.2}: {}",
                    r.round,
                    r.query,
                    r.score,
                    truncate_chars(&r.snippet, 120)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let checklist = CoverageArea::ALL
            .iter()
            .map(|area| {
                let mark = if metrics.coverage_areas.contains(area) {
                    "x"
                } else {
                    " "
                };
                format!("- [{}] {}", mark, area.label(self.language))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let missing = metrics
            .missing_areas()
            .iter()
            .map(|area| area.label(self.language))
            .collect::<Vec<_>>()
            .join("、");

        format!(
            r#"## 章节
第 {}/{} 章：{}

## 轮次
当前第 {} 轮（最少 {} 轮，最多 {} 轮）

## 之前的检索
{}

## 本轮检索
检索词：{}
相似度：{:.2}
综合质量：{:.2}（{:?}）
片段：{}

## 证据覆盖
{}
覆盖率：{:.0}%
仍缺少：{}

请判断是否继续检索。"#,
            context.chapter_index + 1,
            context.total_chapters,
            context.chapter_title,
            context.current_round,
            context.min_rounds,
            context.max_rounds,
            if history.is_empty() { "（无）".to_string() } else { history },
            context.current_query,
            context.current_score,
            metrics.total_quality,
            metrics.quality_level,
            truncate_chars(&context.current_snippet, 400),
            checklist,
            metrics.sufficiency_percent * 100.0,
            if missing.is_empty() { "（无）".to_string() } else { missing },
        )
    }
}

/// 解析研判回复，容忍代码块包裹与前后缀文字
pub fn parse_judge_reply(raw: &str) -> Result<Decision> {
    let cleaned = strip_code_fences(raw);
    let json = extract_delimited(&cleaned, '{', '}').ok_or_else(|| anyhow!("回复中没有JSON对象"))?;
    let reply: JudgeReply = serde_json::from_str(json).context("研判JSON解析失败")?;

    let continue_research = match reply.decision.trim().to_lowercase().as_str() {
        "continue" | "继续" | "tiếp tục" => true,
        "stop" | "停止" | "dừng" => false,
        other => return Err(anyhow!("未知的研判结果: {}", other)),
    };

    Ok(Decision {
        continue_research,
        reason: reply.reason,
        source: DecisionSource::Ai,
        confidence: reply.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        missing_aspects: reply.missing_aspects,
    })
}

#[async_trait]
impl Judge for AiJudge {
    async fn judge(
        &self,
        context: &ResearchContext,
        metrics: &QualityMetrics,
    ) -> Result<Decision> {
        let raw = self
            .llm
            .complete(&self.system_prompt(), &self.user_prompt(context, metrics))
            .await?;
        parse_judge_reply(&raw)
    }
}

/// 组合研判：硬性边界优先，其次主研判，失败时回落到规则
pub struct DecisionEngine {
    primary: Box<dyn Judge>,
    fallback: RuleJudge,
}

impl DecisionEngine {
    pub fn new(primary: Box<dyn Judge>, fallback: RuleJudge) -> Self {
        Self { primary, fallback }
    }

    pub fn hybrid(llm: Arc<dyn LanguageModel>, language: ReportLanguage, policy: RoundPolicy) -> Self {
        Self::new(Box::new(AiJudge::new(llm, language)), RuleJudge::new(policy))
    }

    pub async fn decide(&self, context: &ResearchContext, metrics: &QualityMetrics) -> Decision {
        if context.current_round < context.min_rounds {
            return Decision::rule(
                true,
                1.0,
                format!(
                    "未达到最少检索轮次 ({}/{})",
                    context.current_round, context.min_rounds
                ),
            );
        }
        if context.current_round >= context.max_rounds {
            return Decision::rule(
                false,
                1.0,
                format!(
                    "已达到最大检索轮次 ({}/{})",
                    context.current_round, context.max_rounds
                ),
            );
        }

        match self.primary.judge(context, metrics).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    chapter = %context.chapter_title,
                    round = context.current_round,
                    error = %e,
                    "⚠️ AI研判失败，使用规则兜底"
                );
                self.fallback.decide(context, metrics)
            }
        }
    }
}
