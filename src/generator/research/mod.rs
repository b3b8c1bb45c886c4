//! 章节证据检索循环

use std::time::Duration;

use tracing::{info, warn};

use crate::evidence::{ScoredEvidence, is_no_evidence};
use crate::generator::context::GeneratorContext;
use crate::generator::error::GenerationError;
use crate::generator::outlet::{EventEmitter, ReportEvent};
use crate::generator::state::GenerationState;
use crate::generator::types::{ChapterInfo, ResearchContext, SearchRecord};

pub mod decision;
pub mod metrics;
pub mod query;

use decision::{Decision, DecisionEngine};
use metrics::QualityMetrics;
use query::QueryPlanner;

/// 单个章节的检索结果
#[derive(Debug, Clone, Default)]
pub struct ChapterResearch {
    pub records: Vec<SearchRecord>,
    pub decisions: Vec<Decision>,
}

impl ChapterResearch {
    pub fn rounds(&self) -> u32 {
        self.records.len() as u32
    }

    /// 带真实证据的记录
    pub fn evidence(&self) -> Vec<&SearchRecord> {
        self.records.iter().filter(|r| r.has_evidence()).collect()
    }

    /// 结束检索的那次研判
    pub fn stop_decision(&self) -> Option<&Decision> {
        self.decisions.last().filter(|d| !d.continue_research)
    }
}

/// 逐轮生成检索词、检索、评分、研判，直到研判结果为停止
pub struct ChapterResearcher<'a> {
    context: &'a GeneratorContext,
    emitter: &'a EventEmitter,
    queries: QueryPlanner,
}

impl<'a> ChapterResearcher<'a> {
    pub fn new(context: &'a GeneratorContext, emitter: &'a EventEmitter, state: &GenerationState) -> Self {
        Self {
            context,
            emitter,
            queries: QueryPlanner::new(context.llm.clone(), state.language),
        }
    }

    pub async fn research(
        &self,
        state: &mut GenerationState,
        chapter: &ChapterInfo,
    ) -> Result<ChapterResearch, GenerationError> {
        let policy = self.context.config.modes.for_mode(state.mode).clone();
        let engine = DecisionEngine::hybrid(self.context.llm.clone(), state.language, policy.clone());
        let mut research = ChapterResearch::default();

        // 轮次上限由循环本身保证
        for round in 1..=policy.max_rounds {
            let used_queries: Vec<String> =
                research.records.iter().map(|r| r.query.clone()).collect();
            let query = self
                .queries
                .next_query(&state.topic, &chapter.title, round, &used_queries)
                .await;
            self.emitter
                .emit(ReportEvent::RagSearch {
                    round,
                    query: query.clone(),
                })
                .await?;

            let evidence = self.retrieve(state, &query).await;
            if !is_no_evidence(&evidence.content) {
                state.mark_snippet_used(&evidence.content);
            }
            self.emitter
                .emit(ReportEvent::RagResult {
                    filename: evidence.source.clone(),
                    snippet: evidence.content.clone(),
                    score: evidence.similarity,
                })
                .await?;

            let record = SearchRecord {
                round,
                query,
                snippet: evidence.content,
                score: evidence.similarity,
                source: evidence.source,
            };
            let note = record.note(&chapter.title);
            state.record_note(note.clone());
            self.emitter
                .emit(ReportEvent::TakeNote { content: note })
                .await?;

            let research_context = ResearchContext {
                chapter_index: chapter.index,
                chapter_title: chapter.title.clone(),
                total_chapters: chapter.total,
                current_round: round,
                min_rounds: policy.min_rounds,
                max_rounds: policy.max_rounds,
                mode: state.mode,
                search_history: research.records.clone(),
                current_query: record.query.clone(),
                current_snippet: record.snippet.clone(),
                current_score: record.score,
            };
            let metrics = QualityMetrics::evaluate(&research_context, &self.context.config.quality);
            let decision = engine.decide(&research_context, &metrics).await;

            info!(
                chapter = %chapter.title,
                round,
                quality = metrics.total_quality,
                source = %decision.source,
                decision = decision.label(),
                "🔎 检索轮次研判"
            );

            self.emitter
                .emit(ReportEvent::ResearchDecision {
                    round,
                    decision: decision.label().to_string(),
                    reason: decision.reason.clone(),
                    source: decision.source,
                    confidence: decision.confidence,
                    metrics,
                })
                .await?;

            research.records.push(record);
            let stop = !decision.continue_research;
            research.decisions.push(decision);
            if stop {
                break;
            }
        }

        Ok(research)
    }

    /// 检索并挑选证据；超时、出错或无结果时返回零证据占位
    async fn retrieve(&self, state: &GenerationState, query: &str) -> ScoredEvidence {
        let retrieval = &self.context.config.retrieval;
        let timeout = Duration::from_millis(retrieval.timeout_ms);

        let results = match tokio::time::timeout(
            timeout,
            self.context.evidence.search(query, retrieval.top_k),
        )
        .await
        {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                warn!(query = %query, error = %e, "⚠️ 证据检索失败");
                Vec::new()
            }
            Err(_) => {
                warn!(query = %query, timeout_ms = retrieval.timeout_ms, "⚠️ 证据检索超时");
                Vec::new()
            }
        };

        select_evidence(results, state)
    }
}

/// 优先选择本次请求尚未用过的结果，否则取第一条
pub fn select_evidence(results: Vec<ScoredEvidence>, state: &GenerationState) -> ScoredEvidence {
    let mut candidates: Vec<ScoredEvidence> = results
        .into_iter()
        .filter(|r| !is_no_evidence(&r.content))
        .collect();
    if candidates.is_empty() {
        return ScoredEvidence::none();
    }

    let index = candidates
        .iter()
        .position(|r| !state.is_snippet_used(&r.content))
        .unwrap_or(0);
    let mut chosen = candidates.swap_remove(index);
    chosen.similarity = if chosen.similarity.is_finite() {
        chosen.similarity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    chosen
}
