use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;

use report_forge::config::Config;
use report_forge::evidence::{
    EvidenceStore, LocalKnowledgeBase, NO_EVIDENCE_SNIPPET, SYSTEM_SOURCE, ScoredEvidence,
};
use report_forge::generator::context::GeneratorContext;
use report_forge::generator::error::GenerationError;
use report_forge::generator::outlet::ReportEvent;
use report_forge::generator::research::decision::DecisionSource;
use report_forge::generator::state::GenerationState;
use report_forge::generator::types::ReportMode;
use report_forge::generator::workflow::ReportGenerator;
use report_forge::i18n::ReportLanguage;
use report_forge::llm::{ChunkStream, LanguageModel};

const CUSTOMS_TOPIC: &str =
    "报关单号 530120241234，境内收货人：某贸易有限公司，HS编码 8471.30.00，毛重 120kg，原产国 越南";
const RESEARCH_TOPIC: &str = "跨境电商平台对中小企业出口的影响";

/// 按系统提示词区分调用场景的脚本化模型
#[derive(Default)]
struct ScriptedModel {
    /// None 表示调用失败
    outline: Option<String>,
    query: Option<String>,
    judge: Option<String>,
    fail_writer: bool,
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, system_prompt: &str, _user_prompt: &str) -> Result<String> {
        let reply = if system_prompt.contains("规划章节目录") {
            &self.outline
        } else if system_prompt.contains("检索助手") {
            &self.query
        } else if system_prompt.contains("研判员") {
            &self.judge
        } else {
            return Ok("正文".to_string());
        };
        reply.clone().ok_or_else(|| anyhow!("model offline"))
    }

    async fn complete_stream(&self, _system: &str, _user: &str) -> Result<ChunkStream> {
        if self.fail_writer {
            return Err(anyhow!("stream broken"));
        }
        let chunks = vec![Ok("第一段。".to_string()), Ok("第二段。".to_string())];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// 每次都返回同一组结果
struct FixedStore(Vec<ScoredEvidence>);

#[async_trait]
impl EvidenceStore for FixedStore {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<ScoredEvidence>> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

/// 检索总是超过时限
struct SlowStore(Duration);

#[async_trait]
impl EvidenceStore for SlowStore {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredEvidence>> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }
}

fn rich_snippet() -> String {
    "第十二条：申报价格应当真实，1、核对发票；2、比对均价 35.6 美元。".repeat(6)
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.retrieval.timeout_ms = 20;
    config
}

async fn run_report(
    config: Config,
    model: ScriptedModel,
    store: Arc<dyn EvidenceStore>,
    topic: &str,
) -> (Vec<ReportEvent>, Result<GenerationState, GenerationError>) {
    let context = GeneratorContext::with_components(config, Arc::new(model), store);
    let generator = ReportGenerator::new(context);
    let (stream, handle) = generator.spawn(topic);
    let events: Vec<ReportEvent> = stream.collect().await;
    let result = handle.await.unwrap();
    (events, result)
}

/// 按 step_start/step_done 切分出各章节的事件
fn chapters(events: &[ReportEvent]) -> Vec<Vec<&ReportEvent>> {
    let mut chapters = Vec::new();
    let mut current: Option<Vec<&ReportEvent>> = None;
    for event in events {
        match event {
            ReportEvent::StepStart { .. } => current = Some(vec![event]),
            ReportEvent::StepDone { .. } => {
                if let Some(mut chapter) = current.take() {
                    chapter.push(event);
                    chapters.push(chapter);
                }
            }
            _ => {
                if let Some(chapter) = current.as_mut() {
                    chapter.push(event);
                }
            }
        }
    }
    chapters
}

fn decisions<'a>(chapter: &[&'a ReportEvent]) -> Vec<&'a ReportEvent> {
    chapter
        .iter()
        .copied()
        .filter(|e| matches!(e, ReportEvent::ResearchDecision { .. }))
        .collect()
}

fn count_type(chapter: &[&ReportEvent], event_type: &str) -> usize {
    chapter.iter().filter(|e| e.event_type() == event_type).count()
}

#[tokio::test]
async fn test_customs_rich_evidence_stops_after_one_round() {
    let model = ScriptedModel {
        outline: Some(r#"["申报数据概览", "改进建议与总结"]"#.to_string()),
        query: Some("申报价格".to_string()),
        ..Default::default()
    };
    let store = Arc::new(FixedStore(vec![ScoredEvidence {
        content: rich_snippet(),
        source: "valuation.md".to_string(),
        similarity: 0.9,
    }]));

    let (events, result) = run_report(test_config(), model, store, CUSTOMS_TOPIC).await;
    let state = result.unwrap();

    assert_eq!(state.mode, ReportMode::Customs);
    assert_eq!(state.toc, vec!["1. 申报数据概览", "2. 改进建议与总结"]);

    let chapters = chapters(&events);
    assert_eq!(chapters.len(), 2);

    let first = decisions(&chapters[0]);
    assert_eq!(first.len(), 1);
    match first[0] {
        ReportEvent::ResearchDecision {
            round,
            decision,
            source,
            metrics,
            ..
        } => {
            assert_eq!(*round, 1);
            assert_eq!(decision, "stop");
            assert_eq!(*source, DecisionSource::Rule);
            assert!(metrics.total_quality >= 0.75);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    assert!(state.report_text.starts_with("## 1. 申报数据概览\n\n第一段。第二段。\n\n"));
    assert!(state.report_text.contains("## 2. 改进建议与总结"));
    assert_eq!(state.global_notebook.len(), 1);
}

#[tokio::test]
async fn test_store_timeouts_run_to_max_rounds() {
    let model = ScriptedModel {
        outline: Some("not json".to_string()),
        ..Default::default()
    };
    let store = Arc::new(SlowStore(Duration::from_millis(500)));
    let config = test_config();
    let policy = config.modes.research.clone();

    let (events, result) = run_report(config, model, store, RESEARCH_TOPIC).await;
    let state = result.unwrap();

    assert_eq!(state.mode, ReportMode::Research);
    assert_eq!(
        state.toc,
        ReportLanguage::Chinese.fallback_outline(ReportMode::Research)
    );

    let chapters = chapters(&events);
    assert_eq!(chapters.len(), state.toc.len());

    for chapter in &chapters[..chapters.len() - 1] {
        let rounds = decisions(chapter);
        assert_eq!(rounds.len(), policy.max_rounds as usize);

        for event in chapter {
            if let ReportEvent::RagResult {
                filename,
                snippet,
                score,
            } = event
            {
                assert_eq!(filename, SYSTEM_SOURCE);
                assert_eq!(snippet, NO_EVIDENCE_SNIPPET);
                assert_eq!(*score, 0.0);
            }
        }

        match rounds.last() {
            Some(ReportEvent::ResearchDecision {
                decision,
                source,
                confidence,
                metrics,
                ..
            }) => {
                assert_eq!(decision, "stop");
                assert_eq!(*source, DecisionSource::Rule);
                assert_eq!(*confidence, 1.0);
                assert!(metrics.total_quality < policy.early_stop_threshold);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // 兜底检索词在章节内不重复
        let queries: Vec<&String> = chapter
            .iter()
            .filter_map(|e| match e {
                ReportEvent::RagSearch { query, .. } => Some(query),
                _ => None,
            })
            .collect();
        let mut unique = queries.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), queries.len());
    }
}

#[tokio::test]
async fn test_round_bounds_hold_for_both_modes() {
    for topic in [CUSTOMS_TOPIC, RESEARCH_TOPIC] {
        let model = ScriptedModel {
            outline: Some(r#"["甲", "乙", "丙"]"#.to_string()),
            judge: Some(r#"{"decision": "stop", "confidence": 0.9, "reason": "enough"}"#.to_string()),
            ..Default::default()
        };
        let store = Arc::new(FixedStore(vec![ScoredEvidence {
            content: "申报要素应当完整。".to_string(),
            source: "a.md".to_string(),
            similarity: 0.3,
        }]));
        let config = test_config();

        let (events, result) = run_report(config.clone(), model, store, topic).await;
        let state = result.unwrap();
        let policy = config.modes.for_mode(state.mode);

        for chapter in &chapters(&events)[..2] {
            let executed = decisions(chapter).len() as u32;
            assert!(executed >= policy.min_rounds, "{} < min", executed);
            assert!(executed <= policy.max_rounds, "{} > max", executed);
        }
    }
}

#[tokio::test]
async fn test_ai_judge_used_until_hard_bound() {
    let model = ScriptedModel {
        outline: Some(r#"["甲", "总结"]"#.to_string()),
        judge: Some(r#"```json
{"decision": "continue", "confidence": 0.8, "reason": "缺少处罚依据", "missing_aspects": ["处罚依据"]}
```"#
            .to_string()),
        ..Default::default()
    };
    let store = Arc::new(FixedStore(vec![ScoredEvidence {
        content: "申报要素应当完整。".to_string(),
        source: "a.md".to_string(),
        similarity: 0.5,
    }]));
    let mut config = test_config();
    config.modes.customs.max_rounds = 3;

    let (events, result) = run_report(config, model, store, CUSTOMS_TOPIC).await;
    result.unwrap();

    let sources: Vec<DecisionSource> = decisions(&chapters(&events)[0])
        .iter()
        .filter_map(|e| match e {
            ReportEvent::ResearchDecision { source, .. } => Some(*source),
            _ => None,
        })
        .collect();
    assert_eq!(
        sources,
        vec![DecisionSource::Ai, DecisionSource::Ai, DecisionSource::Rule]
    );
}

#[tokio::test]
async fn test_event_order_and_single_terminal() {
    let model = ScriptedModel {
        outline: Some(r#"["背景", "分析", "结论"]"#.to_string()),
        ..Default::default()
    };
    let store = Arc::new(FixedStore(vec![ScoredEvidence {
        content: rich_snippet(),
        source: "kb.md".to_string(),
        similarity: 0.8,
    }]));

    let (events, result) = run_report(test_config(), model, store, RESEARCH_TOPIC).await;
    result.unwrap();

    assert_eq!(events.first().map(|e| e.event_type()), Some("init"));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(events.last().map(|e| e.event_type()), Some("done"));

    let toc_at = events.iter().position(|e| e.event_type() == "toc").unwrap();
    let first_step = events
        .iter()
        .position(|e| e.event_type() == "step_start")
        .unwrap();
    assert!(toc_at < first_step);

    let chapters = chapters(&events);
    assert_eq!(chapters.len(), 3);
    for (index, chapter) in chapters.iter().enumerate() {
        match chapter[0] {
            ReportEvent::StepStart { index: i, .. } => assert_eq!(*i, index),
            other => panic!("unexpected event: {:?}", other),
        }

        // rag_search → rag_result → take_note → research_decision 循环，之后只有正文片段
        let body: Vec<&str> = chapter[1..chapter.len() - 1]
            .iter()
            .map(|e| e.event_type())
            .collect();
        let first_chunk = body
            .iter()
            .position(|t| *t == "report_chunk")
            .unwrap_or(body.len());
        let (research, writing) = body.split_at(first_chunk);
        assert_eq!(research.len() % 4, 0);
        for round in research.chunks(4) {
            assert_eq!(
                round,
                ["rag_search", "rag_result", "take_note", "research_decision"]
            );
        }
        assert!(!writing.is_empty());
        assert!(writing.iter().all(|t| *t == "report_chunk"));
    }

    // 总结章节不检索
    let last = chapters.last().unwrap();
    assert_eq!(count_type(last, "rag_search"), 0);
    assert_eq!(count_type(last, "rag_result"), 0);
}

#[tokio::test]
async fn test_writer_failure_emits_single_error() {
    let model = ScriptedModel {
        outline: Some(r#"["背景", "结论"]"#.to_string()),
        fail_writer: true,
        ..Default::default()
    };
    let store = Arc::new(FixedStore(Vec::new()));

    let (events, result) = run_report(test_config(), model, store, RESEARCH_TOPIC).await;

    assert!(matches!(result, Err(GenerationError::Writer { .. })));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    match events.last() {
        Some(ReportEvent::Error(message)) => assert!(message.contains("stream broken")),
        other => panic!("unexpected last event: {:?}", other),
    }
    assert!(!events.iter().any(|e| e.event_type() == "done"));
}

#[tokio::test]
async fn test_dropping_stream_cancels_generation() {
    let model = ScriptedModel {
        outline: Some(r#"["背景", "结论"]"#.to_string()),
        ..Default::default()
    };
    let mut config = test_config();
    config.retrieval.timeout_ms = 1_000;
    let store = Arc::new(SlowStore(Duration::from_millis(50)));

    let context = GeneratorContext::with_components(config, Arc::new(model), store);
    let (mut stream, handle) = ReportGenerator::new(context).spawn(RESEARCH_TOPIC);

    let first = stream.next().await;
    assert!(matches!(first, Some(ReportEvent::Init { .. })));
    drop(stream);

    assert!(matches!(handle.await.unwrap(), Err(GenerationError::Cancelled)));
}

#[tokio::test]
async fn test_local_knowledge_base_end_to_end() {
    let documents = vec![
        (
            "valuation.md".to_string(),
            "海关审价办法：进口货物的完税价格以成交价格为基础确定，申报价格明显低于参考均价的应当说明。".to_string(),
        ),
        (
            "weather.txt".to_string(),
            "今日多云转晴，气温适宜，适合户外活动。".to_string(),
        ),
    ];
    let knowledge_base = LocalKnowledgeBase::from_documents(documents, 500, 50, 2);

    let model = ScriptedModel {
        outline: Some(r#"["价格申报审查", "总结"]"#.to_string()),
        query: Some("申报价格 成交价格".to_string()),
        ..Default::default()
    };

    let (events, result) =
        run_report(test_config(), model, Arc::new(knowledge_base), CUSTOMS_TOPIC).await;
    let state = result.unwrap();

    let first_result = events.iter().find_map(|e| match e {
        ReportEvent::RagResult { filename, .. } => Some(filename.clone()),
        _ => None,
    });
    assert_eq!(first_result.as_deref(), Some("valuation.md"));
    assert!(!state.used_snippet_fingerprints.is_empty());
}
