use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::generator::compose::SectionWriter;
use crate::generator::context::GeneratorContext;
use crate::generator::error::GenerationError;
use crate::generator::outlet::{DiskOutlet, EventEmitter, Outlet, ReportEvent};
use crate::generator::outline::OutlinePlanner;
use crate::generator::research::ChapterResearcher;
use crate::generator::router::route;
use crate::generator::state::GenerationState;
use crate::generator::types::ChapterInfo;

/// 事件通道容量
const EVENT_BUFFER: usize = 64;

/// 报告事件流
pub type EventStream = BoxStream<'static, ReportEvent>;

/// 时间跟踪作用域，同名阶段多次计时会累加
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: HashMap<&'static str, Instant>,
    phase_durations: HashMap<&'static str, Duration>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: HashMap::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &'static str) {
        self.phase_start_times.insert(phase_name, Instant::now());
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &'static str) -> Option<Duration> {
        let duration = self.phase_start_times.remove(phase_name)?.elapsed();
        *self.phase_durations.entry(phase_name).or_default() += duration;
        Some(duration)
    }

    pub fn phase_duration(&self, phase_name: &str) -> Option<Duration> {
        self.phase_durations.get(phase_name).copied()
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒",
            self.start_time.elapsed().as_secs_f64()
        );
        for key in TimingKeys::ALL {
            if let Some(duration) = self.phase_durations.get(key) {
                report.push_str(&format!(", {}: {:.2}秒", key, duration.as_secs_f64()));
            }
        }
        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const PLANNING: &'static str = "planning";
    pub const RESEARCH: &'static str = "research";
    pub const COMPOSE: &'static str = "compose";

    pub const ALL: [&'static str; 3] = [Self::PLANNING, Self::RESEARCH, Self::COMPOSE];
}

/// 报告生成器：每个请求一个独立任务，通过事件流输出进度
#[derive(Clone)]
pub struct ReportGenerator {
    context: Arc<GeneratorContext>,
}

impl ReportGenerator {
    pub fn new(context: GeneratorContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// 启动生成任务；丢弃事件流即取消生成
    pub fn spawn(
        &self,
        topic: impl Into<String>,
    ) -> (EventStream, JoinHandle<Result<GenerationState, GenerationError>>) {
        let (emitter, receiver) = EventEmitter::channel(EVENT_BUFFER);
        let context = Arc::clone(&self.context);
        let topic = topic.into();

        let handle = tokio::spawn(async move { run(&context, &emitter, &topic).await });

        let events = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
        .boxed();

        (events, handle)
    }
}

/// 执行一次完整的报告生成，保证最多发送一个终止事件
pub async fn run(
    context: &GeneratorContext,
    emitter: &EventEmitter,
    topic: &str,
) -> Result<GenerationState, GenerationError> {
    match generate(context, emitter, topic).await {
        Ok(state) => {
            emitter
                .emit(ReportEvent::Done {
                    request_id: state.request_id,
                    chapters: state.completed_chapters,
                    report_chars: state.report_text.chars().count(),
                    elapsed_ms: state.elapsed_ms(),
                })
                .await?;
            Ok(state)
        }
        Err(GenerationError::Cancelled) => {
            warn!("🔌 客户端已断开，停止生成");
            Err(GenerationError::Cancelled)
        }
        Err(e) => {
            error!(error = %e, "❌ 报告生成失败");
            if emitter.emit(ReportEvent::Error(e.to_string())).await.is_err() {
                warn!("🔌 客户端已断开，错误事件未送达");
            }
            Err(e)
        }
    }
}

async fn generate(
    context: &GeneratorContext,
    emitter: &EventEmitter,
    topic: &str,
) -> Result<GenerationState, GenerationError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(GenerationError::EmptyTopic);
    }

    let config = &context.config;
    config.validate()?;
    let language = config.language;
    let mode = route(topic);
    let mut state = GenerationState::new(topic, mode, language);
    let mut timing = TimingScope::new();

    info!(request_id = %state.request_id, mode = %mode, language = %language, "🚀 开始生成报告");

    emitter
        .emit(ReportEvent::Init {
            request_id: state.request_id,
            topic: state.topic.clone(),
            mode,
            language,
        })
        .await?;
    emitter
        .emit(ReportEvent::Thought(language.thought_mode(mode)))
        .await?;
    emitter
        .emit(ReportEvent::Thought(language.thought_planning().to_string()))
        .await?;

    let guidance = config.guidance.load(mode, language);

    timing.start_phase(TimingKeys::PLANNING);
    let planner = OutlinePlanner::new(context.llm.clone(), language, &guidance);
    state.toc = planner
        .plan(&state.topic, mode, config.planner.max_chapters)
        .await;
    timing.end_phase(TimingKeys::PLANNING);
    emitter.emit(ReportEvent::Toc(state.toc.clone())).await?;

    let researcher = ChapterResearcher::new(context, emitter, &state);
    let writer = SectionWriter::new(context, emitter, &guidance);
    let toc = state.toc.clone();

    for (index, title) in toc.iter().enumerate() {
        let chapter = ChapterInfo {
            index,
            title: title.clone(),
            total: toc.len(),
        };

        let thought = if chapter.is_synthesis() {
            language.thought_synthesis(&chapter.title)
        } else {
            language.thought_research(&chapter.title)
        };
        emitter.emit(ReportEvent::Thought(thought)).await?;
        emitter
            .emit(ReportEvent::StepStart {
                index,
                title: chapter.title.clone(),
            })
            .await?;

        if chapter.is_synthesis() {
            timing.start_phase(TimingKeys::COMPOSE);
            writer.write_synthesis(&mut state, &chapter).await?;
            timing.end_phase(TimingKeys::COMPOSE);
        } else {
            timing.start_phase(TimingKeys::RESEARCH);
            let research = researcher.research(&mut state, &chapter).await?;
            timing.end_phase(TimingKeys::RESEARCH);
            let (stop_source, stop_reason) = research
                .stop_decision()
                .map(|d| (d.source.to_string(), d.reason.as_str()))
                .unwrap_or_default();
            info!(
                chapter = %chapter.title,
                rounds = research.rounds(),
                evidence = research.evidence().len(),
                stop_source = %stop_source,
                stop_reason = %stop_reason,
                "📚 章节检索完成"
            );

            timing.start_phase(TimingKeys::COMPOSE);
            writer
                .write_chapter(&mut state, &chapter, &research.records)
                .await?;
            timing.end_phase(TimingKeys::COMPOSE);
        }

        emitter.emit(ReportEvent::StepDone { index }).await?;
    }

    info!(
        request_id = %state.request_id,
        chapters = state.completed_chapters,
        "✅ 报告生成完成，{}",
        timing.generate_timing_report()
    );
    Ok(state)
}

/// 在终端打印事件进度，正文片段不打印
fn log_progress(event: &ReportEvent) {
    match event {
        ReportEvent::Thought(text) => info!("💭 {}", text),
        ReportEvent::Toc(toc) => info!("📑 目录: {}", toc.join(" | ")),
        ReportEvent::StepStart { title, .. } => info!("📝 {}", title),
        ReportEvent::RagSearch { round, query } => info!(round, "🔍 检索: {}", query),
        ReportEvent::ResearchDecision {
            round,
            decision,
            reason,
            source,
            ..
        } => info!(round, source = %source, "🧭 {}: {}", decision, reason),
        ReportEvent::Done {
            chapters,
            report_chars,
            ..
        } => info!(chapters, report_chars, "🎉 生成结束"),
        ReportEvent::Error(message) => error!("❌ {}", message),
        _ => {}
    }
}

/// 启动报告生成工作流
pub async fn launch(config: &Config, topic: &str, print_sse: bool) -> Result<()> {
    config.validate()?;

    let context = GeneratorContext::new(config.clone())?;

    // 启动时检查模型连接
    context.llm.check_connection().await?;

    let generator = ReportGenerator::new(context);
    let (mut events, handle) = generator.spawn(topic);

    while let Some(event) = events.next().await {
        if print_sse {
            print!("{}", event.to_sse_frame());
        } else {
            log_progress(&event);
        }
    }

    let state = handle.await.context("报告生成任务异常退出")??;

    DiskOutlet::new(config.output_path.clone())
        .save(&state)
        .await?;

    Ok(())
}

// Include tests
#[cfg(test)]
mod tests;
