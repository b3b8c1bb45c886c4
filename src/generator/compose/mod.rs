//! 章节正文撰写，流式追加到报告并逐片推送

use futures::StreamExt;
use tracing::debug;

use crate::generator::context::GeneratorContext;
use crate::generator::error::GenerationError;
use crate::generator::outlet::{EventEmitter, ReportEvent};
use crate::generator::state::GenerationState;
use crate::generator::types::{ChapterInfo, SearchRecord};
use crate::utils::text::tail_chars;

pub struct SectionWriter<'a> {
    context: &'a GeneratorContext,
    emitter: &'a EventEmitter,
    guidance: String,
}

impl<'a> SectionWriter<'a> {
    pub fn new(context: &'a GeneratorContext, emitter: &'a EventEmitter, guidance: &str) -> Self {
        Self {
            context,
            emitter,
            guidance: guidance.to_string(),
        }
    }

    fn system_prompt(&self, state: &GenerationState) -> String {
        format!(
            "{}\n\n{}",
            self.guidance,
            state.language.prompt_instruction()
        )
    }

    /// 基于本章检索到的证据撰写正文
    pub async fn write_chapter(
        &self,
        state: &mut GenerationState,
        chapter: &ChapterInfo,
        records: &[SearchRecord],
    ) -> Result<(), GenerationError> {
        let evidence: Vec<&SearchRecord> = records.iter().filter(|r| r.has_evidence()).collect();
        let notes = serde_json::to_string_pretty(&evidence).unwrap_or_else(|_| "[]".to_string());
        let evidence_hint = if evidence.is_empty() {
            "本地知识库未检索到相关依据，请基于通用规则谨慎分析，并明确说明缺少本地依据。"
        } else {
            "引用依据时注明来源文件。"
        };

        let user_prompt = format!(
            r#"## 报告主题
{}

## 当前章节
{}

## 前文（节选）
{}

## 检索证据（JSON）
{}

## 写作要求
- 只撰写本章正文，不要重复章节标题
- 使用 markdown 格式，条理清晰
- {}"#,
            state.topic,
            chapter.title,
            tail_chars(&state.report_text, self.context.config.writer.context_window_chars),
            notes,
            evidence_hint
        );

        self.stream_chapter(state, chapter, &user_prompt).await
    }

    /// 总结章节不检索，直接基于更长的前文撰写
    pub async fn write_synthesis(
        &self,
        state: &mut GenerationState,
        chapter: &ChapterInfo,
    ) -> Result<(), GenerationError> {
        let user_prompt = format!(
            r#"## 报告主题
{}

## 当前章节（总结）
{}

## 已完成的报告内容
{}

## 写作要求
- 汇总前文结论，给出明确的风险判断与可操作的建议
- 不要引入前文未出现的新依据
- 只撰写本章正文，不要重复章节标题"#,
            state.topic,
            chapter.title,
            tail_chars(&state.report_text, self.context.config.writer.synthesis_window_chars),
        );

        self.stream_chapter(state, chapter, &user_prompt).await
    }

    async fn stream_chapter(
        &self,
        state: &mut GenerationState,
        chapter: &ChapterInfo,
        user_prompt: &str,
    ) -> Result<(), GenerationError> {
        let system_prompt = self.system_prompt(state);
        let mut stream = self
            .context
            .llm
            .complete_stream(&system_prompt, user_prompt)
            .await
            .map_err(|e| GenerationError::writer(&chapter.title, e))?;

        // 标题只写入报告正文，客户端根据 step_start 自行渲染
        state.append_report(&format!("## {}\n\n", chapter.title));

        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GenerationError::writer(&chapter.title, e))?;
            if chunk.is_empty() {
                continue;
            }
            state.append_report(&chunk);
            self.emitter.emit(ReportEvent::ReportChunk(chunk)).await?;
            chunks += 1;
        }

        state.complete_chapter();
        debug!(chapter = %chapter.title, chunks, "章节撰写完成");
        Ok(())
    }
}
