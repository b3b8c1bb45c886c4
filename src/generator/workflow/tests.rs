#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use futures::StreamExt;

    use crate::config::{Config, ConfigError};
    use crate::evidence::{EvidenceStore, ScoredEvidence};
    use crate::generator::context::GeneratorContext;
    use crate::generator::error::GenerationError;
    use crate::generator::outlet::{EventEmitter, ReportEvent};
    use crate::generator::workflow::{ReportGenerator, TimingKeys, TimingScope, run};
    use crate::llm::{ChunkStream, LanguageModel};

    /// 所有补全都失败，流式输出固定文本
    struct OfflineModel;

    #[async_trait]
    impl LanguageModel for OfflineModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Err(anyhow!("offline"))
        }

        async fn complete_stream(&self, _system: &str, _user: &str) -> Result<ChunkStream> {
            Ok(futures::stream::iter(vec![Ok("内容".to_string())]).boxed())
        }
    }

    struct EmptyStore;

    #[async_trait]
    impl EvidenceStore for EmptyStore {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredEvidence>> {
            Ok(Vec::new())
        }
    }

    fn create_test_context() -> GeneratorContext {
        let mut config = Config::default();
        config.modes.research.min_rounds = 1;
        config.modes.research.max_rounds = 2;
        GeneratorContext::with_components(config, Arc::new(OfflineModel), Arc::new(EmptyStore))
    }

    #[test]
    fn test_timing_scope_accumulates_phases() {
        let mut timing = TimingScope::new();

        timing.start_phase(TimingKeys::RESEARCH);
        std::thread::sleep(Duration::from_millis(2));
        let first = timing.end_phase(TimingKeys::RESEARCH).unwrap();

        timing.start_phase(TimingKeys::RESEARCH);
        let second = timing.end_phase(TimingKeys::RESEARCH).unwrap();

        assert_eq!(
            timing.phase_duration(TimingKeys::RESEARCH),
            Some(first + second)
        );
        assert!(timing.end_phase(TimingKeys::COMPOSE).is_none());
        assert!(timing.generate_timing_report().contains("research"));
    }

    #[tokio::test]
    async fn test_empty_topic_emits_single_error() {
        let context = create_test_context();
        let (emitter, mut receiver) = EventEmitter::channel(8);

        let result = run(&context, &emitter, "   ").await;
        drop(emitter);

        assert!(matches!(result, Err(GenerationError::EmptyTopic)));
        assert!(matches!(receiver.recv().await, Some(ReportEvent::Error(_))));
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_emits_single_error_before_init() {
        let mut config = Config::default();
        config.modes.research.min_rounds = 3;
        config.modes.research.max_rounds = 2;
        let context =
            GeneratorContext::with_components(config, Arc::new(OfflineModel), Arc::new(EmptyStore));
        let (emitter, mut receiver) = EventEmitter::channel(8);

        let result = run(&context, &emitter, "如何评估新兴市场的合规风险").await;
        drop(emitter);

        assert!(matches!(
            result,
            Err(GenerationError::Config(ConfigError::InvertedRounds { min: 3, max: 2, .. }))
        ));
        match receiver.recv().await {
            Some(ReportEvent::Error(message)) => assert!(message.contains("配置无效")),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_offline_model_still_completes_with_fallbacks() {
        let generator = ReportGenerator::new(create_test_context());
        let (stream, handle) = generator.spawn("如何评估新兴市场的合规风险");

        let events: Vec<ReportEvent> = stream.collect().await;
        let state = handle.await.unwrap().unwrap();

        assert!(!state.toc.is_empty());
        assert_eq!(state.completed_chapters, state.toc.len());
        assert!(matches!(events.last(), Some(ReportEvent::Done { .. })));

        let toc = events.iter().find_map(|e| match e {
            ReportEvent::Toc(toc) => Some(toc.clone()),
            _ => None,
        });
        assert_eq!(toc, Some(state.toc.clone()));
    }
}
