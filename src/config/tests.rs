#[cfg(test)]
mod tests {
    use crate::config::{Config, ConfigError, LLMConfig, LLMProvider, QualityWeights};
    use crate::generator::types::ReportMode;
    use crate::i18n::ReportLanguage;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.language, ReportLanguage::Chinese);
        assert_eq!(config.knowledge_dir, PathBuf::from("./data/knowledge"));
        assert_eq!(config.output_path, PathBuf::from("./report.md"));
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.timeout_ms, 10_000);
        assert_eq!(config.quality.dedup_threshold, 0.85);
        assert_eq!(config.writer.context_window_chars, 1200);
        assert_eq!(config.planner.max_chapters, 8);
        assert!(!config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quality_weights_default() {
        let weights = QualityWeights::default();

        assert_eq!(weights.score, 0.40);
        assert_eq!(weights.content, 0.30);
        assert_eq!(weights.dedup, 0.20);
        assert_eq!(weights.evidence, 0.10);
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mode_policies_default() {
        let config = Config::default();

        let customs = config.modes.for_mode(ReportMode::Customs);
        assert_eq!(customs.min_rounds, 1);
        assert_eq!(customs.max_rounds, 4);
        assert_eq!(customs.early_stop_threshold, 0.75);

        let research = config.modes.for_mode(ReportMode::Research);
        assert!(research.min_rounds <= research.max_rounds);
        assert!(research.force_stop_threshold < research.early_stop_threshold);
    }

    #[test]
    fn test_llm_provider_from_str() {
        assert_eq!(
            "openai".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenAI
        );
        assert_eq!(
            "DeepSeek".parse::<LLMProvider>().unwrap(),
            LLMProvider::DeepSeek
        );
        assert_eq!(
            "gemini".parse::<LLMProvider>().unwrap(),
            LLMProvider::Gemini
        );
        assert_eq!(
            "ollama".parse::<LLMProvider>().unwrap(),
            LLMProvider::Ollama
        );

        assert!("invalid".parse::<LLMProvider>().is_err());
    }

    #[test]
    fn test_llm_provider_display() {
        assert_eq!(LLMProvider::OpenAI.to_string(), "openai");
        assert_eq!(LLMProvider::DeepSeek.to_string(), "deepseek");
        assert_eq!(LLMProvider::Anthropic.to_string(), "anthropic");
    }

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();

        assert_eq!(config.provider, LLMProvider::DeepSeek);
        // api_key may be empty if env var is not set
        assert!(!config.api_base_url.is_empty());
        assert!(!config.model_efficient.is_empty());
        assert!(!config.model_powerful.is_empty());
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.timeout_seconds, 120);
    }

    #[test]
    fn test_validate_rejects_bad_weight_sum() {
        let mut config = Config::default();
        config.quality.weights.score = 0.5;

        match config.validate() {
            Err(ConfigError::WeightsSum(sum)) => assert!((sum - 1.1).abs() < 1e-9),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_inverted_rounds() {
        let mut config = Config::default();
        config.modes.research.min_rounds = 6;
        config.modes.research.max_rounds = 3;

        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedRounds {
                mode: ReportMode::Research,
                min: 6,
                max: 3
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_min_rounds() {
        let mut config = Config::default();
        config.modes.customs.min_rounds = 0;

        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroMinRounds(ReportMode::Customs))
        );
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let mut config = Config::default();
        config.modes.customs.early_stop_threshold = 1.5;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfUnitRange { .. })
        ));
    }

    #[test]
    fn test_from_file_partial_toml_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("report.toml");
        fs::write(
            &config_path,
            r#"
language = "vi"
knowledge_dir = "/srv/knowledge"

[llm]
provider = "openai"
model_efficient = "gpt-4o-mini"

[modes.customs]
min_rounds = 2
max_rounds = 6
early_stop_threshold = 0.8
force_stop_threshold = 0.2

[quality]
dedup_threshold = 0.9
"#,
        )
        .unwrap();

        let config = Config::from_file(&config_path).unwrap();

        assert_eq!(config.language, ReportLanguage::Vietnamese);
        assert_eq!(config.knowledge_dir, PathBuf::from("/srv/knowledge"));
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.model_efficient, "gpt-4o-mini");
        assert_eq!(config.modes.customs.max_rounds, 6);
        assert_eq!(config.modes.research.max_rounds, 5);
        assert_eq!(config.quality.dedup_threshold, 0.9);
        assert_eq!(config.quality.weights, QualityWeights::default());
        assert_eq!(config.retrieval.top_k, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(&PathBuf::from("/nonexistent/report.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_guidance_falls_back_to_builtin_text() {
        let config = Config::default();
        let guidance = config
            .guidance
            .load(ReportMode::Customs, ReportLanguage::Chinese);

        assert_eq!(
            guidance,
            ReportLanguage::Chinese.default_guidance(ReportMode::Customs)
        );
    }

    #[test]
    fn test_guidance_reads_configured_file() {
        let temp_dir = TempDir::new().unwrap();
        let sop_path = temp_dir.path().join("sop.txt");
        fs::write(&sop_path, "SOP: 先核对申报要素，再比对价格。").unwrap();

        let mut config = Config::default();
        config.guidance.customs_path = Some(sop_path);

        let guidance = config
            .guidance
            .load(ReportMode::Customs, ReportLanguage::English);
        assert!(guidance.starts_with("SOP:"));

        // research mode has no file configured
        let research = config
            .guidance
            .load(ReportMode::Research, ReportLanguage::English);
        assert_eq!(
            research,
            ReportLanguage::English.default_guidance(ReportMode::Research)
        );
    }
}
