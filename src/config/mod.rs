use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::generator::types::ReportMode;
use crate::i18n::ReportLanguage;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    #[default]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 配置校验错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("质量权重之和必须为 1.0，当前为 {0:.4}")]
    WeightsSum(f64),
    #[error("{0} 模式的最小检索轮次必须大于等于 1")]
    ZeroMinRounds(ReportMode),
    #[error("{mode} 模式的最小检索轮次 {min} 大于最大轮次 {max}")]
    InvertedRounds { mode: ReportMode, min: u32, max: u32 },
    #[error("配置项 {name} = {value} 超出 [0,1] 范围")]
    OutOfUnitRange { name: String, value: f64 },
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 报告语言
    pub language: ReportLanguage,

    /// 本地知识库目录
    pub knowledge_dir: PathBuf,

    /// 报告导出路径
    pub output_path: PathBuf,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 证据检索配置
    pub retrieval: RetrievalConfig,

    /// 质量评分配置
    pub quality: QualityConfig,

    /// 各模式的轮次策略
    pub modes: ModePolicies,

    /// 章节撰写配置
    pub writer: WriterConfig,

    /// 目录规划配置
    pub planner: PlannerConfig,

    /// 角色与审查指导文件
    pub guidance: GuidanceConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，用于检索词生成、研判等短任务
    pub model_efficient: String,

    /// 高质量模型，用于长上下文任务，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 单次调用超时时间（秒）
    pub timeout_seconds: u64,
}

/// 证据检索配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 每轮检索返回的候选数
    pub top_k: usize,
    /// 单次检索超时（毫秒）
    pub timeout_ms: u64,
    /// 并发检索的工作线程上限
    pub max_workers: usize,
    /// 知识片段长度（字符）
    pub chunk_size: usize,
    /// 相邻片段重叠长度（字符）
    pub chunk_overlap: usize,
}

/// 四项质量分量的权重，总和必须为 1.0
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct QualityWeights {
    /// 相似度
    pub score: f64,
    /// 内容丰富度
    pub content: f64,
    /// 新颖度（去重）
    pub dedup: f64,
    /// 累计证据充分度
    pub evidence: f64,
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.score + self.content + self.dedup + self.evidence
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    pub weights: QualityWeights,
    /// 片段相似度超过该值视为重复
    pub dedup_threshold: f64,
}

/// 单个模式的检索轮次策略
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RoundPolicy {
    pub min_rounds: u32,
    pub max_rounds: u32,
    /// 质量达到该值（含）即停止检索
    pub early_stop_threshold: f64,
    /// 质量持续低于该值（不含）时止损
    pub force_stop_threshold: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModePolicies {
    pub customs: RoundPolicy,
    pub research: RoundPolicy,
}

impl ModePolicies {
    pub fn for_mode(&self, mode: ReportMode) -> &RoundPolicy {
        match mode {
            ReportMode::Customs => &self.customs,
            ReportMode::Research => &self.research,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct WriterConfig {
    /// 普通章节可见的前文长度（字符）
    pub context_window_chars: usize,
    /// 总结章节可见的前文长度（字符）
    pub synthesis_window_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// 目录最大章节数
    pub max_chapters: usize,
}

/// 角色/审查指导文件，未配置或读取失败时使用内置文本
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct GuidanceConfig {
    pub customs_path: Option<PathBuf>,
    pub research_path: Option<PathBuf>,
}

impl GuidanceConfig {
    /// 加载指定模式的指导文本
    pub fn load(&self, mode: ReportMode, language: ReportLanguage) -> String {
        let path = match mode {
            ReportMode::Customs => self.customs_path.as_ref(),
            ReportMode::Research => self.research_path.as_ref(),
        };

        if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => warn!(path = %path.display(), "⚠️ 指导文件为空，使用内置角色设定"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "⚠️ 指导文件读取失败，使用内置角色设定")
                }
            }
        }

        language.default_guidance(mode).to_string()
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 校验权重、轮次与阈值
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights_sum = self.quality.weights.sum();
        if (weights_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsSum(weights_sum));
        }

        let weights = &self.quality.weights;
        check_unit_range("quality.weights.score", weights.score)?;
        check_unit_range("quality.weights.content", weights.content)?;
        check_unit_range("quality.weights.dedup", weights.dedup)?;
        check_unit_range("quality.weights.evidence", weights.evidence)?;
        check_unit_range("quality.dedup_threshold", self.quality.dedup_threshold)?;

        for mode in [ReportMode::Customs, ReportMode::Research] {
            let policy = self.modes.for_mode(mode);
            if policy.min_rounds == 0 {
                return Err(ConfigError::ZeroMinRounds(mode));
            }
            if policy.min_rounds > policy.max_rounds {
                return Err(ConfigError::InvertedRounds {
                    mode,
                    min: policy.min_rounds,
                    max: policy.max_rounds,
                });
            }
            check_unit_range(
                &format!("modes.{}.early_stop_threshold", mode),
                policy.early_stop_threshold,
            )?;
            check_unit_range(
                &format!("modes.{}.force_stop_threshold", mode),
                policy.force_stop_threshold,
            )?;
        }

        Ok(())
    }
}

fn check_unit_range(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange {
            name: name.to_string(),
            value,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: ReportLanguage::default(),
            knowledge_dir: PathBuf::from("./data/knowledge"),
            output_path: PathBuf::from("./report.md"),
            llm: LLMConfig::default(),
            retrieval: RetrievalConfig::default(),
            quality: QualityConfig::default(),
            modes: ModePolicies::default(),
            writer: WriterConfig::default(),
            planner: PlannerConfig::default(),
            guidance: GuidanceConfig::default(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("REPORT_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.deepseek.com"),
            model_efficient: String::from("deepseek-chat"),
            model_powerful: String::from("deepseek-reasoner"),
            max_tokens: 8192,
            temperature: 0.3,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 120,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            timeout_ms: 10_000,
            max_workers: 4,
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            score: 0.40,
            content: 0.30,
            dedup: 0.20,
            evidence: 0.10,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            dedup_threshold: 0.85,
        }
    }
}

impl Default for ModePolicies {
    fn default() -> Self {
        Self {
            customs: RoundPolicy {
                min_rounds: 1,
                max_rounds: 4,
                early_stop_threshold: 0.75,
                force_stop_threshold: 0.30,
            },
            research: RoundPolicy {
                min_rounds: 2,
                max_rounds: 5,
                early_stop_threshold: 0.80,
                force_stop_threshold: 0.25,
            },
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            context_window_chars: 1200,
            synthesis_window_chars: 4000,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_chapters: 8 }
    }
}

// Include tests
#[cfg(test)]
mod tests;
