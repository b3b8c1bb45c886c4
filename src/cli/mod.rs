use crate::config::{Config, LLMProvider};
use crate::i18n::ReportLanguage;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;

/// 默认配置文件名
const DEFAULT_CONFIG_FILE: &str = "report.toml";

/// Report Forge - 基于本地证据自适应检索的合规报告生成引擎
#[derive(Parser, Debug)]
#[command(name = "report-forge")]
#[command(
    about = "Generates multi-chapter compliance and research reports by adaptively retrieving evidence from a local knowledge base."
)]
#[command(version)]
pub struct Args {
    /// 报告主题或待审查的报关数据
    #[arg(short, long, conflicts_with = "topic_file")]
    pub topic: Option<String>,

    /// 从文件读取主题
    #[arg(long)]
    pub topic_file: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 本地知识库目录
    #[arg(short, long)]
    pub knowledge_dir: Option<PathBuf>,

    /// 报告输出路径
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 报告语言 (zh, en, vi)
    #[arg(short, long)]
    pub language: Option<String>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 高能效模型，用于检索词生成、研判等常规任务
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，作为高能效模型失效时的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 以 SSE 帧格式向标准输出打印事件
    #[arg(long)]
    pub sse: bool,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// 读取报告主题：`--topic` 优先，其次 `--topic-file`
    pub fn resolve_topic(&self) -> Result<String> {
        let topic = match (&self.topic, &self.topic_file) {
            (Some(topic), _) => topic.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("无法读取主题文件: {}", path.display()))?,
            (None, None) => bail!("请通过 --topic 或 --topic-file 指定报告主题"),
        };

        if topic.trim().is_empty() {
            bail!("报告主题不能为空");
        }
        Ok(topic)
    }

    /// 将CLI参数转换为配置
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            // 显式指定的配置文件必须可读
            Some(config_path) => Config::from_file(config_path)
                .with_context(|| format!("无法读取配置文件: {}", config_path.display()))?,
            None => {
                let default_config_path = std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_FILE);
                if default_config_path.exists() {
                    Config::from_file(&default_config_path).with_context(|| {
                        format!("无法读取默认配置文件: {}", default_config_path.display())
                    })?
                } else {
                    Config::default()
                }
            }
        };

        // 覆盖配置文件中的设置
        if let Some(knowledge_dir) = self.knowledge_dir {
            config.knowledge_dir = knowledge_dir;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(language_str) = self.language {
            config.language = match language_str.parse::<ReportLanguage>() {
                Ok(language) => language,
                Err(_) => bail!("未知的报告语言: {}（可选 zh、en、vi）", language_str),
            };
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            config.llm.provider = match provider_str.parse::<LLMProvider>() {
                Ok(provider) => provider,
                Err(_) => bail!("未知的provider: {}", provider_str),
            };
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model_efficient) = self.model_efficient {
            config.llm.model_efficient = model_efficient;
        }
        if let Some(model_powerful) = self.model_powerful {
            config.llm.model_powerful = model_powerful;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }
}
