//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LLMConfig;
use crate::llm::{ChunkStream, LanguageModel};
use crate::utils::text::split_chars;

mod providers;
pub mod utils;

use providers::ProviderClient;
use utils::evaluate_befitting_model;

/// 流式输出时每个片段的字符数
const STREAM_CHUNK_CHARS: usize = 48;

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        attempt = retries,
                        max = max_retries,
                        error = %err,
                        "❌ 调用模型服务出错，重试中"
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    /// 使用指定模型的单轮对话（带超时与重试）
    async fn prompt(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let agent = self.client.create_agent(model, system_prompt, &self.config);
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        self.retry_with_backoff(|| async {
            tokio::time::timeout(timeout, agent.prompt(user_prompt))
                .await
                .map_err(|_| anyhow!("模型调用超时 ({}s)", timeout.as_secs()))?
        })
        .await
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, system_prompt, user_prompt);

        match self
            .prompt(&befitting_model, system_prompt, user_prompt)
            .await
        {
            Ok(text) => Ok(text),
            Err(e) => match fallover_model {
                Some(model) => {
                    warn!(model = %model, error = %e, "❌ 模型多次调用失败，尝试使用备选模型");
                    self.prompt(&model, system_prompt, user_prompt).await
                }
                None => Err(e),
            },
        }
    }

    async fn complete_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<ChunkStream> {
        let (befitting_model, _) =
            evaluate_befitting_model(&self.config, system_prompt, user_prompt);
        let agent = self
            .client
            .create_agent(&befitting_model, system_prompt, &self.config);
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        if let Ok(live) = tokio::time::timeout(timeout, agent.stream_prompt(user_prompt)).await {
            if let Some(stream) = open_stream(live, timeout).await {
                return Ok(stream);
            }
        }

        // 流式不可用时退回完整调用，再切片下发
        warn!(model = %befitting_model, "⚠️ 流式输出不可用，改为分片输出完整回复");
        let content = self.complete(system_prompt, user_prompt).await?;
        let chunks = split_chars(&content, STREAM_CHUNK_CHARS);
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    /// 检查模型连接和功能是否正常
    async fn check_connection(&self) -> Result<()> {
        info!("🔄 正在检查模型连接...");
        match self
            .prompt(
                &self.config.model_efficient,
                "You are a helpful assistant.",
                "Hello",
            )
            .await
        {
            Ok(_) => {
                info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "❌ 模型连接失败");
                Err(e)
            }
        }
    }
}

/// 等待流式输出的第一个片段，首片成功才认为流可用
async fn open_stream(mut live: ChunkStream, timeout: Duration) -> Option<ChunkStream> {
    match tokio::time::timeout(timeout, live.next()).await {
        Ok(Some(Ok(first))) => Some(stream::once(async move { Ok(first) }).chain(live).boxed()),
        Ok(Some(Err(e))) => {
            warn!(error = %e, "❌ 流式输出首个片段出错");
            None
        }
        Ok(None) => {
            warn!("❌ 流式输出为空");
            None
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "❌ 等待流式输出超时");
            None
        }
    }
}
