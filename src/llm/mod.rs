//! 大模型调用层

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod client;

pub use client::LLMClient;

/// 流式输出的文本片段
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// 报告生成所需的大模型能力：单次补全与流式补全
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 返回完整回复文本
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// 返回按到达顺序排列的回复片段
    async fn complete_stream(&self, system_prompt: &str, user_prompt: &str)
    -> Result<ChunkStream>;

    /// 检查模型服务是否可用
    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}
