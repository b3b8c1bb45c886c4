use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::evidence::{EvidenceStore, LocalKnowledgeBase};
use crate::llm::{LLMClient, LanguageModel};

/// 生成流程共享的只读依赖，可在多个请求间克隆
#[derive(Clone)]
pub struct GeneratorContext {
    /// LLM调用器，用于与AI通信。
    pub llm: Arc<dyn LanguageModel>,
    /// 证据库
    pub evidence: Arc<dyn EvidenceStore>,
    /// 配置
    pub config: Config,
}

impl GeneratorContext {
    /// 根据配置创建模型客户端并加载本地知识库
    pub fn new(config: Config) -> Result<Self> {
        let llm = LLMClient::new(config.llm.clone())?;
        let knowledge_base = LocalKnowledgeBase::load(
            &config.knowledge_dir,
            config.retrieval.chunk_size,
            config.retrieval.chunk_overlap,
            config.retrieval.max_workers,
        )?;

        Ok(Self::with_components(
            config,
            Arc::new(llm),
            Arc::new(knowledge_base),
        ))
    }

    pub fn with_components(
        config: Config,
        llm: Arc<dyn LanguageModel>,
        evidence: Arc<dyn EvidenceStore>,
    ) -> Self {
        Self {
            llm,
            evidence,
            config,
        }
    }
}
