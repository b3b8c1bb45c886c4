//! 证据库接口 - 报告生成只依赖 `search(query, k)` 这一项能力

use anyhow::Result;
use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

pub mod knowledge_base;

pub use knowledge_base::LocalKnowledgeBase;

/// 检索失败或无结果时使用的占位片段
pub const NO_EVIDENCE_SNIPPET: &str = "<no local evidence>";

/// 占位片段对应的来源
pub const SYSTEM_SOURCE: &str = "system";

/// 带相似度的检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvidence {
    pub content: String,
    /// 来源文件名
    pub source: String,
    /// 相似度，范围 [0,1]，越大越相关
    pub similarity: f64,
}

impl ScoredEvidence {
    /// 零证据占位结果
    pub fn none() -> Self {
        Self {
            content: NO_EVIDENCE_SNIPPET.to_string(),
            source: SYSTEM_SOURCE.to_string(),
            similarity: 0.0,
        }
    }
}

/// 只读证据库，需支持并发读取
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// 按相似度降序返回最多 `k` 条结果
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredEvidence>>;
}

/// 片段是否为空或零证据占位
pub fn is_no_evidence(snippet: &str) -> bool {
    let trimmed = snippet.trim();
    trimmed.is_empty() || trimmed == NO_EVIDENCE_SNIPPET
}

/// 片段指纹：折叠空白后的MD5，用于跨章节去重
pub fn fingerprint(snippet: &str) -> String {
    let normalized = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Md5::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
