//! 本地知识库 - 从目录加载 .txt/.md 文档，按字符二元组余弦相似度检索

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{EvidenceStore, ScoredEvidence};

/// 知识片段及其预计算的二元组向量
#[derive(Debug)]
struct KnowledgeChunk {
    content: String,
    source: String,
    bigrams: HashMap<(char, char), u32>,
    norm: f64,
}

impl KnowledgeChunk {
    fn new(source: &str, content: String) -> Self {
        let bigrams = char_bigrams(&content);
        let norm = vector_norm(&bigrams);
        Self {
            content,
            source: source.to_string(),
            bigrams,
            norm,
        }
    }
}

/// 本地知识库，检索在受限的阻塞线程池上执行
pub struct LocalKnowledgeBase {
    chunks: Arc<Vec<KnowledgeChunk>>,
    workers: Arc<Semaphore>,
}

impl LocalKnowledgeBase {
    /// 从目录加载知识库，目录不存在时返回空库
    pub fn load(
        dir: &Path,
        chunk_size: usize,
        chunk_overlap: usize,
        max_workers: usize,
    ) -> Result<Self> {
        if !dir.exists() {
            warn!(dir = %dir.display(), "⚠️ 知识库目录不存在，将使用空知识库");
            return Ok(Self::from_documents(Vec::new(), chunk_size, chunk_overlap, max_workers));
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.context("遍历知识库目录失败")?;
            let path = entry.path();
            let is_text = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_lowercase().as_str(), "txt" | "md"))
                .unwrap_or(false);
            if !entry.file_type().is_file() || !is_text {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let source = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    documents.push((source, text));
                }
                Err(e) => warn!(file = %path.display(), error = %e, "⚠️ 读取知识文件失败，已跳过"),
            }
        }

        let kb = Self::from_documents(documents, chunk_size, chunk_overlap, max_workers);
        info!(dir = %dir.display(), chunks = kb.len(), "📂 本地知识库加载完成");
        Ok(kb)
    }

    /// 从内存文档构建知识库，文档为 (来源, 全文)
    pub fn from_documents(
        documents: Vec<(String, String)>,
        chunk_size: usize,
        chunk_overlap: usize,
        max_workers: usize,
    ) -> Self {
        let chunks = documents
            .iter()
            .flat_map(|(source, text)| {
                split_into_chunks(text, chunk_size, chunk_overlap)
                    .into_iter()
                    .map(move |chunk| KnowledgeChunk::new(source, chunk))
            })
            .filter(|chunk| chunk.norm > 0.0)
            .collect();

        Self {
            chunks: Arc::new(chunks),
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl EvidenceStore for LocalKnowledgeBase {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredEvidence>> {
        let _permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .context("知识库检索线程池已关闭")?;

        let chunks = Arc::clone(&self.chunks);
        let query = query.to_string();
        let results = tokio::task::spawn_blocking(move || rank_chunks(&chunks, &query, k))
            .await
            .context("知识库检索任务异常退出")?;

        debug!(hits = results.len(), "🔍 本地知识库检索完成");
        Ok(results)
    }
}

fn rank_chunks(chunks: &[KnowledgeChunk], query: &str, k: usize) -> Vec<ScoredEvidence> {
    let query_bigrams = char_bigrams(query);
    let query_norm = vector_norm(&query_bigrams);
    if query_norm == 0.0 {
        return Vec::new();
    }

    let mut scored: Vec<ScoredEvidence> = chunks
        .iter()
        .filter_map(|chunk| {
            let dot: f64 = query_bigrams
                .iter()
                .filter_map(|(gram, count)| {
                    chunk
                        .bigrams
                        .get(gram)
                        .map(|other| (*count as f64) * (*other as f64))
                })
                .sum();
            let similarity = (dot / (query_norm * chunk.norm)).clamp(0.0, 1.0);
            (similarity > 0.0).then(|| ScoredEvidence {
                content: chunk.content.clone(),
                source: chunk.source.clone(),
                similarity,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

/// 去掉空白后统计相邻字符对；单字符文本记为自身对
fn char_bigrams(text: &str) -> HashMap<(char, char), u32> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect();
    let mut grams = HashMap::new();
    match chars.len() {
        0 => {}
        1 => {
            grams.insert((chars[0], chars[0]), 1);
        }
        _ => {
            for pair in chars.windows(2) {
                *grams.entry((pair[0], pair[1])).or_insert(0) += 1;
            }
        }
    }
    grams
}

fn vector_norm(grams: &HashMap<(char, char), u32>) -> f64 {
    grams
        .values()
        .map(|v| (*v as f64) * (*v as f64))
        .sum::<f64>()
        .sqrt()
}

/// 先按段落累积，超长段落按固定窗口带重叠切分
fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let paragraph_len = paragraph.chars().count();
        if paragraph_len > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = paragraph.chars().collect();
            let mut start = 0;
            while start < chars.len() {
                let end = (start + chunk_size).min(chars.len());
                chunks.push(chars[start..end].iter().collect());
                if end == chars.len() {
                    break;
                }
                start += step;
            }
            continue;
        }

        if current.chars().count() + paragraph_len + 2 > chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
