use thiserror::Error;

use crate::config::ConfigError;

/// 生成流程中需要对外暴露的错误
///
/// 目录规划、检索、研判的失败都会在内部降级处理，不会出现在这里。
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 事件接收方已断开
    #[error("客户端已断开连接，生成中止")]
    Cancelled,

    /// 章节正文生成失败
    #[error("章节《{chapter}》撰写失败: {message}")]
    Writer { chapter: String, message: String },

    #[error("报告主题不能为空")]
    EmptyTopic,

    #[error("配置无效: {0}")]
    Config(#[from] ConfigError),
}

impl GenerationError {
    pub fn writer(chapter: &str, err: anyhow::Error) -> Self {
        GenerationError::Writer {
            chapter: chapter.to_string(),
            message: format!("{:#}", err),
        }
    }
}
