use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::generator::state::GenerationState;

pub mod emitter;
pub mod events;

pub use emitter::EventEmitter;
pub use events::ReportEvent;

#[allow(async_fn_in_trait)]
pub trait Outlet {
    async fn save(&self, state: &GenerationState) -> Result<()>;
}

/// 将报告正文导出为 markdown 文件
pub struct DiskOutlet {
    output_path: PathBuf,
}

impl DiskOutlet {
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }
}

impl Outlet for DiskOutlet {
    async fn save(&self, state: &GenerationState) -> Result<()> {
        if let Some(parent_dir) = self.output_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir)
                    .with_context(|| format!("创建输出目录失败: {}", parent_dir.display()))?;
            }
        }

        fs::write(&self.output_path, &state.report_text)
            .with_context(|| format!("写入报告失败: {}", self.output_path.display()))?;

        info!(
            path = %self.output_path.display(),
            chars = state.report_text.chars().count(),
            "💾 报告已保存"
        );
        Ok(())
    }
}
