use tokio::sync::mpsc;

use crate::generator::error::GenerationError;
use crate::generator::outlet::events::ReportEvent;

/// 事件发送端；接收端断开后发送失败即视为取消
#[derive(Clone)]
pub struct EventEmitter {
    sender: mpsc::Sender<ReportEvent>,
}

impl EventEmitter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReportEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub async fn emit(&self, event: ReportEvent) -> Result<(), GenerationError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| GenerationError::Cancelled)
    }
}
