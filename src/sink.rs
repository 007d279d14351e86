use tokio::sync::mpsc;

use crate::types::{ScanStatus, TaskId, Vulnerability};

/// One rendering pushed to the UI for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub target: String,
    pub status: ScanStatus,
    pub text: String,
    /// Present only on the update that carries final results.
    pub vulnerabilities: Option<Vec<Vulnerability>>,
}

/// Receives rendered session state. Implementations must not block.
pub trait StatusSink: Send + Sync {
    fn update(&self, update: StatusUpdate);
}

/// Prints every update to stdout, prefixed by its task id.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn update(&self, update: StatusUpdate) {
        println!("[{}] {}", update.task_id, update.text);
    }
}

/// Forwards updates into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn update(&self, update: StatusUpdate) {
        // A dropped receiver means nobody renders anymore.
        let _ = self.tx.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        for (i, status) in [ScanStatus::Submitted, ScanStatus::Running].into_iter().enumerate() {
            sink.update(StatusUpdate {
                task_id: TaskId::new("t"),
                target: "host".into(),
                status,
                text: format!("update {i}"),
                vulnerabilities: None,
            });
        }
        assert_eq!(rx.recv().await.unwrap().status, ScanStatus::Submitted);
        assert_eq!(rx.recv().await.unwrap().text, "update 1");
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.update(StatusUpdate {
            task_id: TaskId::new("t"),
            target: "host".into(),
            status: ScanStatus::Stopped,
            text: "stopped".into(),
            vulnerabilities: None,
        });
    }
}
