//! Inbound injection channel.
//!
//! A FIFO of out-of-band user messages feeding an in-flight session. When
//! no session is running, messages accumulate and the next session start
//! observes the queue. Single consumer.

use std::collections::VecDeque;

use tokio::sync::Notify;

pub struct InjectionChannel {
    queue: parking_lot::Mutex<VecDeque<String>>,
    notify: Notify,
}

impl InjectionChannel {
    pub fn new() -> Self {
        Self {
            queue: parking_lot::Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, message: impl Into<String>) {
        self.queue.lock().push_back(message.into());
        self.notify.notify_one();
    }

    pub fn try_recv(&self) -> Option<String> {
        self.queue.lock().pop_front()
    }

    /// Wait for the next message in FIFO order.
    pub async fn recv(&self) -> String {
        loop {
            if let Some(message) = self.try_recv() {
                return message;
            }
            self.notify.notified().await;
        }
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<String> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for InjectionChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let channel = InjectionChannel::new();
        channel.push("first");
        channel.push("second");
        channel.push("third");
        assert_eq!(channel.try_recv().as_deref(), Some("first"));
        assert_eq!(channel.drain(), vec!["second", "third"]);
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_recv_sees_message_pushed_before_wait() {
        let channel = InjectionChannel::new();
        channel.push("queued early");
        assert_eq!(channel.recv().await, "queued early");
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let channel = Arc::new(InjectionChannel::new());
        let producer = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push("late");
        });
        let got = tokio::time::timeout(Duration::from_secs(1), channel.recv())
            .await
            .unwrap();
        assert_eq!(got, "late");
    }
}
