//! Process-wide publish/subscribe hub.
//!
//! Two topics: cluster readiness (`bool`, produced by the cluster lifecycle
//! manager) and [`ImageEvent`] (produced by the processor, consumed by the UI).
//! Publishing with no subscribers is not an error; the event is dropped.

use crate::parse::ImageRecord;
use serde::Serialize;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ImageEvent {
    /// A fresh, sorted image inventory.
    ImagesChanged { images: Vec<ImageRecord> },
    /// A user-visible command finished.
    CommandEnded {
        processor: String,
        subcommand: String,
        outcome: CommandOutcome,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },
    NamespaceChanged { namespace: String },
}

#[derive(Debug, Clone)]
pub struct EventHub {
    readiness: broadcast::Sender<bool>,
    images: broadcast::Sender<ImageEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        let (readiness, _) = broadcast::channel(TOPIC_CAPACITY);
        let (images, _) = broadcast::channel(TOPIC_CAPACITY);
        Self { readiness, images }
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_readiness(&self, ready: bool) {
        if self.readiness.send(ready).is_err() {
            tracing::trace!("readiness event ({ready}) dropped: no subscribers");
        }
    }

    pub fn subscribe_readiness(&self) -> broadcast::Receiver<bool> {
        self.readiness.subscribe()
    }

    pub fn publish(&self, event: ImageEvent) {
        if self.images.send(event).is_err() {
            tracing::trace!("image event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImageEvent> {
        self.images.subscribe()
    }

    pub fn readiness_subscribers(&self) -> usize {
        self.readiness.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let hub = EventHub::new();
        hub.publish_readiness(true);
        hub.publish(ImageEvent::NamespaceChanged {
            namespace: "k8s.io".to_owned(),
        });
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        let mut ready_rx = hub.subscribe_readiness();

        hub.publish(ImageEvent::ImagesChanged { images: Vec::new() });
        hub.publish_readiness(false);

        assert_eq!(
            rx.recv().await.unwrap(),
            ImageEvent::ImagesChanged { images: Vec::new() }
        );
        assert!(!ready_rx.recv().await.unwrap());
    }

    #[test]
    fn receiver_count_tracks_drops() {
        let hub = EventHub::new();
        assert_eq!(hub.readiness_subscribers(), 0);
        let rx = hub.subscribe_readiness();
        assert_eq!(hub.readiness_subscribers(), 1);
        drop(rx);
        assert_eq!(hub.readiness_subscribers(), 0);
    }

    #[test]
    fn event_json_shape() {
        let event = ImageEvent::CommandEnded {
            processor: "nerdctl".to_owned(),
            subcommand: "pull".to_owned(),
            outcome: CommandOutcome::Success,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "command-ended");
        assert_eq!(json["outcome"], "success");
        assert_eq!(json["subcommand"], "pull");
    }
}
