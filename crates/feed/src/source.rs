//! Event source seam.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use mevscan_state::InboundEvent;

/// A stream of decoded inbound events, delivered in arrival order.
///
/// The single-producer side lives with the ingestion collaborator; the
/// orchestrator is the single consumer and fans out internally.
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` when the feed has shut down.
    async fn next_event(&mut self) -> Option<InboundEvent>;
}

/// Producer half of a [`ChannelEventSource`].
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<InboundEvent>,
}

impl FeedHandle {
    /// Push one event into the engine. Awaits while the engine is at
    /// capacity; ingestion-side backpressure is intentional.
    pub async fn push(&self, event: InboundEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("engine event channel closed"))
    }

    /// Non-blocking push for feeds that must never stall; drops on overflow.
    pub fn try_push(&self, event: InboundEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "inbound event dropped at feed boundary");
                false
            }
        }
    }
}

/// In-process channel-backed event source.
pub struct ChannelEventSource {
    rx: mpsc::Receiver<InboundEvent>,
}

impl ChannelEventSource {
    /// Create a bounded source and its producer handle.
    pub fn new(capacity: usize) -> (FeedHandle, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (FeedHandle { tx }, Self { rx })
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_event(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    #[tokio::test]
    async fn test_channel_source_delivers_in_order() {
        let (handle, mut source) = ChannelEventSource::new(8);

        for height in 1..=3u64 {
            handle
                .push(InboundEvent::ReorgNotice {
                    common_ancestor_height: height,
                    common_ancestor_hash: B256::ZERO,
                })
                .await
                .unwrap();
        }
        drop(handle);

        let mut seen = Vec::new();
        while let Some(event) = source.next_event().await {
            seen.push(event.block_height().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
