//! Opportunity sink seam.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use mevscan_state::MEVOpportunity;

/// Destination for accepted opportunities (message bus, analytical store,
/// dashboard push). Emission must not block the scorer for long; slow sinks
/// should buffer internally.
#[async_trait]
pub trait OpportunitySink: Send + Sync {
    async fn emit(&self, opportunity: &MEVOpportunity) -> anyhow::Result<()>;
}

/// Sink that forwards records over an in-process channel.
pub struct ChannelSink {
    tx: mpsc::Sender<MEVOpportunity>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MEVOpportunity>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OpportunitySink for ChannelSink {
    async fn emit(&self, opportunity: &MEVOpportunity) -> anyhow::Result<()> {
        self.tx
            .send(opportunity.clone())
            .await
            .map_err(|_| anyhow::anyhow!("opportunity sink channel closed"))
    }
}

/// Sink that logs each record as structured JSON. Useful as a default wiring
/// and in local runs without a bus.
pub struct LogSink;

#[async_trait]
impl OpportunitySink for LogSink {
    async fn emit(&self, opportunity: &MEVOpportunity) -> anyhow::Result<()> {
        let record = serde_json::to_string(opportunity)?;
        info!(
            kind = opportunity.kind.as_str(),
            net_profit_usd = opportunity.net_profit_usd,
            confidence = opportunity.confidence,
            block = opportunity.source_block.height,
            record = %record,
            "opportunity emitted"
        );
        Ok(())
    }
}
