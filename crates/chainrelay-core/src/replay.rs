//! Historical event replay.
//!
//! Reads the ledger height `H` once, then walks blocks `from..H` one at a
//! time: fetch → decode → filter → deliver. Delivery of each event is
//! awaited before the next, so the sink observes events in block order and,
//! within a block, in transaction then action order.
//!
//! A fetch or decode failure aborts the walk. A sink failure does not: the
//! forwarder has already logged it and replay moves on.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::filter::EventFilter;
use crate::forwarder::EventSink;
use crate::ledger::LedgerClient;

/// Summary of one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub from_height: u64,
    /// Exclusive upper bound covered; live events below it are duplicates.
    pub next_height: u64,
    pub blocks_scanned: u64,
    pub events_forwarded: u64,
    pub publish_failures: u64,
}

impl ReplayOutcome {
    /// Nothing replayed; live delivery starts unfiltered by height.
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayEngine;

impl ReplayEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn replay(
        &self,
        client: &dyn LedgerClient,
        channel_id: &str,
        from_height: u64,
        filter: &EventFilter,
        sink: &dyn EventSink,
    ) -> Result<ReplayOutcome, RelayError> {
        let abort = |source: RelayError| RelayError::ReplayFailed {
            from: from_height,
            source: Box::new(source),
        };

        let height = client
            .ledger_height(channel_id)
            .await
            .map_err(|e| abort(e.into()))?;

        let mut outcome = ReplayOutcome {
            from_height,
            next_height: height.max(from_height),
            ..Default::default()
        };
        if from_height >= height {
            tracing::debug!(channel = channel_id, from_height, height, "nothing to replay");
            return Ok(outcome);
        }

        tracing::info!(channel = channel_id, from_height, height, "starting replay");

        for number in from_height..height {
            let block = client
                .block(channel_id, number)
                .await
                .map_err(|e| abort(e.into()))?;
            let events = block.events().map_err(abort)?;
            outcome.blocks_scanned += 1;

            for event in events.iter().filter(|e| filter.matches(e)) {
                match sink.deliver(event).await {
                    Ok(()) => outcome.events_forwarded += 1,
                    Err(_) => outcome.publish_failures += 1,
                }
            }
        }

        tracing::info!(
            channel = channel_id,
            blocks = outcome.blocks_scanned,
            forwarded = outcome.events_forwarded,
            failed = outcome.publish_failures,
            next_height = outcome.next_height,
            "replay complete"
        );
        Ok(outcome)
    }
}
