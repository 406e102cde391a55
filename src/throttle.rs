use std::time::Duration;
use tokio::time::Instant;

/// Coalesces UI refreshes of the streaming text: publish at most once per
/// `interval`, and leave the newest value pending until its deadline.
///
/// Only render timing is affected. The caller keeps accumulating every
/// fragment and always publishes the final value.
#[derive(Debug, Clone)]
pub struct RenderThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: bool,
}

impl RenderThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: false,
        }
    }

    /// Registers a new value at `now`. Returns `true` when it should be
    /// published right away; otherwise it stays pending.
    pub fn record(&mut self, now: Instant) -> bool {
        let due = match self.last_emit {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            self.mark_emitted(now);
        } else {
            self.pending = true;
        }
        due
    }

    /// When the pending value must be published, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_emit.map(|last| last + self.interval)
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn mark_emitted(&mut self, now: Instant) {
        self.last_emit = Some(now);
        self.pending = false;
    }

    /// Resolves at the pending deadline; never resolves when nothing is pending.
    pub async fn wait_due(&self) {
        match self.deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
