//! Observer side of the presentation contract.
//!
//! Each subscriber owns an ordered queue: every published transition is
//! delivered to it exactly once, in publication order. Nothing is coalesced,
//! so a view can replay `Loading -> Loaded` precisely.

use tokio::sync::mpsc;

use crate::state::RefreshState;

/// Receiving end handed to a view.
#[derive(Debug)]
pub struct StateSubscription {
    rx: mpsc::UnboundedReceiver<RefreshState>,
}

impl StateSubscription {
    /// Wait for the next transition. `None` once the coordinator is gone.
    pub async fn next(&mut self) -> Option<RefreshState> {
        self.rx.recv().await
    }

    /// Next already-published transition, without waiting.
    pub fn try_next(&mut self) -> Option<RefreshState> {
        self.rx.try_recv().ok()
    }

    /// Drain every transition published so far.
    #[cfg(test)]
    pub(crate) fn drain(&mut self) -> Vec<RefreshState> {
        let mut states = Vec::new();
        while let Some(state) = self.try_next() {
            states.push(state);
        }
        states
    }
}

/// Publishing side, owned by the coordinator.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<mpsc::UnboundedSender<RefreshState>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self) -> StateSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        StateSubscription { rx }
    }

    /// Deliver to every live subscriber, forgetting the ones that hung up.
    pub(crate) fn publish(&mut self, state: &RefreshState) {
        self.senders.retain(|tx| tx.send(state.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
