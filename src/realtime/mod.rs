//! Change notifications pushed by the backend.
//!
//! A [`Subscription`] owns a cancellation token: cancelling it, or dropping
//! it, stops the task feeding it. Consumers that outlive a request check the
//! same token before applying results.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::Result;

pub mod phoenix;

pub use phoenix::PhoenixFeed;

const BUFFER: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind { Insert, Update, Delete }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record_id: Option<Uuid>,
}

pub trait ChangeFeed: Send + Sync {
    /// Starts listening for row changes on `table`. Must be called inside a tokio runtime.
    fn subscribe(&self, table: &str) -> Result<Subscription>;
}

pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Returns the producer half for a feed task and the subscription handed
    /// to the consumer. The task should stop once `token()` is cancelled.
    pub fn channel() -> (mpsc::Sender<ChangeEvent>, Subscription) {
        let (tx, events) = mpsc::channel(BUFFER);
        (tx, Subscription { events, cancel: CancellationToken::new() })
    }

    /// Next change, or `None` once cancelled or once the feed has ended.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    pub fn cancel(&self) { self.cancel.cancel(); }

    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }

    pub fn token(&self) -> CancellationToken { self.cancel.clone() }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.cancel.cancel(); }
}
