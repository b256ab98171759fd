use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoChangeKind {
    Insert,
    Update,
    /// Events were missed or the source can't tell what changed; re-fetch.
    Resync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoChange {
    pub kind: PhotoChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<String>,
    pub at: DateTime<Utc>,
}

impl PhotoChange {
    #[must_use]
    pub fn insert(photo_id: impl Into<String>) -> Self {
        Self {
            kind: PhotoChangeKind::Insert,
            photo_id: Some(photo_id.into()),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn update(photo_id: impl Into<String>) -> Self {
        Self {
            kind: PhotoChangeKind::Update,
            photo_id: Some(photo_id.into()),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn resync() -> Self {
        Self {
            kind: PhotoChangeKind::Resync,
            photo_id: None,
            at: Utc::now(),
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Handle to a photo change feed. The feed (and any task feeding it) lives
/// exactly as long as this value.
pub struct PhotoSubscription {
    receiver: broadcast::Receiver<PhotoChange>,
    _feeder: Option<AbortOnDrop>,
}

impl PhotoSubscription {
    #[must_use]
    pub fn new(receiver: broadcast::Receiver<PhotoChange>) -> Self {
        Self {
            receiver,
            _feeder: None,
        }
    }

    /// Subscription backed by a dedicated task, aborted when the handle drops.
    #[must_use]
    pub fn with_feeder(receiver: broadcast::Receiver<PhotoChange>, feeder: JoinHandle<()>) -> Self {
        Self {
            receiver,
            _feeder: Some(AbortOnDrop(feeder)),
        }
    }

    /// Next change, or `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<PhotoChange> {
        match self.receiver.recv().await {
            Ok(change) => Some(change),
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "photo change feed lagged");
                Some(PhotoChange::resync())
            }
            Err(RecvError::Closed) => None,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = PhotoChange> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let change = subscription.recv().await?;
            Some((change, subscription))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_receives_published_changes() {
        let (tx, rx) = broadcast::channel(8);
        let mut subscription = PhotoSubscription::new(rx);

        tx.send(PhotoChange::insert("p1")).unwrap();
        let change = subscription.recv().await.unwrap();
        assert_eq!(change.kind, PhotoChangeKind::Insert);
        assert_eq!(change.photo_id.as_deref(), Some("p1"));

        drop(tx);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_lag_becomes_resync() {
        let (tx, rx) = broadcast::channel(1);
        let mut subscription = PhotoSubscription::new(rx);

        tx.send(PhotoChange::insert("a")).unwrap();
        tx.send(PhotoChange::insert("b")).unwrap();

        let change = subscription.recv().await.unwrap();
        assert_eq!(change.kind, PhotoChangeKind::Resync);
    }

    #[tokio::test]
    async fn test_dropping_subscription_aborts_feeder() {
        let (tx, rx) = broadcast::channel(8);
        let feeder = tokio::spawn(async move {
            loop {
                let _ = tx.send(PhotoChange::resync());
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        let abort_handle = feeder.abort_handle();

        let mut stream = Box::pin(PhotoSubscription::with_feeder(rx, feeder).into_stream());
        assert!(stream.next().await.is_some());

        drop(stream);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(abort_handle.is_finished());
    }
}
