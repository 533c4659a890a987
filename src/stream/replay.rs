//! Hot broadcast with replay of the latest value.
//!
//! A `Replay<T>` holds the most recent value plus every registered
//! subscriber. A subscriber registered after a value has been published
//! receives that value on its first `next()` without waiting, then every
//! later value. Slow subscribers observe the latest value rather than every
//! intermediate one; each value is a full state so nothing is lost by
//! skipping. Built on `tokio::sync::watch`.

use futures::stream::{self, Stream};
use tokio::sync::watch;

/// Publishing side of a replay-of-1 broadcast
#[derive(Debug)]
pub struct Replay<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Replay<T> {
    /// Create an empty broadcast
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the latest value and notify every subscriber
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// Withdraw the latest value so new subscribers wait for the next one
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// The latest value, if any
    pub fn latest(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
            primed: false,
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Default for Replay<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a replay-of-1 broadcast
#[derive(Debug, Clone)]
pub struct Subscription<T> {
    rx: watch::Receiver<Option<T>>,
    primed: bool,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next value.
    ///
    /// The first call yields the replayed value immediately when one exists.
    /// Returns `None` once the publisher is gone. Cancel safe.
    pub async fn next(&mut self) -> Option<T> {
        if !self.primed {
            self.primed = true;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// Wait until a value satisfies `predicate`, starting with the latest one
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        loop {
            let value = self.next().await?;
            if predicate(&value) {
                return Some(value);
            }
        }
    }

    /// The latest value without waiting
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Convert into a `Stream` of values
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send + Sync + 'static,
    {
        stream::unfold(self, |mut sub| async move {
            let value = sub.next().await?;
            Some((value, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_immediately() {
        let replay = Replay::new();
        replay.publish(1);
        replay.publish(2);

        let mut sub = replay.subscribe();
        assert_eq!(sub.next().await, Some(2));
    }

    #[tokio::test]
    async fn test_subscriber_waits_when_empty() {
        let replay: Replay<u32> = Replay::new();
        let mut sub = replay.subscribe();

        assert!(timeout(Duration::from_millis(20), sub.next()).await.is_err());
        replay.publish(7);
        assert_eq!(sub.next().await, Some(7));
    }

    #[tokio::test]
    async fn test_clear_hides_stale_value() {
        let replay = Replay::new();
        replay.publish("old");
        replay.clear();

        let mut sub = replay.subscribe();
        assert!(timeout(Duration::from_millis(20), sub.next()).await.is_err());
        replay.publish("new");
        assert_eq!(sub.next().await, Some("new"));
    }

    #[tokio::test]
    async fn test_all_subscribers_see_each_publish() {
        let replay = Replay::new();
        let mut a = replay.subscribe();
        let mut b = replay.subscribe();
        assert_eq!(replay.subscriber_count(), 2);

        replay.publish(5);
        assert_eq!(a.next().await, Some(5));
        assert_eq!(b.next().await, Some(5));
    }

    #[tokio::test]
    async fn test_stream_ends_when_publisher_dropped() {
        let replay = Replay::new();
        replay.publish(1);
        let stream = replay.subscribe().into_stream();
        drop(replay);

        let values: Vec<_> = stream.collect().await;
        assert_eq!(values, vec![1]);
    }

    #[tokio::test]
    async fn test_wait_for_skips_until_match() {
        let replay = Replay::new();
        let mut sub = replay.subscribe();
        replay.publish(1);

        let waiter = tokio::spawn(async move { sub.wait_for(|v| *v >= 3).await });
        tokio::task::yield_now().await;
        replay.publish(2);
        replay.publish(3);

        assert_eq!(waiter.await.unwrap(), Some(3));
    }
}
