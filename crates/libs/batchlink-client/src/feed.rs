//! Multi-subscriber event feeds.
//!
//! Feeds are backed by `tokio::sync::broadcast`. Completing a feed drops its
//! sender, so every subscription drains what is buffered and then ends.

use std::sync::Mutex;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::status::ClientStatus;

pub struct EventFeed<T> {
    sender: Mutex<Option<broadcast::Sender<T>>>,
}

impl<T: Clone> EventFeed<T> {
    /// `capacity` must be positive.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender: Mutex::new(Some(sender)) }
    }

    /// Events published from now on. A completed feed yields an ended subscription.
    pub fn subscribe(&self) -> Subscription<T> {
        let sender = self.sender.lock().expect("feed mutex poisoned");
        Subscription::new(None, sender.as_ref().map(broadcast::Sender::subscribe))
    }

    /// Returns the number of subscribers reached.
    pub(crate) fn publish(&self, event: T) -> usize {
        let sender = self.sender.lock().expect("feed mutex poisoned");
        match sender.as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub(crate) fn complete(&self) {
        self.sender.lock().expect("feed mutex poisoned").take();
    }

    pub fn is_complete(&self) -> bool {
        self.sender.lock().expect("feed mutex poisoned").is_none()
    }
}

/// Status feed that remembers the latest status and replays it to each new
/// subscriber before any later transition.
pub struct StatusFeed {
    latest: Mutex<ClientStatus>,
    events: EventFeed<ClientStatus>,
}

impl StatusFeed {
    pub fn new(initial: ClientStatus, capacity: usize) -> Self {
        Self { latest: Mutex::new(initial), events: EventFeed::new(capacity) }
    }

    pub fn latest(&self) -> ClientStatus {
        *self.latest.lock().expect("status mutex poisoned")
    }

    pub fn subscribe(&self) -> Subscription<ClientStatus> {
        // Holding `latest` keeps a concurrent publish from landing between
        // the replay value and the live receiver.
        let latest = self.latest.lock().expect("status mutex poisoned");
        let mut subscription = self.events.subscribe();
        subscription.replay = Some(*latest);
        subscription
    }

    /// Records and broadcasts a transition. Repeating the current status is a no-op.
    pub(crate) fn publish(&self, status: ClientStatus) -> bool {
        let mut latest = self.latest.lock().expect("status mutex poisoned");
        if *latest == status {
            return false;
        }
        *latest = status;
        self.events.publish(status);
        true
    }

    pub(crate) fn complete(&self) {
        let _latest = self.latest.lock().expect("status mutex poisoned");
        self.events.complete();
    }

    pub fn is_complete(&self) -> bool {
        self.events.is_complete()
    }
}

/// A handle on one feed. Slow subscribers skip the oldest events rather than
/// holding back the publisher.
pub struct Subscription<T> {
    replay: Option<T>,
    receiver: Option<broadcast::Receiver<T>>,
    skipped: u64,
}

impl<T: Clone> Subscription<T> {
    fn new(replay: Option<T>, receiver: Option<broadcast::Receiver<T>>) -> Self {
        Self { replay, receiver, skipped: 0 }
    }

    /// Next event, or `None` once the feed is complete and drained.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(count)) => self.lagged(count),
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(count)) => self.lagged(count),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Blocking variant of [`recv`](Self::recv) for hosts without a runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<T> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(count)) => self.lagged(count),
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// True once the feed has completed and every buffered event was taken.
    pub fn is_ended(&self) -> bool {
        self.replay.is_none() && self.receiver.is_none()
    }

    /// Events dropped because this subscriber fell behind.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn lagged(&mut self, count: u64) {
        self.skipped += count;
        log::warn!("feed: subscriber lagged, skipped {count} events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_published_after_subscribing() {
        let feed = EventFeed::new(8);
        assert_eq!(feed.publish(1), 0);
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();
        assert_eq!(feed.publish(2), 2);
        assert_eq!(first.recv().await, Some(2));
        assert_eq!(second.recv().await, Some(2));
        assert_eq!(first.try_recv(), None);
    }

    #[tokio::test]
    async fn completion_ends_subscriptions_after_draining() {
        let feed = EventFeed::new(8);
        let mut sub = feed.subscribe();
        feed.publish("a");
        feed.complete();
        assert!(feed.is_complete());
        assert_eq!(sub.recv().await, Some("a"));
        assert_eq!(sub.recv().await, None);
        assert!(sub.is_ended());

        assert_eq!(feed.publish("late"), 0);
        assert_eq!(feed.subscribe().recv().await, None);
    }

    #[tokio::test]
    async fn slow_subscriber_skips_oldest() {
        let feed = EventFeed::new(2);
        let mut sub = feed.subscribe();
        for value in 0..5 {
            feed.publish(value);
        }
        assert_eq!(sub.recv().await, Some(3));
        assert_eq!(sub.skipped(), 3);
        assert_eq!(sub.recv().await, Some(4));
    }

    #[tokio::test]
    async fn status_replays_latest_then_follows_transitions() {
        let feed = StatusFeed::new(ClientStatus::Connecting, 8);
        assert!(feed.publish(ClientStatus::Connected));
        assert!(!feed.publish(ClientStatus::Connected));

        let mut sub = feed.subscribe();
        assert_eq!(sub.recv().await, Some(ClientStatus::Connected));
        feed.publish(ClientStatus::Terminated);
        feed.complete();
        assert_eq!(sub.recv().await, Some(ClientStatus::Terminated));
        assert_eq!(sub.recv().await, None);

        let mut late = feed.subscribe();
        assert_eq!(late.try_recv(), Some(ClientStatus::Terminated));
        assert_eq!(late.try_recv(), None);
        assert!(late.is_ended());
        assert_eq!(feed.latest(), ClientStatus::Terminated);
    }

    #[test]
    fn blocking_recv_outside_runtime() {
        let feed = EventFeed::new(4);
        let mut sub = feed.subscribe();
        feed.publish(7_u8);
        feed.complete();
        assert_eq!(sub.blocking_recv(), Some(7));
        assert_eq!(sub.blocking_recv(), None);
    }
}
