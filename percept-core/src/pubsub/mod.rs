//! Publishers and Subscribers connect the nodes of the perception graph.
//!
//! Unlike ROS-style subscriber callbacks, a `Subscriber` here is a bounded
//! queue that code pulls from, much like a Rust channel. Values are cloned
//! for every subscription, so messages should be cheap to clone; wrapping
//! a large payload in an `Arc` is the usual answer.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};

use crossbeam::{
    queue::{ArrayQueue, SegQueue},
    utils::Backoff,
};
use tokio::sync::Notify;

pub mod subs;

use self::subs::{DirectSubscription, PublisherToken, Subscription};

/// The sending half of a topic.
///
/// A `Publisher` holds every subscription that was accepted into it and
/// pushes a clone of each published value into all of them. It is owned
/// by exactly one node; other nodes hand it their subscriptions through
/// [`Publisher::accept_subscription`] or a [`PublisherRef`].
pub struct Publisher<T> {
    subs: Arc<SegQueue<Box<dyn Subscription<Item = T> + Send>>>,
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self {
            subs: Arc::default(),
        }
    }
}

impl<T: Clone> Publisher<T> {
    /// Publishes a value to all accepted subscriptions.
    ///
    /// Only the node that owns this publisher should call this.
    pub fn set(&mut self, value: T) {
        for _ in 0..self.subs.len() {
            // Subscriptions are only popped here, so len() is a lower bound.
            let mut sub = self.subs.pop().unwrap();
            if sub.push(value.clone(), PublisherToken(Default::default())) {
                self.subs.push(sub);
            } else {
                sub.decrement_publishers(PublisherToken(Default::default()));
            }
        }
    }
}

impl<T> Publisher<T> {
    /// Accepts a subscription, allowing the `Subscriber` that created it
    /// to receive values published here.
    pub fn accept_subscription(&self, sub: impl Subscription<Item = T> + Send + 'static) {
        sub.increment_publishers(PublisherToken(Default::default()));
        self.subs.push(Box::new(sub));
    }

    /// Creates a shareable handle that can accept subscriptions on behalf
    /// of this publisher without owning it.
    pub fn get_ref(&self) -> PublisherRef<T> {
        PublisherRef {
            subs: Arc::downgrade(&self.subs),
        }
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        let mut subs = std::mem::take(&mut self.subs);

        let backoff = Backoff::new();
        let subs = loop {
            match Arc::try_unwrap(subs) {
                Ok(x) => break x,
                Err(x) => {
                    backoff.spin();
                    subs = x;
                }
            }
        };

        for sub in subs.into_iter() {
            sub.decrement_publishers(PublisherToken(Default::default()));
        }
    }
}

/// A weak handle to a [`Publisher`] that can accept subscriptions.
pub struct PublisherRef<T> {
    subs: Weak<SegQueue<Box<dyn Subscription<Item = T> + Send>>>,
}

impl<T> PublisherRef<T> {
    /// Accepts a subscription if the original `Publisher` still exists.
    pub fn accept_subscription(&self, sub: impl Subscription<Item = T> + Send + 'static) {
        self.accept_subscription_or_closed(sub);
    }

    /// Accepts a subscription, returning `true` iff the original
    /// `Publisher` has not been dropped yet.
    pub fn accept_subscription_or_closed(
        &self,
        sub: impl Subscription<Item = T> + Send + 'static,
    ) -> bool {
        let Some(subs) = self.subs.upgrade() else {
            return false;
        };
        sub.increment_publishers(PublisherToken(Default::default()));
        subs.push(Box::new(sub));
        true
    }
}

impl<T> Clone for PublisherRef<T> {
    fn clone(&self) -> Self {
        Self {
            subs: self.subs.clone(),
        }
    }
}

struct SubscriberInner<T> {
    queue: ArrayQueue<T>,
    notify: Notify,
    pub_count: AtomicUsize,
}

/// The receiving half of a topic.
///
/// A `Subscriber` is a bounded queue that may be fed by any number of
/// publishers concurrently. When the queue is full the oldest value is
/// dropped, so a queue size of 1 gives latest-wins semantics.
pub struct Subscriber<T> {
    inner: Arc<SubscriberInner<T>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                queue: ArrayQueue::new(size),
                notify: Notify::default(),
                pub_count: AtomicUsize::default(),
            }),
        }
    }

    pub fn get_size(&self) -> usize {
        self.inner.queue.capacity()
    }

    /// Receives a value, or `None` once every connected `Publisher` has
    /// been dropped and the queue is empty.
    pub async fn recv_or_closed(&mut self) -> Option<T> {
        loop {
            if let Some(value) = self.inner.queue.pop() {
                return Some(value);
            }

            if self.inner.pub_count.load(Ordering::Acquire) == 0 {
                return None;
            }

            self.inner.notify.notified().await;
        }
    }

    /// Receives a value if one is immediately available.
    pub fn try_recv(&mut self) -> Option<T> {
        self.inner.queue.pop()
    }

    /// Waits for a value, even if all publishers have been dropped.
    pub async fn recv(&mut self) -> T {
        if let Some(x) = self.recv_or_closed().await {
            x
        } else {
            std::future::pending().await
        }
    }

    /// Creates a `Subscription` that must be passed to a `Publisher`.
    #[must_use]
    pub fn create_subscription(&self) -> DirectSubscription<T> {
        DirectSubscription {
            sub: Arc::downgrade(&self.inner),
            name: None,
            lag: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_returns_published_value() {
        let mut publisher = Publisher::default();
        let mut sub = Subscriber::new(4);
        publisher.accept_subscription(sub.create_subscription());

        publisher.set(7usize);
        assert_eq!(sub.recv_or_closed().await, Some(7));
    }

    #[tokio::test]
    async fn closed_when_publisher_dropped() {
        let mut sub = Subscriber::<usize>::new(1);
        {
            let publisher = Publisher::default();
            publisher.accept_subscription(sub.create_subscription());
            drop(publisher);
        }
        assert_eq!(sub.recv_or_closed().await, None);
    }

    #[tokio::test]
    async fn mapped_subscription_converts_values() {
        let mut publisher = Publisher::default();
        let mut sub = Subscriber::<String>::new(4);
        publisher.accept_subscription(sub.create_subscription().map(|n: u32| n.to_string()));

        publisher.set(42u32);
        assert_eq!(sub.recv_or_closed().await.as_deref(), Some("42"));
    }

    #[test]
    fn filter_mapped_subscription_drops_values() {
        let mut publisher = Publisher::default();
        let mut sub = Subscriber::<u32>::new(4);
        publisher
            .accept_subscription(sub.create_subscription().filter_map(|n: u32| (n % 2 == 0).then_some(n)));

        publisher.set(1u32);
        publisher.set(2u32);
        assert_eq!(sub.try_recv(), Some(2));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn queue_of_one_keeps_latest() {
        let mut publisher = Publisher::default();
        let mut sub = Subscriber::new(1);
        publisher.accept_subscription(sub.create_subscription());

        publisher.set(1usize);
        publisher.set(2usize);
        assert_eq!(sub.try_recv(), Some(2));
        assert_eq!(sub.try_recv(), None);
    }
}
