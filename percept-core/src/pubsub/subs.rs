//! Subscriptions are created by Subscribers and consumed by Publishers.
//!
//! A `Subscription` can be adapted like an iterator before it is handed
//! over, which lets a `Publisher<T>` feed a `Subscriber<U>` through a
//! mapping function.

use std::{
    borrow::Cow,
    marker::PhantomData,
    sync::{atomic::Ordering, Weak},
};

use log::warn;

use super::SubscriberInner;

/// A token that only `Publisher` code can produce, keeping the publisher
/// bookkeeping methods out of reach of ordinary callers.
pub struct PublisherToken<'a>(pub(super) PhantomData<&'a ()>);

/// The receiving end of a topic from a `Publisher`'s point of view.
pub trait Subscription {
    type Item;

    /// Places a value into this subscription.
    ///
    /// Returns `true` iff the value could be consumed. A `false` return
    /// means the backing `Subscriber` no longer exists and the caller
    /// should drop this subscription.
    fn push(&mut self, value: Self::Item, token: PublisherToken) -> bool;

    /// Adapts this subscription to accept a different item type.
    fn map<F, O>(self, map: F) -> Map<Self, F, O>
    where
        Self: Sized,
        F: FnMut(O) -> Self::Item,
    {
        Map {
            inner: self,
            map,
            _phantom: PhantomData,
        }
    }

    /// Adapts this subscription to accept a different item type,
    /// discarding values for which `map` returns `None`.
    fn filter_map<F, O>(self, map: F) -> FilterMap<Self, F, O>
    where
        Self: Sized,
        F: FnMut(O) -> Option<Self::Item>,
    {
        FilterMap {
            inner: self,
            map,
            _phantom: PhantomData,
        }
    }

    /// Names this subscription, which enables lag warnings.
    ///
    /// When a publisher has to delete an old value to make room for a
    /// new one, the subscription is lagging; that indicates data loss
    /// and a lack of processing speed. Named subscriptions log a warning
    /// whenever this happens.
    #[must_use]
    fn set_name(mut self, name: impl Into<Cow<'static, str>>) -> Self
    where
        Self: Sized,
    {
        self.set_name_mut(name.into());
        self
    }

    /// Analogous to `set_name`, through a mutable reference.
    fn set_name_mut(&mut self, name: Cow<'static, str>);

    /// Increments the publisher count of the backing `Subscriber`, which
    /// it needs to know when all publishers have disconnected.
    fn increment_publishers(&self, token: PublisherToken);

    /// Decrements the publisher count of the backing `Subscriber`.
    fn decrement_publishers(&self, token: PublisherToken);
}

/// The subscription produced directly by [`Subscriber::create_subscription`].
///
/// Dropping this before passing it to a publisher leaks nothing and does
/// not affect the `Subscriber`.
///
/// [`Subscriber::create_subscription`]: super::Subscriber::create_subscription
#[derive(Debug)]
pub struct DirectSubscription<T> {
    pub(super) sub: Weak<SubscriberInner<T>>,
    pub(super) name: Option<Cow<'static, str>>,
    pub(super) lag: usize,
}

impl<T> Clone for DirectSubscription<T> {
    fn clone(&self) -> Self {
        Self {
            sub: self.sub.clone(),
            name: self.name.clone(),
            lag: self.lag,
        }
    }
}

impl<T> Subscription for DirectSubscription<T> {
    type Item = T;

    fn push(&mut self, value: Self::Item, _token: PublisherToken) -> bool {
        if let Some(sub) = self.sub.upgrade() {
            if sub.queue.force_push(value).is_some() {
                self.lag += 1;
                if let Some(name) = &self.name {
                    warn!(target: "publishers", "{name} lagging by {} messages", self.lag);
                }
            } else {
                self.lag = 0;
                sub.notify.notify_one();
            }
            true
        } else {
            false
        }
    }

    fn set_name_mut(&mut self, name: Cow<'static, str>) {
        self.name = Some(name);
    }

    fn increment_publishers(&self, _token: PublisherToken) {
        if let Some(sub) = self.sub.upgrade() {
            sub.pub_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn decrement_publishers(&self, _token: PublisherToken) {
        if let Some(sub) = self.sub.upgrade() {
            sub.pub_count.fetch_sub(1, Ordering::AcqRel);
            sub.notify.notify_one();
        }
    }
}

#[derive(Debug)]
pub struct Map<I, F, O> {
    inner: I,
    map: F,
    _phantom: PhantomData<O>,
}

impl<O, I, F> Subscription for Map<I, F, O>
where
    I: Subscription,
    F: FnMut(O) -> I::Item,
{
    type Item = O;

    fn push(&mut self, value: Self::Item, token: PublisherToken) -> bool {
        self.inner.push((self.map)(value), token)
    }

    fn set_name_mut(&mut self, name: Cow<'static, str>) {
        self.inner.set_name_mut(name);
    }

    fn increment_publishers(&self, token: PublisherToken) {
        self.inner.increment_publishers(token);
    }

    fn decrement_publishers(&self, token: PublisherToken) {
        self.inner.decrement_publishers(token);
    }
}

impl<I: Clone, F: Clone, O> Clone for Map<I, F, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            map: self.map.clone(),
            _phantom: PhantomData,
        }
    }
}

#[derive(Debug)]
pub struct FilterMap<I, F, O> {
    inner: I,
    map: F,
    _phantom: PhantomData<O>,
}

impl<O, I, F> Subscription for FilterMap<I, F, O>
where
    I: Subscription,
    F: FnMut(O) -> Option<I::Item>,
{
    type Item = O;

    fn push(&mut self, value: Self::Item, token: PublisherToken) -> bool {
        if let Some(value) = (self.map)(value) {
            self.inner.push(value, token)
        } else {
            true
        }
    }

    fn set_name_mut(&mut self, name: Cow<'static, str>) {
        self.inner.set_name_mut(name);
    }

    fn increment_publishers(&self, token: PublisherToken) {
        self.inner.increment_publishers(token);
    }

    fn decrement_publishers(&self, token: PublisherToken) {
        self.inner.decrement_publishers(token);
    }
}

impl<I: Clone, F: Clone, O> Clone for FilterMap<I, F, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            map: self.map.clone(),
            _phantom: PhantomData,
        }
    }
}

