//! The pub/sub primitive

use crate::Sentinel;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// A subscriber handler
///
/// Handler identity is `Rc` pointer identity: subscribing the same `Rc`
/// twice is an error, while two separately-allocated closures with
/// identical bodies are distinct subscribers.
pub type Handler<T> = Rc<dyn Fn(&T)>;

/// Errors for channel operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// Publish presented a sentinel that does not own this channel
    #[error("publish rejected: sentinel does not own this channel")]
    UnauthorizedPublish,

    /// The exact handler is already subscribed
    #[error("handler is already subscribed")]
    AlreadySubscribed,

    /// The channel has been disposed
    #[error("channel is disposed")]
    Disposed,
}

struct ChannelInner<T> {
    sentinel: Sentinel,
    /// `None` once disposed.
    subscribers: Option<Vec<Handler<T>>>,
}

/// Single-owner, multi-subscriber message bus
///
/// Cloning a `Channel` clones a handle to the same underlying bus, not a
/// new bus. Publishing requires the creation-time [`Sentinel`];
/// subscription is open to anyone holding a handle.
pub struct Channel<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Channel<T> {
    /// Creates a channel owned by the given sentinel
    pub fn new(sentinel: Sentinel) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChannelInner {
                sentinel,
                subscribers: Some(Vec::new()),
            })),
        }
    }

    /// Publishes a message to all current subscribers
    ///
    /// Fails without notifying anyone if the sentinel does not match or
    /// the channel is disposed. Delivery is synchronous and in
    /// subscription order; the subscriber list is snapshotted first, so
    /// handlers may subscribe, unsubscribe or publish reentrantly.
    pub fn publish(&self, sentinel: &Sentinel, message: &T) -> Result<(), ChannelError> {
        {
            let inner = self.inner.borrow();
            if inner.subscribers.is_none() {
                return Err(ChannelError::Disposed);
            }
            if !inner.sentinel.matches(sentinel) {
                return Err(ChannelError::UnauthorizedPublish);
            }
        }
        self.notify(message);
        Ok(())
    }

    /// Publishes under the channel's own sentinel
    ///
    /// Used by composite forwarding, where the republish is authorized by
    /// construction.
    pub(crate) fn publish_owned(&self, message: &T) -> Result<(), ChannelError> {
        if self.inner.borrow().subscribers.is_none() {
            return Err(ChannelError::Disposed);
        }
        self.notify(message);
        Ok(())
    }

    fn notify(&self, message: &T) {
        let snapshot: Vec<Handler<T>> = match &self.inner.borrow().subscribers {
            Some(subscribers) => subscribers.clone(),
            None => return,
        };
        for handler in snapshot {
            handler(message);
        }
    }

    /// Subscribes a handler
    ///
    /// Fails if this exact handler (by `Rc` identity) is already
    /// subscribed or the channel is disposed.
    pub fn subscribe(&self, handler: Handler<T>) -> Result<(), ChannelError> {
        let mut inner = self.inner.borrow_mut();
        let subscribers = inner
            .subscribers
            .as_mut()
            .ok_or(ChannelError::Disposed)?;
        if subscribers.iter().any(|h| Rc::ptr_eq(h, &handler)) {
            return Err(ChannelError::AlreadySubscribed);
        }
        subscribers.push(handler);
        Ok(())
    }

    /// Removes a handler by identity
    ///
    /// Returns whether the handler was subscribed; absent handlers and
    /// disposed channels are a quiet no-op.
    pub fn unsubscribe(&self, handler: &Handler<T>) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(subscribers) = inner.subscribers.as_mut() else {
            return false;
        };
        match subscribers.iter().position(|h| Rc::ptr_eq(h, handler)) {
            Some(index) => {
                subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .as_ref()
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Checks whether this channel has been disposed
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().subscribers.is_none()
    }

    /// Checks whether two handles refer to the same underlying channel
    pub fn same_channel(&self, other: &Channel<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Clears all subscribers and forbids further use
    ///
    /// Idempotent; disposing twice leaves the channel in the same state.
    pub fn dispose(&self) {
        self.inner.borrow_mut().subscribers = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_handler(count: Rc<Cell<usize>>) -> Handler<u32> {
        Rc::new(move |_| count.set(count.get() + 1))
    }

    // ===== publish authorization =====

    #[test]
    fn test_publish_with_owning_sentinel() {
        let sentinel = Sentinel::new();
        let channel = Channel::new(sentinel.clone());
        let count = Rc::new(Cell::new(0));
        channel.subscribe(counting_handler(count.clone())).unwrap();

        channel.publish(&sentinel, &7).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_publish_with_foreign_sentinel_fails() {
        let channel = Channel::new(Sentinel::new());
        let count = Rc::new(Cell::new(0));
        channel.subscribe(counting_handler(count.clone())).unwrap();

        let foreign = Sentinel::new();
        assert_eq!(
            channel.publish(&foreign, &7),
            Err(ChannelError::UnauthorizedPublish)
        );
        assert_eq!(count.get(), 0, "subscribers must not be notified");
    }

    // ===== subscription identity =====

    #[test]
    fn test_double_subscribe_same_handler_fails() {
        let channel: Channel<u32> = Channel::new(Sentinel::new());
        let handler = counting_handler(Rc::new(Cell::new(0)));

        channel.subscribe(handler.clone()).unwrap();
        assert_eq!(
            channel.subscribe(handler),
            Err(ChannelError::AlreadySubscribed)
        );
    }

    #[test]
    fn test_resubscribe_after_unsubscribe() {
        let channel: Channel<u32> = Channel::new(Sentinel::new());
        let handler = counting_handler(Rc::new(Cell::new(0)));

        channel.subscribe(handler.clone()).unwrap();
        assert!(channel.unsubscribe(&handler));
        channel.subscribe(handler).unwrap();
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_absent_handler_is_noop() {
        let channel: Channel<u32> = Channel::new(Sentinel::new());
        let handler = counting_handler(Rc::new(Cell::new(0)));
        assert!(!channel.unsubscribe(&handler));
    }

    #[test]
    fn test_distinct_closures_are_distinct_subscribers() {
        let sentinel = Sentinel::new();
        let channel = Channel::new(sentinel.clone());
        let count = Rc::new(Cell::new(0));

        channel.subscribe(counting_handler(count.clone())).unwrap();
        channel.subscribe(counting_handler(count.clone())).unwrap();

        channel.publish(&sentinel, &1).unwrap();
        assert_eq!(count.get(), 2);
    }

    // ===== delivery order =====

    #[test]
    fn test_delivery_in_subscription_order() {
        let sentinel = Sentinel::new();
        let channel: Channel<u32> = Channel::new(sentinel.clone());
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let order = order.clone();
            Rc::new(move |_: &u32| order.borrow_mut().push("first")) as Handler<u32>
        };
        let second = {
            let order = order.clone();
            Rc::new(move |_: &u32| order.borrow_mut().push("second")) as Handler<u32>
        };
        channel.subscribe(first).unwrap();
        channel.subscribe(second).unwrap();

        channel.publish(&sentinel, &1).unwrap();
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_subscriber_added_during_publish_not_notified() {
        let sentinel = Sentinel::new();
        let channel: Channel<u32> = Channel::new(sentinel.clone());
        let late_count = Rc::new(Cell::new(0));

        let reentrant = {
            let channel = channel.clone();
            let late_count = late_count.clone();
            Rc::new(move |_: &u32| {
                let _ = channel.subscribe(counting_handler(late_count.clone()));
            }) as Handler<u32>
        };
        channel.subscribe(reentrant).unwrap();

        channel.publish(&sentinel, &1).unwrap();
        assert_eq!(late_count.get(), 0, "snapshot excludes the new subscriber");

        channel.publish(&sentinel, &2).unwrap();
        assert_eq!(late_count.get(), 1);
    }

    // ===== disposal =====

    #[test]
    fn test_dispose_clears_and_forbids_use() {
        let sentinel = Sentinel::new();
        let channel = Channel::new(sentinel.clone());
        channel
            .subscribe(counting_handler(Rc::new(Cell::new(0))))
            .unwrap();

        channel.dispose();
        assert!(channel.is_disposed());
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.publish(&sentinel, &1), Err(ChannelError::Disposed));
        assert_eq!(
            channel.subscribe(counting_handler(Rc::new(Cell::new(0)))),
            Err(ChannelError::Disposed)
        );
    }

    #[test]
    fn test_double_dispose_is_idempotent() {
        let channel: Channel<u32> = Channel::new(Sentinel::new());
        channel.dispose();
        channel.dispose();
        assert!(channel.is_disposed());
    }

    #[test]
    fn test_clone_is_same_channel() {
        let channel: Channel<u32> = Channel::new(Sentinel::new());
        let other: Channel<u32> = Channel::new(Sentinel::new());
        let handle = channel.clone();

        assert!(channel.same_channel(&handle));
        assert!(!channel.same_channel(&other));
    }
}
