//! Fan-in channel composition

use crate::{Channel, ChannelError, Handler, Sentinel};
use std::cell::RefCell;
use std::rc::Rc;

struct JoinEntry<T> {
    upstream: Channel<T>,
    forwarder: Handler<T>,
}

/// A channel that aggregates multiple upstream channels
///
/// Joining an upstream subscribes an internal forwarder; everything
/// published upstream is re-published downstream under the composite's
/// own sentinel, payload verbatim. Messages from several joined sources
/// fan in with no interleaving guarantee across sources.
///
/// A composite is itself a channel: its owner may publish on it directly,
/// and its [`as_channel`](CompositeChannel::as_channel) handle is a valid
/// join target, so composites nest.
pub struct CompositeChannel<T: 'static> {
    channel: Channel<T>,
    joins: Rc<RefCell<Vec<JoinEntry<T>>>>,
}

impl<T> Clone for CompositeChannel<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            joins: Rc::clone(&self.joins),
        }
    }
}

impl<T: 'static> CompositeChannel<T> {
    /// Creates a composite owned by the given sentinel
    pub fn new(sentinel: Sentinel) -> Self {
        Self {
            channel: Channel::new(sentinel),
            joins: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Joins an upstream channel into this composite
    ///
    /// Every join forwards independently: joining the same upstream twice
    /// delivers each of its messages twice downstream.
    pub fn join(&self, upstream: &Channel<T>) -> Result<(), ChannelError> {
        if self.channel.is_disposed() {
            return Err(ChannelError::Disposed);
        }
        let forwarder: Handler<T> = {
            let downstream = self.channel.clone();
            Rc::new(move |message: &T| {
                // Forwarding into a disposed composite is a quiet no-op.
                let _ = downstream.publish_owned(message);
            })
        };
        upstream.subscribe(forwarder.clone())?;
        self.joins.borrow_mut().push(JoinEntry {
            upstream: upstream.clone(),
            forwarder,
        });
        Ok(())
    }

    /// Removes one forwarding subscription from an upstream channel
    ///
    /// Returns whether a join was removed.
    pub fn leave(&self, upstream: &Channel<T>) -> bool {
        let entry = {
            let mut joins = self.joins.borrow_mut();
            match joins
                .iter()
                .position(|entry| entry.upstream.same_channel(upstream))
            {
                Some(index) => joins.remove(index),
                None => return false,
            }
        };
        entry.upstream.unsubscribe(&entry.forwarder);
        true
    }

    /// Returns the number of active joins
    pub fn join_count(&self) -> usize {
        self.joins.borrow().len()
    }

    /// Publishes directly on the composite (owner only)
    pub fn publish(&self, sentinel: &Sentinel, message: &T) -> Result<(), ChannelError> {
        self.channel.publish(sentinel, message)
    }

    /// Subscribes a handler to the composite's downstream side
    pub fn subscribe(&self, handler: Handler<T>) -> Result<(), ChannelError> {
        self.channel.subscribe(handler)
    }

    /// Removes a downstream handler by identity
    pub fn unsubscribe(&self, handler: &Handler<T>) -> bool {
        self.channel.unsubscribe(handler)
    }

    /// The composite viewed as a plain channel (nesting, listen targets)
    pub fn as_channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// Checks whether the composite has been disposed
    pub fn is_disposed(&self) -> bool {
        self.channel.is_disposed()
    }

    /// Leaves every upstream and disposes the downstream channel
    ///
    /// Idempotent, like [`Channel::dispose`].
    pub fn dispose(&self) {
        let entries = std::mem::take(&mut *self.joins.borrow_mut());
        for entry in entries {
            entry.upstream.unsubscribe(&entry.forwarder);
        }
        self.channel.dispose();
    }
}
