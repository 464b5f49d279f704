//! Single-slot broadcast channels with replay of the last value.
//!
//! Delivery is synchronous and single-threaded: [`Channel::publish`] returns after every
//! subscriber has seen the value. A subscriber must not publish onto the channel it is
//! being called from; such a publish is dropped with a warning.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    engine::{integrator::EnergyUpdate, tariff::ThresholdUpdate},
    prelude::*,
};

/// Subscriber callback: [`None`] means no value yet, or the value has been cleared.
pub type Callback<T> = Box<dyn FnMut(Option<&T>) -> Result>;

#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

pub struct Channel<T> {
    name: &'static str,
    current: RefCell<Option<T>>,
    subscribers: RefCell<Vec<(SubscriptionId, Callback<T>)>>,

    /// Subscriptions made while a delivery is in progress.
    joining: RefCell<Vec<(SubscriptionId, Callback<T>)>>,

    /// Unsubscriptions requested while a delivery is in progress.
    leaving: RefCell<Vec<SubscriptionId>>,

    next_id: Cell<u64>,
    is_delivering: Cell<bool>,
}

impl<T> Channel<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            current: RefCell::new(None),
            subscribers: RefCell::new(Vec::new()),
            joining: RefCell::new(Vec::new()),
            leaving: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            is_delivering: Cell::new(false),
        }
    }

    /// Register the callback and immediately call it with the current value.
    pub fn subscribe(&self, callback: impl FnMut(Option<&T>) -> Result + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let mut callback: Callback<T> = Box::new(callback);
        if let Ok(current) = self.current.try_borrow() {
            self.call(id, &mut callback, current.as_ref());
        } else {
            warn!(channel = self.name, ?id, "could not replay the current value");
        }

        if self.is_delivering.get() {
            self.joining.borrow_mut().push((id, callback));
        } else {
            self.subscribers.borrow_mut().push((id, callback));
        }
        id
    }

    /// Stop delivering to the subscription. Returns `false` for an unknown subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        if self.is_delivering.get() {
            self.leaving.borrow_mut().push(id);
            return true;
        }
        let mut subscribers = self.subscribers.borrow_mut();
        let n_subscribers = subscribers.len();
        subscribers.retain(|(subscriber_id, _)| *subscriber_id != id);
        subscribers.len() != n_subscribers
    }

    /// Store the value and deliver it to every subscriber in subscription order.
    pub fn publish(&self, value: T) {
        self.deliver(Some(value));
    }

    /// Reset the channel to «no value» and tell the subscribers.
    pub fn clear(&self) {
        self.deliver(None);
    }

    #[must_use]
    pub fn current(&self) -> Option<T>
    where
        T: Clone,
    {
        self.current.borrow().clone()
    }

    #[must_use]
    pub fn n_subscribers(&self) -> usize {
        self.subscribers.borrow().len() + self.joining.borrow().len()
    }

    fn deliver(&self, value: Option<T>) {
        if self.is_delivering.replace(true) {
            warn!(channel = self.name, "dropping a re-entrant publish");
            return;
        }

        *self.current.borrow_mut() = value;
        {
            let current = self.current.borrow();
            let mut subscribers = self.subscribers.borrow_mut();
            for (id, callback) in subscribers.iter_mut() {
                self.call(*id, callback, current.as_ref());
            }
        }

        self.is_delivering.set(false);
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.append(&mut self.joining.borrow_mut());
        for id in self.leaving.borrow_mut().drain(..) {
            subscribers.retain(|(subscriber_id, _)| *subscriber_id != id);
        }
    }

    /// A failing subscriber must not prevent the others from receiving the value.
    fn call(&self, id: SubscriptionId, callback: &mut Callback<T>, value: Option<&T>) {
        if let Err(error) = callback(value) {
            warn!(channel = self.name, ?id, "subscriber failed: {error:#}");
        }
    }
}

/// The two channels every component talks through.
pub struct Hub {
    /// Energy and power updates of the integrator.
    pub effect: Rc<Channel<EnergyUpdate>>,

    /// Tariff level updates of the classifier.
    pub threshold: Rc<Channel<ThresholdUpdate>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self {
            effect: Rc::new(Channel::new("effect")),
            threshold: Rc::new(Channel::new("threshold")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(channel: &Channel<u32>) -> (SubscriptionId, Rc<RefCell<Vec<Option<u32>>>>) {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let id = channel.subscribe(move |value| {
            sink.borrow_mut().push(value.copied());
            Ok(())
        });
        (id, received)
    }

    #[test]
    fn test_subscribe_replays_the_sentinel() {
        let channel = Channel::<u32>::new("test");
        let (_, received) = recorder(&channel);
        assert_eq!(*received.borrow(), [None]);
    }

    #[test]
    fn test_subscribe_replays_the_last_value() {
        let channel = Channel::new("test");
        channel.publish(1);
        channel.publish(2);
        let (_, received) = recorder(&channel);
        assert_eq!(*received.borrow(), [Some(2)]);
        assert_eq!(channel.current(), Some(2));
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let channel = Channel::new("test");
        let order = Rc::new(RefCell::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            let _ = channel.subscribe(move |value: Option<&u32>| {
                if let Some(value) = value {
                    order.borrow_mut().push((name, *value));
                }
                Ok(())
            });
        }
        channel.publish(42);
        assert_eq!(*order.borrow(), [("first", 42), ("second", 42), ("third", 42)]);
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let channel = Channel::new("test");
        let _ = channel.subscribe(|value: Option<&u32>| match value {
            Some(_) => bail!("broken consumer"),
            None => Ok(()),
        });
        let (_, received) = recorder(&channel);
        channel.publish(7);
        assert_eq!(*received.borrow(), [None, Some(7)]);
    }

    #[test]
    fn test_clear_delivers_the_sentinel() {
        let channel = Channel::new("test");
        let (_, received) = recorder(&channel);
        channel.publish(1);
        channel.clear();
        assert_eq!(*received.borrow(), [None, Some(1), None]);
        assert_eq!(channel.current(), None);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let channel = Channel::new("test");
        let (id, received) = recorder(&channel);
        assert!(channel.unsubscribe(id));
        assert!(!channel.unsubscribe(id));
        channel.publish(1);
        assert_eq!(*received.borrow(), [None]);
        assert_eq!(channel.n_subscribers(), 0);
    }

    #[test]
    fn test_reentrant_publish_is_dropped() {
        let channel = Rc::new(Channel::new("test"));
        let inner = Rc::clone(&channel);
        let _ = channel.subscribe(move |value: Option<&u32>| {
            if let Some(value) = value {
                inner.publish(value + 1);
            }
            Ok(())
        });
        let (_, received) = recorder(&channel);
        channel.publish(1);
        assert_eq!(*received.borrow(), [None, Some(1)]);
        assert_eq!(channel.current(), Some(1));
    }

    #[test]
    fn test_unsubscribe_during_delivery() {
        let channel = Rc::new(Channel::new("test"));
        let inner = Rc::clone(&channel);
        let own_id = Rc::new(Cell::new(None));
        let own_id_inner = Rc::clone(&own_id);
        let calls = Rc::new(Cell::new(0));
        let calls_inner = Rc::clone(&calls);
        let id = channel.subscribe(move |value: Option<&u32>| {
            calls_inner.set(calls_inner.get() + 1);
            if value.is_some()
                && let Some(id) = own_id_inner.get()
            {
                inner.unsubscribe(id);
            }
            Ok(())
        });
        own_id.set(Some(id));
        channel.publish(1);
        channel.publish(2);
        assert_eq!(calls.get(), 2);
        assert_eq!(channel.n_subscribers(), 0);
    }
}
