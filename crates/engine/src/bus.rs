//! In-process topic bus
//!
//! Minimal `subscribe(topic) -> receive(notification)` surface that outer
//! layers bridge to their own distribution mechanism. Each subscription owns
//! an unbounded mailbox; dropping the subscription unregisters it on the
//! next publish.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::events::Notification;

struct Mailbox {
    queue: Mutex<VecDeque<Notification>>,
    ready: Condvar,
}

impl Mailbox {
    fn deliver(&self, notification: Notification) {
        self.queue.lock().push_back(notification);
        self.ready.notify_one();
    }
}

#[derive(Default)]
struct BusInner {
    topics: Mutex<FxHashMap<String, Vec<Weak<Mailbox>>>>,
}

/// Cloneable handle to a shared bus
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Subscribe to one topic
    pub fn subscribe(&self, topic: &str) -> Subscription {
        self.subscribe_all(&[topic])
    }

    /// Subscribe one mailbox to several topics
    pub fn subscribe_all(&self, topics: &[&str]) -> Subscription {
        let mailbox = Arc::new(Mailbox {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        });
        let mut map = self.inner.topics.lock();
        for topic in topics {
            map.entry((*topic).to_string())
                .or_default()
                .push(Arc::downgrade(&mailbox));
        }
        Subscription {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            mailbox,
        }
    }

    /// Publish on the notification's own topic
    ///
    /// Returns the number of live subscribers that received it.
    pub fn publish(&self, notification: Notification) -> usize {
        let topic = notification.topic();
        let targets: Vec<Arc<Mailbox>> = {
            let mut map = self.inner.topics.lock();
            match map.get_mut(topic) {
                Some(subs) => {
                    subs.retain(|w| w.strong_count() > 0);
                    subs.iter().filter_map(Weak::upgrade).collect()
                }
                None => Vec::new(),
            }
        };
        for mailbox in &targets {
            mailbox.deliver(notification.clone());
        }
        targets.len()
    }

    /// Live subscribers of a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map_or(0, |subs| subs.iter().filter(|w| w.strong_count() > 0).count())
    }
}

/// Receiving end of a subscription
pub struct Subscription {
    topics: Vec<String>,
    mailbox: Arc<Mailbox>,
}

impl Subscription {
    /// Topics this subscription listens on
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Take the next notification without waiting
    pub fn try_recv(&self) -> Option<Notification> {
        self.mailbox.queue.lock().pop_front()
    }

    /// Wait up to `timeout` for the next notification
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.mailbox.queue.lock();
        loop {
            if let Some(n) = queue.pop_front() {
                return Some(n);
            }
            if self
                .mailbox
                .ready
                .wait_until(&mut queue, deadline)
                .timed_out()
            {
                return queue.pop_front();
            }
        }
    }

    /// Take everything queued so far
    pub fn drain(&self) -> Vec<Notification> {
        self.mailbox.queue.lock().drain(..).collect()
    }
}
