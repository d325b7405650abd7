//! Publish-subscribe topics for telemetry distribution
//!
//! The engine publishes each cycle's records on named topics
//! (`qc_status`, `qc_command`, `qc_control`). Multiple subscribers receive
//! copies of every message; payloads are `Arc`-wrapped by the publisher so
//! a publish is a pointer clone per subscriber.

use crossbeam_channel as cc;
use parking_lot::RwLock;
use std::sync::Arc;

use super::Receiver;

/// Configuration for a topic
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Maximum number of messages to buffer per subscriber
    pub buffer_size: usize,
    /// Topic name for debugging/logging
    pub name: Arc<str>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16,
            name: Arc::from(""),
        }
    }
}

impl TopicConfig {
    /// Create a new topic config with the given name
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

struct TopicInner<T> {
    config: TopicConfig,
    subscribers: Vec<cc::Sender<T>>,
}

impl<T: Clone + Send + 'static> TopicInner<T> {
    fn do_publish(&mut self, message: T) {
        // A subscriber that went away (or stopped draining) is dropped.
        self.subscribers
            .retain(|tx| tx.try_send(message.clone()).is_ok());
    }
}

/// A publish-subscribe topic
///
/// # Example
/// ```
/// use strider_core::comm::Topic;
///
/// let topic = Topic::<u32>::new("counts");
/// let sub = topic.subscribe();
/// topic.publish(7);
/// assert_eq!(sub.recv().unwrap(), 7);
/// ```
pub struct Topic<T> {
    inner: Arc<RwLock<TopicInner<T>>>,
}

impl<T: Clone + Send + 'static> Topic<T> {
    /// Create a new topic with default configuration
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_config(TopicConfig::new(name))
    }

    /// Create a new topic with custom configuration
    pub fn with_config(config: TopicConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TopicInner {
                config,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Get the topic name
    pub fn name(&self) -> Arc<str> {
        self.inner.read().config.name.clone()
    }

    /// Publish a message to all subscribers
    pub fn publish(&self, message: T) {
        {
            let inner = self.inner.read();
            if inner.subscribers.is_empty() {
                return;
            }
        }
        self.inner.write().do_publish(message);
    }

    /// Subscribe to the topic
    pub fn subscribe(&self) -> Receiver<T> {
        let mut inner = self.inner.write();
        let (tx, rx) = cc::bounded(inner.config.buffer_size);
        inner.subscribers.push(tx);
        Receiver { inner: rx }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

impl<T: Clone + Send + 'static> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
