//! Lock-free channels for inter-thread communication
//!
//! Wrapper around crossbeam-channel. The engine runner drains its command
//! channel with [`Receiver::latest`] each cycle: a later operator command
//! overwrites an earlier unobserved one, with no queueing across cycles.

use crossbeam_channel::{self as cc, RecvTimeoutError, TryRecvError, TrySendError};
use std::time::Duration;

use crate::{Error, Result};

/// Sender half of a channel
#[derive(Debug)]
pub struct Sender<T> {
    inner: cc::Sender<T>,
}

impl<T> Sender<T> {
    /// Send a value, blocking until space is available
    #[inline]
    pub fn send(&self, value: T) -> Result<()> {
        self.inner.send(value).map_err(|_| Error::ChannelClosed)
    }

    /// Try to send without blocking
    #[inline]
    pub fn try_send(&self, value: T) -> Result<()> {
        match self.inner.try_send(value) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::ChannelFull),
            Err(TrySendError::Disconnected(_)) => Err(Error::ChannelClosed),
        }
    }

    /// Check if the channel is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the number of messages in the channel
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Receiver half of a channel
#[derive(Debug)]
pub struct Receiver<T> {
    pub(crate) inner: cc::Receiver<T>,
}

impl<T> Receiver<T> {
    /// Receive a value, blocking until one is available
    #[inline]
    pub fn recv(&self) -> Result<T> {
        self.inner.recv().map_err(|_| Error::ChannelClosed)
    }

    /// Try to receive without blocking
    #[inline]
    pub fn try_recv(&self) -> Result<Option<T>> {
        match self.inner.try_recv() {
            Ok(v) => Ok(Some(v)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Receive with a timeout
    #[inline]
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        match self.inner.recv_timeout(timeout) {
            Ok(v) => Ok(Some(v)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Get the latest message, discarding older ones
    ///
    /// Returns `None` when nothing is pending. Last-write-wins semantics.
    #[inline]
    pub fn latest(&self) -> Option<T> {
        let mut latest = match self.inner.try_recv() {
            Ok(v) => v,
            Err(_) => return None,
        };
        while let Ok(v) = self.inner.try_recv() {
            latest = v;
        }
        Some(latest)
    }

    /// Check if the channel is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the number of messages in the channel
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Create a bounded channel with the specified capacity
pub fn bounded_channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = cc::bounded(capacity);
    (Sender { inner: tx }, Receiver { inner: rx })
}

/// Create an unbounded channel
pub fn unbounded_channel<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = cc::unbounded();
    (Sender { inner: tx }, Receiver { inner: rx })
}
