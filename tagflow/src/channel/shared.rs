//! Bounded multi-producer/multi-consumer FIFO shared by every stage.

use super::{ChannelConfig, ChannelMetrics, MessagePort, SendMode};
use crate::core::Envelope;
use crate::errors::ChannelError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct ChannelState {
    queue: VecDeque<Envelope>,
    closed: bool,
    puts: u64,
}

impl ChannelState {
    fn push(&mut self, envelope: Envelope) -> usize {
        self.queue.push_back(envelope);
        self.puts += 1;
        self.queue.len()
    }
}

/// A bounded, tag-agnostic FIFO queue of envelopes.
///
/// The buffer sits behind a mutex that is never held across an await.
/// Blocked senders wait on `not_full`, blocked receivers on `not_empty`,
/// and stages waiting for new traffic on `activity`. Waiters register
/// interest before inspecting the buffer so a wakeup between the check and
/// the await is never lost.
///
/// Only [`send`](Self::send) waits for capacity. [`forward`](Self::forward)
/// and [`requeue`](Self::requeue) put back into a slot their caller just
/// freed with a receive, so occupancy stays within capacity plus one per
/// consuming stage.
///
/// The channel does not filter by tag. Selective consumption is done by the
/// stage runner on top of [`try_receive`](Self::try_receive) and `requeue`.
#[derive(Debug)]
pub struct SharedChannel {
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    not_empty: Notify,
    not_full: Notify,
    activity: Notify,
    metrics: ChannelMetrics,
}

impl SharedChannel {
    /// Creates a channel, rejecting an unusable configuration.
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        config.validate()?;
        debug!(
            capacity = config.capacity,
            max_message_size = config.max_message_size,
            "Shared channel created"
        );
        Ok(Self {
            config,
            state: Mutex::new(ChannelState::default()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            activity: Notify::new(),
            metrics: ChannelMetrics::default(),
        })
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the number of queued envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Returns true once the channel has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the traffic counters.
    #[must_use]
    pub fn metrics(&self) -> &ChannelMetrics {
        &self.metrics
    }

    /// Sends an envelope.
    ///
    /// In [`SendMode::Blocking`] this waits until a slot frees up or the
    /// channel closes. In [`SendMode::NonBlocking`] a full queue fails with
    /// `CapacityExceeded`.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.config.send_mode == SendMode::NonBlocking {
            return self.try_send(envelope);
        }
        self.check_size(&envelope)?;

        let mut first_attempt = true;
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    if first_attempt {
                        self.metrics.record_after_close();
                    }
                    return Err(ChannelError::Closed);
                }
                if state.queue.len() < self.config.capacity {
                    let len = state.push(envelope);
                    self.metrics.record_send(len);
                    drop(state);
                    self.notify_put();
                    return Ok(());
                }
            }

            if first_attempt {
                trace!(capacity = self.config.capacity, "Channel full, sender waiting");
            }
            first_attempt = false;
            notified.await;
        }
    }

    /// Sends an envelope without waiting.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.check_size(&envelope)?;

        let mut state = self.state.lock();
        if state.closed {
            self.metrics.record_after_close();
            return Err(ChannelError::Closed);
        }
        if state.queue.len() >= self.config.capacity {
            return Err(ChannelError::CapacityExceeded {
                capacity: self.config.capacity,
            });
        }
        let len = state.push(envelope);
        self.metrics.record_send(len);
        drop(state);
        self.notify_put();
        Ok(())
    }

    /// Sends an envelope derived from one the caller just received.
    ///
    /// The new envelope takes over the consumed envelope's slot, so this
    /// never waits for capacity. A stage blocked on sending its output while
    /// the queue is full of its own input would otherwise never drain it.
    pub fn forward(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.check_size(&envelope)?;

        let mut state = self.state.lock();
        if state.closed {
            self.metrics.record_after_close();
            return Err(ChannelError::Closed);
        }
        let len = state.push(envelope);
        self.metrics.record_send(len);
        drop(state);
        self.notify_put();
        Ok(())
    }

    /// Receives the oldest envelope, waiting until one is available.
    ///
    /// Envelopes queued before teardown are still delivered; `Closed` is only
    /// returned once the channel is closed and empty.
    pub async fn receive(&self) -> Result<Envelope, ChannelError> {
        let mut first_attempt = true;
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if first_attempt && state.closed {
                    self.metrics.record_after_close();
                }
                if let Some(envelope) = state.queue.pop_front() {
                    self.metrics.record_receive();
                    drop(state);
                    self.not_full.notify_one();
                    return Ok(envelope);
                }
                if state.closed {
                    return Err(ChannelError::Closed);
                }
            }

            first_attempt = false;
            notified.await;
        }
    }

    /// Takes the oldest envelope if there is one, without waiting.
    ///
    /// Returns `Ok(None)` on an empty open channel and `Closed` on an empty
    /// closed one.
    pub fn try_receive(&self) -> Result<Option<Envelope>, ChannelError> {
        let mut state = self.state.lock();
        if state.closed {
            self.metrics.record_after_close();
        }
        match state.queue.pop_front() {
            Some(envelope) => {
                self.metrics.record_receive();
                drop(state);
                self.not_full.notify_one();
                Ok(Some(envelope))
            }
            None if state.closed => Err(ChannelError::Closed),
            None => Ok(None),
        }
    }

    /// Appends a just-received envelope back to the tail.
    ///
    /// The envelope occupies the slot its own `receive` released, so this
    /// never waits for capacity. Two selective consumers holding each
    /// other's envelopes on a full queue would otherwise deadlock.
    pub fn requeue(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.closed {
            self.metrics.record_after_close();
            return Err(ChannelError::Closed);
        }
        let len = state.push(envelope);
        self.metrics.record_requeue(len);
        drop(state);
        self.notify_put();
        Ok(())
    }

    /// Returns how many envelopes have ever been put on the channel by
    /// `send`, `try_send`, `forward` or `requeue`.
    #[must_use]
    pub fn activity(&self) -> u64 {
        self.state.lock().puts
    }

    /// Waits until more than `after` envelopes have been put on the channel.
    ///
    /// Fails with `Closed` if the channel is torn down first.
    pub async fn wait_for_activity(&self, after: u64) -> Result<(), ChannelError> {
        loop {
            let notified = self.activity.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if state.puts > after {
                    return Ok(());
                }
                if state.closed {
                    return Err(ChannelError::Closed);
                }
            }

            notified.await;
        }
    }

    /// Tears the channel down and wakes every blocked sender and receiver.
    ///
    /// Fails with `AlreadyClosed` on the second call.
    pub fn close(&self) -> Result<(), ChannelError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ChannelError::AlreadyClosed);
            }
            state.closed = true;
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
        self.activity.notify_waiters();
        debug!("Shared channel closed");
        Ok(())
    }

    fn notify_put(&self) {
        self.not_empty.notify_one();
        self.activity.notify_waiters();
    }

    fn check_size(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        let size = envelope.wire_size();
        if size > self.config.max_message_size {
            return Err(ChannelError::MessageTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessagePort for SharedChannel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        Self::send(self, envelope).await
    }

    async fn receive(&self) -> Result<Envelope, ChannelError> {
        Self::receive(self).await
    }

    async fn forward(&self, envelope: Envelope) -> Result<(), ChannelError> {
        Self::forward(self, envelope)
    }

    fn try_receive(&self) -> Result<Option<Envelope>, ChannelError> {
        Self::try_receive(self)
    }

    async fn requeue(&self, envelope: Envelope) -> Result<(), ChannelError> {
        Self::requeue(self, envelope)
    }

    fn activity(&self) -> u64 {
        Self::activity(self)
    }

    async fn wait_for_activity(&self, after: u64) -> Result<(), ChannelError> {
        Self::wait_for_activity(self, after).await
    }
}
