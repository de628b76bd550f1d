//! The bounded outbound message queue.

use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::trace;
use web_time::{Duration, Instant};

use crate::network::messages::{Message, MessageBody, MessageHeader};
use crate::options::DelayStrategy;
use crate::rng::Pcg32;

/// Frames and queues outbound messages.
///
/// Every message is stamped with the local magic number and a wrapping
/// sequence counter. The queue is bounded: when full, the **oldest** pending
/// message is dropped, so enqueueing is always lossy and non-blocking from
/// the caller's perspective.
///
/// When an artificial latency is configured, each message is held until a
/// per-message deadline drawn from the configured delay distribution — a
/// fault-injection affordance for testing, not a reliability mechanism.
#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<QueuedMessage>,
    max_queue: usize,
    magic: u16,
    next_sequence: u16,
    latency: Duration,
    strategy: DelayStrategy,
}

#[derive(Debug)]
struct QueuedMessage {
    message: Message,
    due: Instant,
}

impl Outbox {
    /// Creates an outbox stamping messages with `magic`.
    #[must_use]
    pub fn new(max_queue: usize, magic: u16, latency: Duration, strategy: DelayStrategy) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_queue.min(64)),
            max_queue: max_queue.max(1),
            magic,
            next_sequence: 0,
            latency,
            strategy,
        }
    }

    /// Messages currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Stamps a header onto `body` and queues it for dispatch.
    pub fn push(&mut self, body: MessageBody, now: Instant, rng: &mut Pcg32) {
        if self.queue.len() >= self.max_queue {
            // Lossy by design: the newest message is the most valuable one.
            if let Some(dropped) = self.queue.pop_front() {
                trace!(
                    "outbound queue full, dropping oldest message seq {}",
                    dropped.message.header.sequence
                );
            }
        }

        let header = MessageHeader {
            magic: self.magic,
            sequence: self.next_sequence,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let due = now + self.delay(rng);
        self.queue.push_back(QueuedMessage {
            message: Message { header, body },
            due,
        });
    }

    /// Pops every message whose dispatch deadline has passed, preserving
    /// queue order.
    pub fn drain_ready(&mut self, now: Instant) -> SmallVec<[Message; 4]> {
        let mut ready = SmallVec::new();
        while self.queue.front().is_some_and(|queued| queued.due <= now) {
            if let Some(queued) = self.queue.pop_front() {
                ready.push(queued.message);
            }
        }
        ready
    }

    fn delay(&self, rng: &mut Pcg32) -> Duration {
        if self.latency.is_zero() {
            return Duration::ZERO;
        }
        match self.strategy {
            DelayStrategy::Fixed => self.latency,
            DelayStrategy::Gaussian => {
                let mean = self.latency.as_secs_f64() * 1000.0;
                let jittered = rng.next_gaussian(mean, mean / 4.0).max(0.0);
                Duration::from_secs_f64(jittered / 1000.0)
            }
        }
    }
}

// #########
// # TESTS #
// #########
