//! The synchronization handshake.
//!
//! To prove both peers are alive and agree to start, each side repeatedly
//! sends a `SyncRequest` carrying a locally drawn random nonce; the peer
//! echoes it in a `SyncReply`. After a configured number of successful
//! round-trips the connection is considered running. A stale or mismatched
//! echo is discarded and does not count. This is the only path that can move
//! a connection out of `Syncing`.

use tracing::{debug, trace};
use web_time::Instant;

use crate::network::messages::{SyncReply, SyncRequest};
use crate::options::ProtocolOptions;
use crate::rng::Pcg32;

/// What a [`Synchronizer::poll`] tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPoll {
    /// Nothing to do yet.
    Idle,
    /// The previous request went unanswered long enough; send this retry.
    Resend(SyncRequest),
    /// The handshake gave up after exhausting its retries.
    Failed,
}

/// Outcome of feeding an inbound reply to the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReplyOutcome {
    /// The echo did not match the outstanding nonce; ignore it.
    Ignored,
    /// One round-trip completed; send the next request immediately.
    Progress {
        /// Round-trips completed so far.
        count: u32,
        /// Total round-trips required.
        total: u32,
        /// The follow-up request to dispatch.
        next: SyncRequest,
    },
    /// All round-trips completed; the connection is synchronized.
    Finished {
        /// Total round-trips required (all of them done).
        total: u32,
    },
}

/// Drives the handshake that moves a connection from `Syncing` to `Running`.
#[derive(Debug)]
pub struct Synchronizer {
    total_roundtrips: u32,
    remaining_roundtrips: u32,
    /// Requests sent so far, retries included.
    attempts: u32,
    current_random: u32,
    last_request: Option<Instant>,
    failed: bool,
    options: SyncOptions,
}

/// The slice of [`ProtocolOptions`] the synchronizer needs.
#[derive(Debug, Clone, Copy)]
struct SyncOptions {
    roundtrips: u32,
    max_retries: u32,
    first_retry_interval: web_time::Duration,
    retry_interval: web_time::Duration,
}

impl Synchronizer {
    /// Creates an idle synchronizer; call [`begin`](Self::begin) to start.
    #[must_use]
    pub fn new(options: &ProtocolOptions) -> Self {
        Self {
            total_roundtrips: options.number_of_sync_roundtrips,
            remaining_roundtrips: options.number_of_sync_roundtrips,
            attempts: 0,
            current_random: 0,
            last_request: None,
            failed: false,
            options: SyncOptions {
                roundtrips: options.number_of_sync_roundtrips,
                max_retries: options.max_sync_retries,
                first_retry_interval: options.sync_first_retry_interval,
                retry_interval: options.sync_retry_interval,
            },
        }
    }

    /// Total round-trips the handshake requires.
    #[must_use]
    pub const fn total_roundtrips(&self) -> u32 {
        self.total_roundtrips
    }

    /// Round-trips completed so far.
    #[must_use]
    pub const fn completed_roundtrips(&self) -> u32 {
        self.total_roundtrips - self.remaining_roundtrips
    }

    /// Whether the handshake completed successfully.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.remaining_roundtrips == 0
    }

    /// Whether the handshake gave up.
    #[must_use]
    pub const fn has_failed(&self) -> bool {
        self.failed
    }

    /// Starts (or restarts) the handshake, returning the first request to
    /// send.
    pub fn begin(&mut self, now: Instant, rng: &mut Pcg32) -> SyncRequest {
        self.remaining_roundtrips = self.options.roundtrips;
        self.attempts = 0;
        self.failed = false;
        self.next_request(now, rng)
    }

    /// Checks the retry deadline. Call once per update tick while syncing.
    pub fn poll(&mut self, now: Instant, rng: &mut Pcg32) -> SyncPoll {
        if self.failed || self.is_finished() {
            return SyncPoll::Idle;
        }
        let Some(last_request) = self.last_request else {
            return SyncPoll::Idle;
        };

        // The first retry comes sooner than the steady-state cadence.
        let interval = if self.attempts <= 1 {
            self.options.first_retry_interval
        } else {
            self.options.retry_interval
        };
        if now.duration_since(last_request) < interval {
            return SyncPoll::Idle;
        }

        if self.attempts >= self.options.max_retries {
            debug!(
                "synchronization abandoned after {} request attempts",
                self.attempts
            );
            self.failed = true;
            return SyncPoll::Failed;
        }

        trace!("sync request retry, attempt {}", self.attempts + 1);
        SyncPoll::Resend(self.next_request(now, rng))
    }

    /// Feeds an inbound reply through the nonce check.
    pub fn handle_reply(
        &mut self,
        reply: SyncReply,
        now: Instant,
        rng: &mut Pcg32,
    ) -> SyncReplyOutcome {
        if self.failed || self.is_finished() {
            return SyncReplyOutcome::Ignored;
        }
        if reply.random_reply != self.current_random {
            trace!(
                "ignoring stale sync reply {:#010x}, expected {:#010x}",
                reply.random_reply,
                self.current_random
            );
            return SyncReplyOutcome::Ignored;
        }

        self.remaining_roundtrips -= 1;
        if self.remaining_roundtrips == 0 {
            debug!("handshake complete after {} roundtrips", self.total_roundtrips);
            return SyncReplyOutcome::Finished {
                total: self.total_roundtrips,
            };
        }

        SyncReplyOutcome::Progress {
            count: self.completed_roundtrips(),
            total: self.total_roundtrips,
            next: self.next_request(now, rng),
        }
    }

    fn next_request(&mut self, now: Instant, rng: &mut Pcg32) -> SyncRequest {
        self.current_random = rng.next_u32();
        self.attempts += 1;
        self.last_request = Some(now);
        SyncRequest {
            random_request: self.current_random,
        }
    }
}

// #########
// # TESTS #
// #########
