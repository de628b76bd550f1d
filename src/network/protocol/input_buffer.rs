//! The bounded window of local inputs awaiting acknowledgement.

use std::collections::VecDeque;

use bytes::BytesMut;
use tracing::trace;

use crate::frame_info::GameInput;
use crate::network::messages::{Input, PeerStatus};
use crate::wire::{BufferWriter, Endianness, WireEncode};
use crate::{Frame, SendInputResult};

/// Holds local input frames not yet acknowledged by the remote peer.
///
/// The window is bounded: a new input offered while the buffer is full is
/// rejected with [`SendInputResult::InputDropped`] rather than overwriting
/// pending data. Acknowledgement advances a low-water mark; entries at or
/// before the acknowledged frame are retired. The full unacknowledged window
/// is re-sent wholesale, both on the steady-state send path and by the
/// resend-on-silence timer.
#[derive(Debug)]
pub struct InputBuffer<I>
where
    I: Copy + Clone + PartialEq,
{
    pending: VecDeque<GameInput<I>>,
    last_acked_frame: Frame,
    max_pending: usize,
}

impl<I: Copy + Clone + PartialEq + Default + WireEncode> InputBuffer<I> {
    /// Creates a buffer bounded at `max_pending` unacknowledged inputs.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            last_acked_frame: Frame::NULL,
            max_pending,
        }
    }

    /// Offers one local input for transmission.
    pub fn offer(&mut self, input: GameInput<I>) -> SendInputResult {
        if self.pending.len() >= self.max_pending {
            trace!(
                "pending input window full ({}), dropping frame {}",
                self.max_pending,
                input.frame
            );
            return SendInputResult::InputDropped;
        }
        self.pending.push_back(input);
        SendInputResult::Ok
    }

    /// Retires every pending entry at or before `ack_frame`.
    pub fn acknowledge(&mut self, ack_frame: Frame) {
        if !ack_frame.is_valid() {
            return;
        }
        while self
            .pending
            .front()
            .is_some_and(|input| input.frame <= ack_frame)
        {
            self.pending.pop_front();
        }
        if ack_frame > self.last_acked_frame {
            self.last_acked_frame = ack_frame;
        }
    }

    /// Number of inputs awaiting acknowledgement.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The low-water mark: newest frame the peer has acknowledged.
    #[must_use]
    pub const fn last_acked_frame(&self) -> Frame {
        self.last_acked_frame
    }

    /// Frame of the oldest unacknowledged input, if any.
    #[must_use]
    pub fn first_pending_frame(&self) -> Option<Frame> {
        self.pending.front().map(|input| input.frame)
    }

    /// Frame of the newest unacknowledged input, if any.
    #[must_use]
    pub fn last_pending_frame(&self) -> Option<Frame> {
        self.pending.back().map(|input| input.frame)
    }

    /// Builds an `Input` message body carrying the entire unacknowledged
    /// window, or `None` when there is nothing to send.
    #[must_use]
    pub fn input_message(
        &self,
        endianness: Endianness,
        peer_status: &[PeerStatus],
        disconnect_requested: bool,
        ack_frame: Frame,
    ) -> Option<Input> {
        let start_frame = self.first_pending_frame()?;

        let mut bytes = BytesMut::new();
        let mut writer = BufferWriter::new(&mut bytes, endianness);
        for input in &self.pending {
            input.input.encode(&mut writer);
        }

        Some(Input {
            peer_connect_status: peer_status.to_vec(),
            disconnect_requested,
            start_frame,
            ack_frame,
            num_inputs: self.pending.len() as u32,
            bytes: bytes.to_vec(),
        })
    }
}

// #########
// # TESTS #
// #########
