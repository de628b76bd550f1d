//! Inbound packet dispatch.
//!
//! Every received datagram passes three gates before its handler runs:
//! decode, magic filter, sequence-distance filter. A packet failing any gate
//! is dropped silently; malformed or hostile traffic must never tear down a
//! connection.

use tracing::trace;
use web_time::{Duration, Instant};

use crate::frame_info::GameInput;
use crate::network::messages::{
    ConsistencyCheckReply, ConsistencyCheckRequest, Input, InputAck, Message, MessageBody,
    QualityReply, QualityReport, SyncReply, SyncRequest,
};
use crate::wire::{self, BufferReader, WireDecode};
use crate::Config;

use super::state::ProtocolStatus as Status;
use super::sync::SyncReplyOutcome;
use super::{Event, PeerConnection};

impl<T: Config> PeerConnection<T> {
    /// Feeds one received datagram through the filters and into its handler.
    pub fn handle_message(&mut self, buf: &[u8]) {
        if self.state.status().is_terminal() {
            return;
        }

        let message = match wire::decode::<Message>(buf, self.options.serialization_endianness) {
            Ok(message) => message,
            Err(err) => {
                trace!("dropping undecodable packet ({} bytes): {err}", buf.len());
                return;
            }
        };

        // Sync messages establish the peer's identity, so they are exempt
        // from the magic filter. Everything else must carry the magic learned
        // during the handshake.
        let is_sync = matches!(
            message.body,
            MessageBody::SyncRequest(_) | MessageBody::SyncReply(_)
        );
        if !is_sync && self.remote_magic != Some(message.header.magic) {
            trace!(
                "dropping packet with magic {:#06x}, expected {:?}",
                message.header.magic,
                self.remote_magic
            );
            return;
        }

        // Replays inside the window are tolerated (frame-level dedup catches
        // them); anything further out is corruption or forgery.
        if let Some(last) = self.last_recv_sequence {
            let distance = message.header.sequence.wrapping_sub(last);
            if distance > self.options.max_sequence_distance {
                trace!(
                    "dropping packet, sequence {} too far from {last}",
                    message.header.sequence
                );
                return;
            }
        }
        self.last_recv_sequence = Some(message.header.sequence);

        let now = Instant::now();
        self.state.stats.recv.total_packets += 1;
        self.state.stats.recv.total_bytes += buf.len();
        self.state.stats.last_recv_time = now;

        match message.body {
            MessageBody::SyncRequest(body) => self.on_sync_request(body, now),
            MessageBody::SyncReply(body) => {
                self.on_sync_reply(message.header.magic, body, now);
            }
            MessageBody::Input(body) => self.on_input(&body, now),
            MessageBody::InputAck(body) => self.on_input_ack(body),
            MessageBody::QualityReport(body) => self.on_quality_report(body, now),
            MessageBody::QualityReply(body) => self.on_quality_reply(body, now),
            MessageBody::KeepAlive => trace!("received keep alive packet"),
            MessageBody::ConsistencyCheckRequest(body) => {
                self.on_consistency_request(body, now);
            }
            MessageBody::ConsistencyCheckReply(body) => self.on_consistency_reply(body),
        }
    }

    /// Echoes the peer's nonce. Answered in every non-terminal state so a
    /// restarting peer can still complete its handshake.
    fn on_sync_request(&mut self, body: SyncRequest, now: Instant) {
        self.queue_message(
            MessageBody::SyncReply(SyncReply {
                random_reply: body.random_request,
            }),
            now,
        );
    }

    fn on_sync_reply(&mut self, header_magic: u16, body: SyncReply, now: Instant) {
        if self.state.status() != Status::Syncing {
            return;
        }
        match self.synchronizer.handle_reply(body, now, &mut self.rng) {
            SyncReplyOutcome::Ignored => {}
            SyncReplyOutcome::Progress { count, total, next } => {
                self.event_queue
                    .push_back(Event::Synchronizing { total, count });
                self.queue_message(MessageBody::SyncRequest(next), now);
            }
            SyncReplyOutcome::Finished { total } => {
                self.remote_magic = Some(header_magic);
                self.state.advance_status(Status::Running);
                self.event_queue.push_back(Event::Synchronizing {
                    total,
                    count: total,
                });
                self.event_queue.push_back(Event::Connected);
            }
        }
    }

    fn on_input(&mut self, body: &Input, now: Instant) {
        if body.disconnect_requested {
            // The peer announced its own departure; no grace period needed.
            self.dispatch_disconnect_event();
            self.state.advance_status(Status::Disconnected);
            return;
        }

        self.merge_peer_status(&body.peer_connect_status);
        self.input_buffer.acknowledge(body.ack_frame);
        self.state.stats.last_input_recv_time = now;

        let mut reader =
            BufferReader::new(&body.bytes, self.options.serialization_endianness);
        for offset in 0..body.num_inputs {
            let input = match T::Input::decode(&mut reader) {
                Ok(input) => input,
                Err(err) => {
                    trace!("stopping input decode at offset {offset}: {err}");
                    break;
                }
            };
            let frame = body.start_frame + offset as i32;

            // Windows overlap across resends; everything at or before the
            // newest accepted frame is old news.
            if self.state.last_recv_frame.is_valid() && frame <= self.state.last_recv_frame {
                continue;
            }
            self.state.last_recv_frame = frame;
            if let Some(status) = self
                .state
                .peer_status
                .get_mut(self.remote_player.as_usize())
            {
                if frame > status.last_frame {
                    status.last_frame = frame;
                }
            }
            self.event_queue
                .push_back(Event::Input(GameInput::new(frame, input)));
        }

        self.queue_message(
            MessageBody::InputAck(InputAck {
                ack_frame: self.state.last_recv_frame,
            }),
            now,
        );
    }

    /// Folds the peer's view of every player into ours. The disconnected
    /// flag is sticky and last frames never regress, so the merged table
    /// converges no matter the arrival order.
    fn merge_peer_status(&mut self, reported: &[crate::network::messages::PeerStatus]) {
        for (local, remote) in self.state.peer_status.iter_mut().zip(reported) {
            local.disconnected |= remote.disconnected;
            if remote.last_frame > local.last_frame {
                local.last_frame = remote.last_frame;
            }
        }
    }

    fn on_input_ack(&mut self, body: InputAck) {
        self.input_buffer.acknowledge(body.ack_frame);
    }

    fn on_quality_report(&mut self, body: QualityReport, now: Instant) {
        self.state.remote_frame_advantage = body.frame_advantage;
        self.queue_message(
            MessageBody::QualityReply(QualityReply { pong: body.ping }),
            now,
        );
    }

    fn on_quality_reply(&mut self, body: QualityReply, now: Instant) {
        let elapsed = self.epoch_millis(now).saturating_sub(body.pong);
        self.state.stats.round_trip_time = Duration::from_millis(elapsed);
    }

    /// Answers a desync probe with our checksum for the requested frame, or
    /// 0 when none is stored. The asking side treats a zero answer like any
    /// other mismatch candidate.
    fn on_consistency_request(&mut self, body: ConsistencyCheckRequest, now: Instant) {
        let checksum = self.state_store.checksum(body.frame).unwrap_or(0);
        self.queue_message(
            MessageBody::ConsistencyCheckReply(ConsistencyCheckReply {
                frame: body.frame,
                checksum,
            }),
            now,
        );
    }

    fn on_consistency_reply(&mut self, body: ConsistencyCheckReply) {
        if !self.state.consistency.is_outstanding()
            || body.frame != self.state.consistency.asked_frame
        {
            trace!("ignoring stale consistency reply for frame {}", body.frame);
            return;
        }

        let local_checksum = self.state.consistency.asked_checksum;
        if body.checksum != local_checksum {
            self.event_queue.push_back(Event::DesyncDetected {
                frame: body.frame,
                local_checksum,
                remote_checksum: body.checksum,
            });
        }
        self.state.consistency.clear();
    }
}
