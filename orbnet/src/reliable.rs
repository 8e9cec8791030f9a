//! Reliable delivery on top of the best-effort transport.
//!
//! Each peer has at most one reliable message in flight, tracked by a
//! [`PendingTransmission`]. A new reliable send to a busy peer is refused
//! (the caller gets `false` and must queue or drop). The in-flight message
//! is retransmitted with the *same* sequence number on an exponential
//! backoff until either a matching ACK arrives or the retry budget runs
//! out, at which point it is silently abandoned.
//!
//! [`Link`] owns the transport and the sender's sequence counter and is
//! shared by both roles: the orb drives one `PendingTransmission` for its
//! hub, the hub drives one per registered orb.

use tracing::{debug, trace};

use crate::config::ProtocolConfig;
use crate::time::{Duration, Timestamp};
use crate::traits::{Datagram, Transport};
use crate::types::{NodeId, PeerAddr};
use crate::wire::{Encode, Message, MessageType, Packet};

/// Per-sender sequence number allocator.
///
/// Starts at 1, increments for every packet sent, never resets and wraps
/// silently.
#[derive(Clone, Debug)]
pub struct SeqCounter {
    next: u32,
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SeqCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose next allocation is `next`.
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    /// The value the next call to `allocate` returns.
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Allocate a sequence number.
    pub fn allocate(&mut self) -> u32 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }
}

/// Retry schedule of the reliable engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retransmission.
    pub base: Duration,
    /// Retransmissions before giving up.
    pub max_tries: u8,
    /// The delay stops doubling after this many retries.
    pub cap_shift: u32,
}

impl RetryPolicy {
    pub fn from_config<C: ProtocolConfig>() -> Self {
        Self {
            base: C::RETRY_BASE,
            max_tries: C::MAX_TRIES,
            cap_shift: C::BACKOFF_CAP_SHIFT,
        }
    }

    /// Delay scheduled after `tries` retransmissions:
    /// `base * 2^min(tries, cap_shift)`.
    pub fn delay(&self, tries: u8) -> Duration {
        let shift = (tries as u32).min(self.cap_shift).min(31);
        self.base.saturating_mul(1 << shift)
    }

    /// Upper bound of `delay`.
    pub fn max_delay(&self) -> Duration {
        self.base.saturating_mul(1 << self.cap_shift.min(31))
    }
}

/// Outcome of servicing a pending transmission on a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryAction {
    /// Nothing in flight.
    Idle,
    /// In flight, deadline not reached yet.
    Waiting,
    /// Deadline passed: resend this packet content.
    Retransmit { seq: u32, message: Message },
    /// Retry budget exhausted; the message was dropped.
    Abandoned { seq: u32, kind: MessageType },
}

/// The single reliable message in flight to one peer.
#[derive(Clone, Copy, Debug)]
pub struct PendingTransmission {
    active: bool,
    message: Message,
    seq: u32,
    tries: u8,
    next_attempt_at: Timestamp,
}

impl Default for PendingTransmission {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTransmission {
    pub const fn new() -> Self {
        Self {
            active: false,
            message: Message::Hello(0),
            seq: 0,
            tries: 0,
            next_attempt_at: Timestamp::ZERO,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Type of the last armed message.
    pub fn message_type(&self) -> MessageType {
        self.message.kind()
    }

    /// Value of the last armed message.
    pub fn value(&self) -> i32 {
        self.message.value()
    }

    /// Sequence number reused by every retransmission.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Retransmissions so far.
    pub fn tries(&self) -> u8 {
        self.tries
    }

    pub fn next_attempt_at(&self) -> Timestamp {
        self.next_attempt_at
    }

    /// Start tracking a freshly sent message.
    pub fn arm(&mut self, seq: u32, message: Message, now: Timestamp, policy: &RetryPolicy) {
        self.active = true;
        self.message = message;
        self.seq = seq;
        self.tries = 0;
        self.next_attempt_at = now + policy.delay(0);
    }

    /// Clear the pending state if `(ack_type, ack_seq)` matches it.
    pub fn acknowledge(&mut self, ack_type: MessageType, ack_seq: u32) -> bool {
        if self.active && self.message.kind() == ack_type && self.seq == ack_seq {
            self.active = false;
            true
        } else {
            false
        }
    }

    /// Drop the in-flight message without waiting for an ACK.
    pub fn cancel(&mut self) {
        self.active = false;
    }

    /// Advance the retry schedule.
    pub fn poll(&mut self, now: Timestamp, policy: &RetryPolicy) -> RetryAction {
        if !self.active {
            return RetryAction::Idle;
        }
        if !self.next_attempt_at.reached(now) {
            return RetryAction::Waiting;
        }
        if self.tries >= policy.max_tries {
            self.active = false;
            return RetryAction::Abandoned {
                seq: self.seq,
                kind: self.message.kind(),
            };
        }
        self.tries += 1;
        self.next_attempt_at = now + policy.delay(self.tries);
        RetryAction::Retransmit {
            seq: self.seq,
            message: self.message,
        }
    }
}

/// Datagram counters of one link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkMetrics {
    /// Datagrams queued on the transport.
    pub sent: u32,
    /// Datagrams the transport refused (queue full).
    pub dropped: u32,
    /// Retransmissions of reliable messages.
    pub retransmitted: u32,
    /// Reliable messages abandoned after the retry budget.
    pub abandoned: u32,
}

/// Sending half of a device: transport, identity and sequence numbers.
pub struct Link<T> {
    transport: T,
    local_id: NodeId,
    seq: SeqCounter,
    policy: RetryPolicy,
    metrics: LinkMetrics,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T, local_id: NodeId, policy: RetryPolicy) -> Self {
        Self {
            transport,
            local_id,
            seq: SeqCounter::new(),
            policy,
            metrics: LinkMetrics::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &LinkMetrics {
        &self.metrics
    }

    /// Sequence number the next packet will carry.
    pub fn next_seq(&self) -> u32 {
        self.seq.peek()
    }

    /// Send a single unacknowledged copy with a fresh sequence number.
    pub fn send(&mut self, to: PeerAddr, message: Message) -> u32 {
        let seq = self.seq.allocate();
        self.transmit(to, Packet::new(self.local_id, seq, message));
        seq
    }

    /// Acknowledge a received packet.
    pub fn send_ack(&mut self, to: PeerAddr, received: &Packet) {
        let seq = self.seq.allocate();
        self.transmit(to, received.ack(self.local_id, seq));
    }

    /// Send `message` reliably to `to`, tracked by `pending`.
    ///
    /// Returns false without side effects if a message is already in flight.
    pub fn send_reliable(
        &mut self,
        pending: &mut PendingTransmission,
        to: PeerAddr,
        message: Message,
        now: Timestamp,
    ) -> bool {
        if pending.is_active() {
            debug!(kind = ?message.kind(), busy = ?pending.message_type(), "reliable send refused");
            return false;
        }
        let seq = self.send(to, message);
        pending.arm(seq, message, now, &self.policy);
        debug!(seq, kind = ?message.kind(), "reliable send");
        true
    }

    /// Run the retry schedule of `pending`, resending to `to` when due.
    pub fn service(&mut self, pending: &mut PendingTransmission, to: PeerAddr, now: Timestamp) {
        let policy = self.policy;
        match pending.poll(now, &policy) {
            RetryAction::Idle | RetryAction::Waiting => {}
            RetryAction::Retransmit { seq, message } => {
                trace!(seq, tries = pending.tries(), kind = ?message.kind(), "retransmit");
                self.metrics.retransmitted += 1;
                self.transmit(to, Packet::new(self.local_id, seq, message));
            }
            RetryAction::Abandoned { seq, kind } => {
                debug!(seq, ?kind, "retry budget exhausted");
                self.metrics.abandoned += 1;
            }
        }
    }

    fn transmit(&mut self, to: PeerAddr, packet: Packet) {
        let datagram = Datagram::new(to, packet.encode_to_vec());
        if self.transport.outgoing().try_send(datagram).is_ok() {
            self.metrics.sent += 1;
        } else {
            trace!(seq = packet.seq, "transport queue full, datagram dropped");
            self.metrics.dropped += 1;
        }
    }
}
