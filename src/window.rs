//! Send/receive sequence-number windows shared by the client connection
//! state machine and server sessions. IEC 104 sequence numbers are 15-bit
//! (0..32768) and wrap; this module centralizes the wrapping arithmetic and
//! the k/w bookkeeping that used to live inline in the old single-connection
//! client.

use crate::error::{ProtocolError, Result};

/// Sequence numbers wrap modulo 2^15.
const SEQ_MODULUS: u16 = 32768;
const SEQ_MASK: u16 = 0x7FFF;

/// Steps forward from `from` to `to`, modulo 32768.
const fn seq_diff(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from) & SEQ_MASK
}

/// Outbound I-frame sequence tracking: V(S) plus the unacknowledged count
/// enforced against `k`.
#[derive(Debug, Clone, Copy)]
pub struct SendWindow {
    k: u16,
    next_send_seq: u16,
    unacked: u16,
}

impl SendWindow {
    /// Create a send window enforcing at most `k` unacknowledged frames.
    pub const fn new(k: u16) -> Self {
        Self {
            k,
            next_send_seq: 0,
            unacked: 0,
        }
    }

    /// Reset sequence state (on a fresh STARTDT_CON).
    pub fn reset(&mut self) {
        self.next_send_seq = 0;
        self.unacked = 0;
    }

    /// Whether another I-frame may be sent without exceeding `k`.
    pub const fn can_send(&self) -> bool {
        self.unacked < self.k
    }

    /// Record that an I-frame was sent with the next V(S); returns the
    /// sequence number used. Caller must check [`Self::can_send`] first.
    pub fn record_sent(&mut self) -> u16 {
        let seq = self.next_send_seq;
        self.next_send_seq = (self.next_send_seq + 1) % SEQ_MODULUS;
        self.unacked += 1;
        seq
    }

    /// V(S): the sequence number the next I-frame will use.
    pub const fn next_send_seq(&self) -> u16 {
        self.next_send_seq
    }

    /// Number of I-frames sent but not yet acknowledged.
    pub const fn unacked(&self) -> u16 {
        self.unacked
    }

    /// Apply a piggybacked or standalone acknowledgment up to `recv_seq`.
    /// Returns the number of frames newly acknowledged. Fails with
    /// `SequenceMismatch` if `recv_seq` does not fall within the
    /// outstanding window.
    pub fn acknowledge(&mut self, recv_seq: u16) -> Result<u16> {
        let oldest_unacked = (self.next_send_seq + SEQ_MODULUS - self.unacked) % SEQ_MODULUS;
        let acked = seq_diff(oldest_unacked, recv_seq);
        if acked > self.unacked {
            return Err(ProtocolError::SequenceMismatch {
                expected: self.next_send_seq,
                actual: recv_seq,
            }
            .into());
        }
        self.unacked -= acked;
        Ok(acked)
    }
}

/// Inbound I-frame sequence tracking: V(R) plus the unacknowledged count
/// enforced against `w`.
#[derive(Debug, Clone, Copy)]
pub struct RecvWindow {
    w: u16,
    next_recv_seq: u16,
    unacked: u16,
}

impl RecvWindow {
    /// Create a receive window that acknowledges after `w` unconfirmed
    /// I-frames.
    pub const fn new(w: u16) -> Self {
        Self {
            w,
            next_recv_seq: 0,
            unacked: 0,
        }
    }

    /// Reset sequence state (on a fresh STARTDT_CON).
    pub fn reset(&mut self) {
        self.next_recv_seq = 0;
        self.unacked = 0;
    }

    /// V(R): the sequence number the next inbound I-frame must carry.
    pub const fn next_recv_seq(&self) -> u16 {
        self.next_recv_seq
    }

    /// Accept an inbound I-frame carrying `send_seq`, advancing V(R). Fails
    /// with `SequenceMismatch` if out of order.
    pub fn accept(&mut self, send_seq: u16) -> Result<()> {
        if send_seq != self.next_recv_seq {
            return Err(ProtocolError::SequenceMismatch {
                expected: self.next_recv_seq,
                actual: send_seq,
            }
            .into());
        }
        self.next_recv_seq = (self.next_recv_seq + 1) % SEQ_MODULUS;
        self.unacked += 1;
        Ok(())
    }

    /// Whether an S-frame (or piggybacked ack) is now due per `w`.
    pub const fn should_acknowledge(&self) -> bool {
        self.unacked >= self.w
    }

    /// Whether any inbound I-frame remains unacknowledged (used by the t2
    /// timer, which fires even below the `w` threshold).
    pub const fn has_unacknowledged(&self) -> bool {
        self.unacked > 0
    }

    /// Mark all inbound frames acknowledged, returning V(R) to report.
    pub fn acknowledge(&mut self) -> u16 {
        self.unacked = 0;
        self.next_recv_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_window_enforces_k() {
        let mut window = SendWindow::new(2);
        assert!(window.can_send());
        window.record_sent();
        assert!(window.can_send());
        window.record_sent();
        assert!(!window.can_send());
    }

    #[test]
    fn send_window_acknowledge_clears_unacked() {
        let mut window = SendWindow::new(12);
        window.record_sent();
        window.record_sent();
        window.record_sent();
        let acked = window.acknowledge(2).unwrap();
        assert_eq!(acked, 2);
        assert_eq!(window.unacked(), 1);
    }

    #[test]
    fn send_window_rejects_ack_beyond_outstanding() {
        let mut window = SendWindow::new(12);
        window.record_sent();
        assert!(window.acknowledge(5).is_err());
    }

    #[test]
    fn send_window_sequence_wraps_at_32768() {
        let mut window = SendWindow::new(12);
        window.next_send_seq = 32767;
        let seq = window.record_sent();
        assert_eq!(seq, 32767);
        assert_eq!(window.next_send_seq(), 0);
    }

    #[test]
    fn recv_window_rejects_out_of_order() {
        let mut window = RecvWindow::new(8);
        assert!(window.accept(0).is_ok());
        assert!(window.accept(2).is_err());
    }

    #[test]
    fn recv_window_triggers_ack_at_w() {
        let mut window = RecvWindow::new(2);
        window.accept(0).unwrap();
        assert!(!window.should_acknowledge());
        window.accept(1).unwrap();
        assert!(window.should_acknowledge());
        let vr = window.acknowledge();
        assert_eq!(vr, 2);
        assert!(!window.has_unacknowledged());
    }
}
