//! Outstanding, unacknowledged segments awaiting retransmission or ack
//! (spec.md §4.5, "Window", "Retransmission", "Duplicate-ack fast
//! retransmit"). Modeled after the teacher's `PendingQueue`
//! (`queue/pending_queue.rs`), narrowed from SCTP's byte-stream queue to
//! ARDP's fixed per-message fragment set.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;

/// One outstanding data segment: a single fragment of a user message.
#[derive(Debug, Clone)]
pub(crate) struct PendingSegment {
    pub(crate) seq: u32,
    pub(crate) payload: Bytes,
    pub(crate) frag_index: u16,
    pub(crate) frag_count: u16,
    /// Groups the fragments of one `send()` call so the caller is notified
    /// exactly once when the whole message is acked (spec.md §4.3,
    /// `send_cb`).
    pub(crate) message_id: u64,
    pub(crate) sent_at: Instant,
    pub(crate) dup_acks: u32,
}

/// FIFO of unacked segments for one connection, in send order. Cumulative
/// acks drain from the front; selective (duplicate) acks mark entries without
/// removing them so fast retransmit can find the earliest unacked segment.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    segments: VecDeque<PendingSegment>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub(crate) fn push(&mut self, segment: PendingSegment) {
        self.segments.push_back(segment);
    }

    pub(crate) fn front(&self) -> Option<&PendingSegment> {
        self.segments.front()
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut PendingSegment> {
        self.segments.front_mut()
    }

    /// Cumulative ack: `ack` is the next sequence number the peer expects
    /// (exclusive), not the highest one it received, so drop every segment
    /// with `seq < ack` and no further. Returns the set of distinct
    /// `message_id`s that became fully acked as a result, so the connection
    /// can fire one `send_cb` per completed message.
    pub(crate) fn ack_through(&mut self, ack: u32) -> Vec<u64> {
        let mut completed = Vec::new();
        while let Some(front) = self.segments.front() {
            if !seq_lt(front.seq, ack) {
                break;
            }
            let removed = self.segments.pop_front().unwrap();
            if !self.message_has_outstanding_fragment(removed.message_id) {
                completed.push(removed.message_id);
            }
        }
        completed
    }

    fn message_has_outstanding_fragment(&self, message_id: u64) -> bool {
        self.segments.iter().any(|s| s.message_id == message_id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &PendingSegment> {
        self.segments.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PendingSegment> {
        self.segments.iter_mut()
    }
}

/// Sequence-number comparison with wraparound, as used throughout ARDP/SCTP
/// style protocols for 32-bit sequence spaces.
fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(seq: u32, message_id: u64) -> PendingSegment {
        PendingSegment {
            seq,
            payload: Bytes::new(),
            frag_index: 0,
            frag_count: 1,
            message_id,
            sent_at: Instant::now(),
            dup_acks: 0,
        }
    }

    #[test]
    fn ack_through_reports_only_fully_completed_messages() {
        let mut q = PendingQueue::new();
        q.push(segment(1, 100)); // message 100, frag 0
        q.push(segment(2, 100)); // message 100, frag 1
        q.push(segment(3, 200)); // message 200, single frag

        // ack=2 means "next expected is 2", i.e. only seq 1 has actually
        // been received. Seq 2 is still outstanding and must not be purged.
        let completed = q.ack_through(2);
        assert!(completed.is_empty());
        assert_eq!(q.len(), 2);

        // ack=3: seq 1 and seq 2 received, message 100 now complete.
        let completed = q.ack_through(3);
        assert_eq!(completed, vec![100]);
        assert_eq!(q.len(), 1);

        // ack=4: seq 3 received, message 200 now complete.
        let completed = q.ack_through(4);
        assert_eq!(completed, vec![200]);
        assert!(q.is_empty());
    }
}
