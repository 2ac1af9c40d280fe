//! Inbound fragment reassembly (spec.md §4.5, "Fragmentation"): "An
//! application message larger than the payload MTU is split into up to 3
//! numbered fragments with a common `frag_count`. Receiver reassembles in
//! order and delivers the whole message in one `recv_cb`."
//!
//! Only one message may be in flight for reassembly at a time per connection
//! (spec.md §3, "ARDP Connection": "reassembly state for a single in-flight
//! message"), mirroring the teacher's `Chunks` (`queue/reassembly_queue.rs`)
//! but narrowed to ARDP's fixed 1..=3 fragment budget instead of SCTP's
//! unbounded ordered streams.

use bytes::{Bytes, BytesMut};

use crate::config::MAX_FRAGMENTS;
use crate::error::{ArdpError, Result};

#[derive(Debug, Default)]
pub(crate) struct ReassemblyBuffer {
    frag_count: u16,
    fragments: [Option<Bytes>; MAX_FRAGMENTS],
    received: usize,
}

impl ReassemblyBuffer {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Insert one fragment. Returns the reassembled message once every
    /// fragment of the current `frag_count` has arrived.
    pub(crate) fn insert(
        &mut self,
        frag_index: u16,
        frag_count: u16,
        data: Bytes,
    ) -> Result<Option<Bytes>> {
        if frag_count == 0 || frag_count as usize > MAX_FRAGMENTS {
            return Err(ArdpError::InvalidFragmentCount(frag_count));
        }
        if frag_index >= frag_count {
            return Err(ArdpError::InvalidFragmentCount(frag_count));
        }

        if self.frag_count != 0 && self.frag_count != frag_count {
            // A fragment for a new message arrived before the previous one
            // finished reassembling; start over rather than mixing fragments
            // from two messages.
            self.reset();
        }
        self.frag_count = frag_count;

        let slot = &mut self.fragments[frag_index as usize];
        if slot.is_none() {
            self.received += 1;
        }
        *slot = Some(data);

        if self.received == frag_count as usize {
            let message = self.concat(frag_count);
            self.reset();
            Ok(Some(message))
        } else {
            Ok(None)
        }
    }

    fn concat(&mut self, frag_count: u16) -> Bytes {
        if frag_count == 1 {
            return self.fragments[0].take().unwrap_or_default();
        }
        let total: usize = self.fragments[..frag_count as usize]
            .iter()
            .map(|f| f.as_ref().map_or(0, |b| b.len()))
            .sum();
        let mut out = BytesMut::with_capacity(total);
        for frag in &mut self.fragments[..frag_count as usize] {
            if let Some(bytes) = frag.take() {
                out.extend_from_slice(&bytes);
            }
        }
        out.freeze()
    }

    fn reset(&mut self) {
        self.frag_count = 0;
        self.received = 0;
        for slot in &mut self.fragments {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_in_any_arrival_order() {
        let mut buf = ReassemblyBuffer::new();
        assert!(buf
            .insert(2, 3, Bytes::from_static(b"ghi"))
            .unwrap()
            .is_none());
        assert!(buf
            .insert(0, 3, Bytes::from_static(b"abc"))
            .unwrap()
            .is_none());
        let whole = buf.insert(1, 3, Bytes::from_static(b"def")).unwrap();
        assert_eq!(whole, Some(Bytes::from_static(b"abcdef")));
    }

    #[test]
    fn single_fragment_message_returns_immediately() {
        let mut buf = ReassemblyBuffer::new();
        let whole = buf.insert(0, 1, Bytes::from_static(b"hi")).unwrap();
        assert_eq!(whole, Some(Bytes::from_static(b"hi")));
    }

    #[test]
    fn rejects_out_of_range_fragment_count() {
        let mut buf = ReassemblyBuffer::new();
        assert!(matches!(
            buf.insert(0, 4, Bytes::from_static(b"x")),
            Err(ArdpError::InvalidFragmentCount(4))
        ));
    }

    #[test]
    fn a_new_message_does_not_mix_with_a_stale_partial_one() {
        let mut buf = ReassemblyBuffer::new();
        assert!(buf.insert(0, 2, Bytes::from_static(b"AA")).unwrap().is_none());
        // Second message begins before the first completed.
        let whole = buf.insert(0, 1, Bytes::from_static(b"B")).unwrap();
        assert_eq!(whole, Some(Bytes::from_static(b"B")));
    }
}
