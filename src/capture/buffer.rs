//! Shared output buffer
//!
//! Holds the bytes appended since the last drain plus a transcript of the
//! whole capture scope. Both live under one lock, so drain-and-clear is
//! atomic with respect to appends from any thread.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct State {
    /// Bytes not yet drained
    pending: Vec<u8>,
    /// Every byte appended since the last reset
    transcript: Vec<u8>,
}

/// Output accumulated while a capture is active
#[derive(Debug, Default)]
pub struct OutputBuffer {
    state: Mutex<State>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes written by the engine
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.pending.extend_from_slice(bytes);
        state.transcript.extend_from_slice(bytes);
    }

    /// Take everything appended since the last drain and clear it
    ///
    /// A UTF-8 sequence cut off at the end stays pending until the rest of
    /// it arrives, so a character is never split across two drains.
    pub fn drain(&self) -> String {
        let mut state = self.state.lock();
        let keep = incomplete_tail_len(&state.pending);
        let cut = state.pending.len() - keep;
        let tail = state.pending.split_off(cut);
        let head = std::mem::replace(&mut state.pending, tail);
        String::from_utf8_lossy(&head).into_owned()
    }

    /// Everything appended since the last reset, drained or not
    pub fn transcript(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().transcript).into_owned()
    }

    /// Number of bytes waiting for the next drain
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Forget all content, for a new capture scope
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.transcript.clear();
    }
}

/// Length of an unfinished UTF-8 sequence at the end of `bytes`
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    // A sequence is at most 4 bytes, so only the last 3 can be a partial one
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            // Continuation byte, keep looking for the lead
            continue;
        }
        let width = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_drain_clears_but_keeps_transcript() {
        let buf = OutputBuffer::new();
        buf.append(b"first ");
        assert_eq!(buf.drain(), "first ");
        assert_eq!(buf.drain(), "");
        buf.append(b"second");
        assert_eq!(buf.pending_len(), 6);
        assert_eq!(buf.transcript(), "first second");
        buf.reset();
        assert_eq!(buf.transcript(), "");
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_split_character_waits_for_completion() {
        let euro = "€".as_bytes(); // 3 bytes
        let buf = OutputBuffer::new();
        buf.append(b"a");
        buf.append(&euro[..2]);
        assert_eq!(buf.drain(), "a");
        assert_eq!(buf.pending_len(), 2);
        buf.append(&euro[2..]);
        assert_eq!(buf.drain(), "€");
    }

    #[test]
    fn test_incomplete_tail_len() {
        assert_eq!(incomplete_tail_len(b""), 0);
        assert_eq!(incomplete_tail_len(b"abc"), 0);
        assert_eq!(incomplete_tail_len("é".as_bytes()), 0);
        assert_eq!(incomplete_tail_len(&"é".as_bytes()[..1]), 1);
        assert_eq!(incomplete_tail_len(&"😀".as_bytes()[..3]), 3);
        assert_eq!(incomplete_tail_len("x😀".as_bytes()), 0);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let buf = std::sync::Arc::new(OutputBuffer::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let buf = buf.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        buf.append(b"ab");
                    }
                })
            })
            .collect();

        let mut drained = String::new();
        for _ in 0..200 {
            drained.push_str(&buf.drain());
        }
        for w in writers {
            w.join().unwrap();
        }
        drained.push_str(&buf.drain());
        assert_eq!(drained.len(), 4 * 500 * 2);
        assert_eq!(buf.transcript().len(), drained.len());
    }

    proptest! {
        /// Drained chunks, concatenated in order, equal the writes in order,
        /// even when writes split multi-byte characters.
        #[test]
        fn prop_no_loss_draining(
            text in "[a-zé€😀 \n]{0,64}",
            cuts in proptest::collection::vec((0usize..64, any::<bool>()), 0..16),
        ) {
            let bytes = text.as_bytes();
            let mut points: Vec<(usize, bool)> = cuts
                .into_iter()
                .map(|(c, d)| (c.min(bytes.len()), d))
                .collect();
            points.sort_by_key(|p| p.0);

            let buf = OutputBuffer::new();
            let mut drained = String::new();
            let mut start = 0;
            for (cut, drain) in points {
                buf.append(&bytes[start..cut]);
                start = cut;
                if drain {
                    drained.push_str(&buf.drain());
                }
            }
            buf.append(&bytes[start..]);
            drained.push_str(&buf.drain());

            prop_assert_eq!(&drained, &text);
            prop_assert_eq!(buf.transcript(), text);
        }
    }
}
