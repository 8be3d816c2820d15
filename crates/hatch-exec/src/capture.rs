//! Bounded capture of a child's stdout and stderr into one buffer.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

const READ_CHUNK: usize = 8 * 1024;

pub fn truncation_marker(limit: usize) -> String {
    format!("\n... [output truncated at {limit} bytes]\n")
}

#[derive(Debug, Default)]
struct CaptureState {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Shared sink for both output streams. Bytes past `limit` are dropped and
/// flagged; writers are never blocked by the cap.
#[derive(Debug, Clone)]
pub struct CappedBuffer {
    limit: usize,
    state: Arc<Mutex<CaptureState>>,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            state: Arc::new(Mutex::new(CaptureState::default())),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn push(&self, chunk: &[u8]) {
        let mut state = self.lock();
        let room = self.limit.saturating_sub(state.bytes.len());
        if chunk.len() > room {
            state.truncated = true;
        }
        let take = chunk.len().min(room);
        state.bytes.extend_from_slice(&chunk[..take]);
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn truncated(&self) -> bool {
        self.lock().truncated
    }

    /// Captured text so far, with the truncation marker appended once when
    /// the cap was hit. Invalid UTF-8 is replaced.
    pub fn snapshot(&self) -> String {
        let state = self.lock();
        let mut text = String::from_utf8_lossy(&state.bytes).into_owned();
        if text.len() > self.limit {
            // Replacement characters can grow a cut multi-byte sequence.
            let mut end = self.limit;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        if state.truncated {
            text.push_str(&truncation_marker(self.limit));
        }
        text
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reads `source` to EOF on a new thread, feeding `buffer`. Keeps reading
/// after the cap so the child never stalls on a full pipe.
pub fn spawn_reader<R>(
    source: R,
    buffer: CappedBuffer,
    stream: &'static str,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("hatch-log-{stream}"))
        .spawn(move || drain(source, &buffer))
}

fn drain<R: Read>(mut source: R, buffer: &CappedBuffer) {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buffer.push(&chunk[..n]),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{drain, spawn_reader, truncation_marker, CappedBuffer};
    use std::io::Cursor;

    #[test]
    fn under_limit_is_captured_verbatim() {
        let buffer = CappedBuffer::new(64);
        buffer.push(b"hello ");
        buffer.push(b"world\n");
        assert_eq!(buffer.snapshot(), "hello world\n");
        assert!(!buffer.truncated());
    }

    #[test]
    fn overflow_is_cut_at_limit_and_marked_once() {
        let buffer = CappedBuffer::new(10);
        buffer.push(b"0123456789abc");
        buffer.push(b"more");

        let snapshot = buffer.snapshot();
        assert!(buffer.truncated());
        assert_eq!(buffer.len(), 10);
        assert_eq!(snapshot, format!("0123456789{}", truncation_marker(10)));
        assert_eq!(snapshot.matches("[output truncated").count(), 1);
    }

    #[test]
    fn exact_fill_is_not_truncated() {
        let buffer = CappedBuffer::new(4);
        buffer.push(b"abcd");
        assert!(!buffer.truncated());
        buffer.push(b"");
        assert!(!buffer.truncated());
    }

    #[test]
    fn cut_multibyte_sequence_stays_within_limit() {
        let buffer = CappedBuffer::new(5);
        buffer.push("abcdé".as_bytes());
        let snapshot = buffer.snapshot();
        let marker = truncation_marker(5);
        assert!(snapshot.ends_with(&marker));
        assert!(snapshot.len() <= 5 + marker.len());
    }

    #[test]
    fn drain_consumes_entire_source_past_the_cap() {
        let buffer = CappedBuffer::new(16);
        let mut source = Cursor::new(vec![b'x'; 100_000]);
        drain(&mut source, &buffer);
        assert_eq!(source.position(), 100_000);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.truncated());
    }

    #[test]
    fn two_readers_share_one_buffer() {
        let buffer = CappedBuffer::new(1024);
        let out = spawn_reader(Cursor::new(b"out\n".to_vec()), buffer.clone(), "stdout")
            .expect("spawn stdout reader");
        let err = spawn_reader(Cursor::new(b"err\n".to_vec()), buffer.clone(), "stderr")
            .expect("spawn stderr reader");
        out.join().expect("stdout reader");
        err.join().expect("stderr reader");

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 8);
        assert!(snapshot.contains("out\n"));
        assert!(snapshot.contains("err\n"));
    }
}
