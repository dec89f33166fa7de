//! Chunked streaming log uploader.
//!
//! Publishes an open-ended UTF-8 log as a growing family of immutable
//! artifacts so that a dumb client can tail it while it is still being
//! produced:
//!
//! - `<name>.<start>-<end>` — one frozen chunk, covering those byte
//!   offsets of the log;
//! - `<name>.chunks` — JSON array of chunk byte lengths, in order;
//! - `<name>` — the complete log, written exactly once at finalization,
//!   after which every `<name>.*` artifact is deleted. A client that
//!   sees 404 on the manifest knows the streaming is over.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::error;

use crate::destination::{Destination, DestinationError};
use crate::index::Index;

/// Flush as soon as this many bytes are pending.
pub const SIZE_LIMIT: usize = 1_000_000;
/// Flush pending bytes at the latest this long after they arrive.
pub const TIME_LIMIT: Duration = Duration::from_secs(30);

/// Styling and viewer published next to every streamed log.
const STATIC_ASSETS: &[(&str, &[u8])] = &[
    ("log.html", include_bytes!("../static/log.html")),
    ("log.css", include_bytes!("../static/log.css")),
];

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("the log was already finalized")]
    Finished,
}

/// Streams one log file into an [`Index`].
///
/// Range and manifest artifacts are written directly to the wrapped
/// destination; only the finalized log goes through the index, so the
/// listing never mentions transient artifacts.
pub struct ChunkedUploader {
    shared: Arc<Shared>,
}

struct Shared {
    index: Arc<Index>,
    destination: Arc<dyn Destination>,
    filename: String,
    state: Mutex<StreamState>,
}

struct StreamState {
    /// Frozen chunks; each is a list of byte blocks. Only the last entry
    /// may ever gain blocks.
    chunks: Vec<Vec<Bytes>>,
    /// Complete characters accepted but not yet assigned to a chunk.
    pending: Vec<u8>,
    /// Range suffixes written so far, for cleanup at finalization.
    suffixes: BTreeSet<String>,
    decoder: Utf8Decoder,
    timer: Option<JoinHandle<()>>,
    timer_epoch: u64,
    finished: bool,
}

impl ChunkedUploader {
    pub fn new(index: Arc<Index>, filename: impl Into<String>) -> Self {
        let destination = Arc::clone(index.destination());
        let mut suffixes = BTreeSet::new();
        suffixes.insert("chunks".to_string());

        ChunkedUploader {
            shared: Arc::new(Shared {
                index,
                destination,
                filename: filename.into(),
                state: Mutex::new(StreamState {
                    chunks: Vec::new(),
                    pending: Vec::new(),
                    suffixes,
                    decoder: Utf8Decoder::default(),
                    timer: None,
                    timer_epoch: 0,
                    finished: false,
                }),
            }),
        }
    }

    /// Accept the initial text and flush immediately, so the manifest
    /// exists before any subscriber polls for it, then publish the
    /// bundled viewer assets.
    pub fn start(&self, data: &str) -> Result<(), StreamError> {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.pending = data.as_bytes().to_vec();
            self.shared.send_pending(&mut state)?;
        }

        for (name, data) in STATIC_ASSETS {
            if !self.shared.index.has(name)? {
                self.shared.index.write(name, data)?;
            }
        }
        Ok(())
    }

    /// Feed log bytes. With `last` set, publish the complete log and
    /// delete every auxiliary artifact; the uploader then rejects
    /// further writes.
    pub fn write(&self, data: &[u8], last: bool) -> Result<(), StreamError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.finished {
            return Err(StreamError::Finished);
        }

        // Transcode so that artifact boundaries never split a code point.
        let text = state.decoder.decode(data, last);
        state.pending.extend_from_slice(text.as_bytes());

        if last {
            // Everything is about to be deleted, so nothing pending needs
            // a separate flush.
            self.shared.clear_timer(&mut state);

            let total: usize = state
                .chunks
                .iter()
                .flatten()
                .map(Bytes::len)
                .sum::<usize>()
                + state.pending.len();
            let mut everything = Vec::with_capacity(total);
            for block in state.chunks.iter().flatten() {
                everything.extend_from_slice(block);
            }
            everything.extend_from_slice(&state.pending);
            state.pending.clear();

            self.shared.index.write(&self.shared.filename, &everything)?;

            let stale: Vec<String> = state
                .suffixes
                .iter()
                .map(|suffix| format!("{}.{}", self.shared.filename, suffix))
                .collect();
            self.shared.destination.delete(&stale)?;
            state.finished = true;
        } else if !state.pending.is_empty() {
            if state.pending.len() > SIZE_LIMIT {
                self.shared.send_pending(&mut state)?;
            } else if state.timer.is_none() {
                self.shared.arm_timer(&mut state);
            }
        }
        Ok(())
    }

    /// Flush the pending buffer right away.
    pub fn flush(&self) -> Result<(), StreamError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.finished {
            return Err(StreamError::Finished);
        }
        self.shared.send_pending(&mut state)
    }
}

impl Shared {
    fn clear_timer(&self, state: &mut StreamState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        // A timer that already fired and is waiting on the lock sees the
        // epoch change and backs off.
        state.timer_epoch += 1;
    }

    fn arm_timer(self: &Arc<Self>, state: &mut StreamState) {
        let shared = Arc::clone(self);
        let epoch = state.timer_epoch;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(TIME_LIMIT).await;
            let mut state = shared.state.lock().unwrap();
            if state.timer_epoch != epoch {
                return;
            }
            state.timer = None;
            if let Err(err) = shared.send_pending(&mut state) {
                error!(%err, "timed flush failed");
            }
        }));
    }

    fn send_pending(&self, state: &mut StreamState) -> Result<(), StreamError> {
        // Consume the pending buffer into the chunks list.
        let block = Bytes::from(std::mem::take(&mut state.pending));
        state.chunks.push(vec![block]);
        self.clear_timer(state);

        // 2048 rule: collapse the last two chunks while they hold the
        // same number of blocks. Over equal-sized flushes this keeps the
        // artifact count logarithmic. Only the last chunk is ever
        // touched; earlier chunks stay frozen.
        while state.chunks.len() > 1
            && state.chunks[state.chunks.len() - 1].len()
                == state.chunks[state.chunks.len() - 2].len()
        {
            let last = state.chunks.pop().expect("chunk list has two entries");
            state
                .chunks
                .last_mut()
                .expect("chunk list has one entry")
                .extend(last);
        }

        // The client stays dumb: it sees bytes, never blocks.
        let chunk_sizes: Vec<usize> = state
            .chunks
            .iter()
            .map(|chunk| chunk.iter().map(Bytes::len).sum())
            .collect();

        let start: usize = chunk_sizes[..chunk_sizes.len() - 1].iter().sum();
        let end = start + chunk_sizes[chunk_sizes.len() - 1];
        let suffix = format!("{start}-{end}");

        let last_chunk = state.chunks.last().expect("a chunk was just pushed");
        let mut data = Vec::with_capacity(end - start);
        for block in last_chunk {
            data.extend_from_slice(block);
        }
        self.destination
            .write(&format!("{}.{}", self.filename, suffix), &data)?;
        state.suffixes.insert(suffix);

        let manifest = serde_json::to_vec(&chunk_sizes).expect("a list of integers always serializes");
        self.destination
            .write(&format!("{}.chunks", self.filename), &manifest)?;
        Ok(())
    }
}

/// Incremental UTF-8 decoder: holds back an incomplete trailing sequence
/// between calls and substitutes U+FFFD for invalid input.
#[derive(Default)]
struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, data: &[u8], last: bool) -> String {
        let mut buffer = std::mem::take(&mut self.partial);
        buffer.extend_from_slice(data);

        if last {
            return String::from_utf8_lossy(&buffer).into_owned();
        }

        let keep = complete_prefix_len(&buffer);
        self.partial = buffer.split_off(keep);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Length of the longest prefix that does not end in the middle of a
/// multi-byte sequence.
fn complete_prefix_len(buffer: &[u8]) -> usize {
    let len = buffer.len();
    // A sequence is at most 4 bytes, so its lead is among the last 3.
    for index in (len.saturating_sub(3)..len).rev() {
        let byte = buffer[index];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue; // continuation byte, keep looking for the lead
        }
        let needed = match byte {
            0x00..=0x7f => 1,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            // Invalid lead; pass it through for lossy replacement.
            _ => 1,
        };
        return if index + needed > len { index } else { len };
    }
    len
}
