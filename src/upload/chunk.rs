//! Chunk production for multipart uploads.
//!
//! Decouples chunk production (the recorder's periodic flush, or a file on
//! disk) from chunk consumption (the upload loop). The recording buffer
//! accumulates raw fragments until enough bytes exist for a valid part;
//! S3 rejects parts below its minimum size except for the last one, so a
//! stricter 6 MiB threshold is enforced for every non-final chunk.

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Minimum size of every part except the last. S3 requires >= 5 MiB;
/// 6 MiB keeps a safety margin above the provider floor.
pub const MIN_PART_BYTES: usize = 6 * 1024 * 1024;

/// Part size used when slicing a pre-recorded file.
pub const FILE_PART_BYTES: usize = 10 * 1024 * 1024;

/// One upload-ready chunk. Consumed exactly once by the upload loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub bytes: Vec<u8>,
    pub is_last: bool,
}

/// Produces upload-ready chunks for the orchestrator.
///
/// `next_chunk` returning `Ok(None)` means "not ready yet" and the caller
/// must back off and poll again; it is never an error.
pub trait ChunkSource: Send {
    fn next_chunk(&mut self) -> Result<Option<AudioChunk>>;
}

/// Accumulates raw audio fragments into size-valid chunks.
///
/// Mutated by exactly one producer (the recorder flush) and drained by
/// exactly one consumer (the upload loop). Callers must stop pushing
/// fragments after `mark_done`.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    fragments: Vec<Vec<u8>>,
    buffered: usize,
    done: bool,
    final_emitted: bool,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw fragment. Empty input is a no-op.
    pub fn push_fragment(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buffered += bytes.len();
        self.fragments.push(bytes.to_vec());
    }

    /// Signals that no more fragments will arrive. Idempotent.
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered
    }

    /// Returns the next chunk, if one is ready.
    ///
    /// - Buffered bytes >= the minimum part size: the whole buffer becomes
    ///   one non-final chunk and the buffer resets.
    /// - Done with a remainder: the remainder becomes the final chunk.
    /// - Done and empty: one empty final chunk, exactly once, so the
    ///   consumer can finalize.
    /// - Otherwise `None`: more data may still arrive.
    pub fn next_chunk(&mut self) -> Option<AudioChunk> {
        if self.buffered >= MIN_PART_BYTES {
            return Some(AudioChunk {
                bytes: self.take_buffered(),
                is_last: false,
            });
        }

        if self.done && self.buffered > 0 {
            self.final_emitted = true;
            return Some(AudioChunk {
                bytes: self.take_buffered(),
                is_last: true,
            });
        }

        if self.done && !self.final_emitted {
            self.final_emitted = true;
            return Some(AudioChunk {
                bytes: Vec::new(),
                is_last: true,
            });
        }

        None
    }

    fn take_buffered(&mut self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.buffered);
        for fragment in self.fragments.drain(..) {
            bytes.extend_from_slice(&fragment);
        }
        self.buffered = 0;
        bytes
    }
}

/// Chunk source backed by the live recording buffer.
///
/// The recorder's flush task pushes fragments into the shared buffer while
/// the upload loop drains chunks out of it through this handle.
pub struct RecordingChunkSource {
    buffer: Arc<Mutex<ChunkBuffer>>,
}

impl RecordingChunkSource {
    pub fn new(buffer: Arc<Mutex<ChunkBuffer>>) -> Self {
        Self { buffer }
    }
}

impl ChunkSource for RecordingChunkSource {
    fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| anyhow!("recording chunk buffer poisoned"))?;
        Ok(buffer.next_chunk())
    }
}

/// Chunk source that slices a file into fixed-size contiguous ranges.
///
/// Always ready: every call yields the next slice immediately, with the
/// last slice flagged as final.
pub struct FileChunkSource {
    file: File,
    len: u64,
    offset: u64,
    part_size: usize,
}

impl FileChunkSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| anyhow!("failed to open {}: {e}", path.display()))?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            offset: 0,
            part_size: FILE_PART_BYTES,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl ChunkSource for FileChunkSource {
    fn next_chunk(&mut self) -> Result<Option<AudioChunk>> {
        if self.offset >= self.len {
            // Exhausted (or empty file): emit an empty final chunk.
            return Ok(Some(AudioChunk {
                bytes: Vec::new(),
                is_last: true,
            }));
        }

        let end = (self.offset + self.part_size as u64).min(self.len);
        let mut bytes = vec![0u8; (end - self.offset) as usize];
        self.file.read_exact(&mut bytes)?;
        self.offset = end;

        Ok(Some(AudioChunk {
            bytes,
            is_last: self.offset >= self.len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fragments_below_threshold_are_not_ready() {
        let mut buffer = ChunkBuffer::new();
        buffer.push_fragment(&vec![0u8; 1024 * 1024]);
        buffer.push_fragment(&vec![1u8; 1024 * 1024]);
        assert_eq!(buffer.next_chunk(), None);
        assert_eq!(buffer.buffered_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn aggregate_size_decides_readiness() {
        // Three 2 MiB fragments cross the 6 MiB threshold together even
        // though each one is far below it on its own.
        let mut buffer = ChunkBuffer::new();
        for fill in 0..3u8 {
            buffer.push_fragment(&vec![fill; 2 * 1024 * 1024]);
            if fill < 2 {
                assert_eq!(buffer.next_chunk(), None);
            }
        }

        let chunk = buffer.next_chunk().expect("chunk should be ready");
        assert!(!chunk.is_last);
        assert_eq!(chunk.bytes.len(), 6 * 1024 * 1024);
        assert_eq!(chunk.bytes[0], 0);
        assert_eq!(chunk.bytes[2 * 1024 * 1024], 1);
        assert_eq!(chunk.bytes[4 * 1024 * 1024], 2);
        assert_eq!(buffer.buffered_bytes(), 0);
    }

    #[test]
    fn done_after_exact_threshold_yields_empty_final_exactly_once() {
        // 3 x 2 MiB pushed, then done with nothing left buffered.
        let mut buffer = ChunkBuffer::new();
        for _ in 0..3 {
            buffer.push_fragment(&vec![0u8; 2 * 1024 * 1024]);
        }
        buffer.mark_done();

        let first = buffer.next_chunk().expect("threshold chunk");
        assert!(!first.is_last);
        assert_eq!(first.bytes.len(), 6 * 1024 * 1024);

        let second = buffer.next_chunk().expect("empty final chunk");
        assert!(second.is_last);
        assert!(second.bytes.is_empty());

        assert_eq!(buffer.next_chunk(), None);
    }

    #[test]
    fn done_with_remainder_flushes_it_as_final() {
        let mut buffer = ChunkBuffer::new();
        buffer.push_fragment(&[7u8; 1000]);
        buffer.mark_done();

        let chunk = buffer.next_chunk().expect("remainder chunk");
        assert!(chunk.is_last);
        assert_eq!(chunk.bytes, vec![7u8; 1000]);

        // The remainder was the final chunk; no extra empty final follows.
        assert_eq!(buffer.next_chunk(), None);
    }

    #[test]
    fn non_final_chunks_always_meet_minimum_size() {
        // Property check across an uneven fragment sequence: every chunk
        // with is_last == false is at least MIN_PART_BYTES.
        let mut buffer = ChunkBuffer::new();
        let sizes = [512 * 1024, 3 * 1024 * 1024, 4 * 1024 * 1024, 100, 7 * 1024 * 1024];
        let mut chunks = Vec::new();

        for size in sizes {
            buffer.push_fragment(&vec![0u8; size]);
            while let Some(chunk) = buffer.next_chunk() {
                chunks.push(chunk);
            }
        }
        buffer.mark_done();
        while let Some(chunk) = buffer.next_chunk() {
            chunks.push(chunk);
        }

        let (finals, non_finals): (Vec<_>, Vec<_>) =
            chunks.into_iter().partition(|c| c.is_last);
        assert_eq!(finals.len(), 1);
        for chunk in &non_finals {
            assert!(chunk.bytes.len() >= MIN_PART_BYTES);
        }
    }

    #[test]
    fn empty_push_is_a_no_op() {
        let mut buffer = ChunkBuffer::new();
        buffer.push_fragment(&[]);
        assert_eq!(buffer.buffered_bytes(), 0);
    }

    #[test]
    fn mark_done_is_idempotent() {
        let mut buffer = ChunkBuffer::new();
        buffer.mark_done();
        buffer.mark_done();
        let chunk = buffer.next_chunk().expect("empty final");
        assert!(chunk.is_last && chunk.bytes.is_empty());
        assert_eq!(buffer.next_chunk(), None);
    }

    #[test]
    fn recording_source_drains_shared_buffer() {
        let shared = Arc::new(Mutex::new(ChunkBuffer::new()));
        let mut source = RecordingChunkSource::new(Arc::clone(&shared));

        assert_eq!(source.next_chunk().unwrap(), None);

        shared.lock().unwrap().push_fragment(&vec![0u8; MIN_PART_BYTES]);
        let chunk = source.next_chunk().unwrap().expect("ready chunk");
        assert!(!chunk.is_last);
        assert_eq!(chunk.bytes.len(), MIN_PART_BYTES);
    }

    #[test]
    fn file_source_slices_fixed_ranges() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        // 10 MiB part size -> 25 MiB file yields 10 + 10 + 5.
        let data: Vec<u8> = (0..25 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        tmp.write_all(&data).unwrap();

        let mut source = FileChunkSource::open(tmp.path()).unwrap();
        assert_eq!(source.len(), data.len() as u64);

        let first = source.next_chunk().unwrap().unwrap();
        assert_eq!(first.bytes.len(), FILE_PART_BYTES);
        assert!(!first.is_last);
        assert_eq!(first.bytes[..16], data[..16]);

        let second = source.next_chunk().unwrap().unwrap();
        assert_eq!(second.bytes.len(), FILE_PART_BYTES);
        assert!(!second.is_last);

        let third = source.next_chunk().unwrap().unwrap();
        assert_eq!(third.bytes.len(), 5 * 1024 * 1024);
        assert!(third.is_last);
        assert_eq!(
            third.bytes[..16],
            data[2 * FILE_PART_BYTES..2 * FILE_PART_BYTES + 16]
        );
    }

    #[test]
    fn empty_file_yields_empty_final_chunk() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut source = FileChunkSource::open(tmp.path()).unwrap();
        assert!(source.is_empty());

        let chunk = source.next_chunk().unwrap().unwrap();
        assert!(chunk.is_last);
        assert!(chunk.bytes.is_empty());
    }
}
