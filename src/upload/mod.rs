//! Chunked multipart upload pipeline.
//!
//! Chunk production ([`chunk`]), single-part storage PUTs ([`storage`]) and
//! the protocol loop tying them to the backend ([`orchestrator`]).

pub mod chunk;
pub mod orchestrator;
pub mod storage;

pub use chunk::{AudioChunk, ChunkBuffer, ChunkSource, FileChunkSource, RecordingChunkSource};
pub use orchestrator::{run_multipart_upload, UploadError, UploadRequest};
pub use storage::{PartUploadError, PartUploader, S3PartUploader};
