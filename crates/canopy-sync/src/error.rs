use canopy_types::{CodecError, DocumentError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("failed to decode update: {0}")]
    Decode(String),
    #[error("failed to apply update: {0}")]
    Apply(String),
    #[error("malformed crdt document: {0}")]
    MalformedDocument(String),
    #[error("document or crdt document is already borrowed")]
    Busy,
}
