use async_trait::async_trait;

use super::domain::ExtractedFields;
use crate::workflows::maintenance::DocumentType;

/// External vision model turning a document image into structured fields.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(
        &self,
        image: &[u8],
        hint: DocumentType,
    ) -> Result<ExtractedFields, ExtractionError>;
}

/// Failure reported by, or on behalf of, the vision collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("malformed extraction response: {0}")]
    Malformed(String),
    #[error("unsupported document content: {0}")]
    Unsupported(String),
    #[error("vision service unavailable: {0}")]
    Transport(String),
}
