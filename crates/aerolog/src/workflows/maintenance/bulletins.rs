use async_trait::async_trait;

use super::domain::AircraftId;

/// AD/SB cross-reference feed. Only surfaces the advisory "new reference item" flag;
/// bulletin applicability is never computed here.
#[async_trait]
pub trait BulletinFeed: Send + Sync {
    async fn has_new_reference_item(&self, aircraft_id: &AircraftId)
        -> Result<bool, BulletinError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BulletinError {
    #[error("bulletin feed unavailable: {0}")]
    Unavailable(String),
}
