use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use super::bulletins::BulletinFeed;
use super::domain::{AircraftId, LimitInputs, MaintenanceLimitsSnapshot};
use super::store::{MaintenanceRecordStore, StoreError};
use crate::clock::Clock;
use crate::workflows::compliance::{ComplianceEngine, ComplianceReport};

/// Reference status view for one aircraft. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceOverview {
    pub aircraft_id: AircraftId,
    pub report: ComplianceReport,
    /// `None` when the bulletin feed could not be reached.
    pub new_reference_item: Option<bool>,
}

/// Settings updates for the limits snapshot and the compliance overview read path.
pub struct AircraftStatusService<S, B> {
    store: Arc<S>,
    bulletins: Arc<B>,
    engine: ComplianceEngine,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl<S, B> AircraftStatusService<S, B>
where
    S: MaintenanceRecordStore + 'static,
    B: BulletinFeed + 'static,
{
    pub fn new(
        store: Arc<S>,
        bulletins: Arc<B>,
        engine: ComplianceEngine,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            bulletins,
            engine,
            clock,
            store_timeout,
        }
    }

    /// Replace the editable inputs. Fixed policy values are not part of the input type.
    pub async fn update_limits(
        &self,
        aircraft_id: &AircraftId,
        inputs: LimitInputs,
    ) -> Result<MaintenanceLimitsSnapshot, AircraftStatusError> {
        let snapshot = MaintenanceLimitsSnapshot::new(aircraft_id.clone(), inputs, self.clock.now());
        let saved = timeout(self.store_timeout, self.store.save_limits(snapshot))
            .await
            .map_err(|_| AircraftStatusError::Timeout)??;
        info!(aircraft = %aircraft_id, "maintenance limits updated");
        Ok(saved)
    }

    /// Evaluate the current snapshot. A missing snapshot evaluates every item as `unknown`.
    pub async fn compliance_overview(
        &self,
        aircraft_id: &AircraftId,
        as_of: Option<NaiveDate>,
    ) -> Result<ComplianceOverview, AircraftStatusError> {
        let now = self.clock.now();
        let as_of = as_of.unwrap_or_else(|| now.date_naive());

        let snapshot = timeout(self.store_timeout, self.store.limits_snapshot(aircraft_id))
            .await
            .map_err(|_| AircraftStatusError::Timeout)??
            .unwrap_or_else(|| MaintenanceLimitsSnapshot::empty(aircraft_id.clone(), now));

        let report = self.engine.evaluate(&snapshot, as_of);

        let new_reference_item = match timeout(
            self.store_timeout,
            self.bulletins.has_new_reference_item(aircraft_id),
        )
        .await
        {
            Ok(Ok(flag)) => Some(flag),
            Ok(Err(err)) => {
                warn!(aircraft = %aircraft_id, error = %err, "bulletin flag unavailable");
                None
            }
            Err(_) => {
                warn!(aircraft = %aircraft_id, "bulletin feed timed out");
                None
            }
        };

        Ok(ComplianceOverview {
            aircraft_id: aircraft_id.clone(),
            report,
            new_reference_item,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AircraftStatusError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("record store timed out")]
    Timeout,
}
