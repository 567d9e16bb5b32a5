//! Per-account scan credits with speculative reservations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::domain::AccountId;
use crate::clock::Clock;

/// Speculative hold on one scan credit. Settled exactly once through
/// [`QuotaLedger::commit`] or [`QuotaLedger::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct ReservationToken {
    id: u64,
    account_id: AccountId,
}

impl ReservationToken {
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }
}

/// Usage view for an account's current period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub account_id: AccountId,
    pub consumed: u32,
    pub reserved: u32,
    pub ceiling: u32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuotaError {
    #[error("scan quota exhausted for account {account_id} ({ceiling} per period, resets {period_end})")]
    Exceeded {
        account_id: AccountId,
        ceiling: u32,
        period_end: DateTime<Utc>,
    },
    #[error("reservation {reservation} for account {account_id} is unknown or already settled")]
    UnknownReservation {
        account_id: AccountId,
        reservation: u64,
    },
}

#[derive(Debug)]
struct LedgerEntry {
    ceiling: u32,
    consumed: u32,
    reserved: HashSet<u64>,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(ceiling: u32, now: DateTime<Utc>) -> Self {
        let (period_start, period_end) = month_window(now);
        Self {
            ceiling,
            consumed: 0,
            reserved: HashSet::new(),
            period_start,
            period_end,
        }
    }

    /// Lazily start a new period once `now` crosses the boundary. In-flight
    /// reservations carry over.
    fn roll(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.period_end {
            return false;
        }
        let (period_start, period_end) = month_window(now);
        self.period_start = period_start;
        self.period_end = period_end;
        self.consumed = 0;
        true
    }

    fn in_use(&self) -> u32 {
        self.consumed
            .saturating_add(u32::try_from(self.reserved.len()).unwrap_or(u32::MAX))
    }

    fn status(&self, account_id: &AccountId) -> QuotaStatus {
        QuotaStatus {
            account_id: account_id.clone(),
            consumed: self.consumed,
            reserved: u32::try_from(self.reserved.len()).unwrap_or(u32::MAX),
            ceiling: self.ceiling,
            period_start: self.period_start,
            period_end: self.period_end,
        }
    }
}

/// Calendar month (UTC) containing `now`, as a half-open window.
fn month_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let first = today.with_day(1).unwrap_or(today);
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    (
        first.and_time(NaiveTime::MIN).and_utc(),
        next.and_time(NaiveTime::MIN).and_utc(),
    )
}

/// Ledger gating new scans against each account's plan ceiling.
///
/// All operations for every account serialize on one lock, so two concurrent
/// reservations can never both observe spare capacity for the last credit.
pub struct QuotaLedger {
    clock: Arc<dyn Clock>,
    default_ceiling: u32,
    entries: Mutex<HashMap<AccountId, LedgerEntry>>,
    next_reservation: AtomicU64,
}

impl QuotaLedger {
    pub fn new(default_ceiling: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            default_ceiling,
            entries: Mutex::new(HashMap::new()),
            next_reservation: AtomicU64::new(1),
        }
    }

    pub fn reserve(&self, account_id: &AccountId) -> Result<ReservationToken, QuotaError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("quota mutex poisoned");
        let entry = entries
            .entry(account_id.clone())
            .or_insert_with(|| LedgerEntry::new(self.default_ceiling, now));

        if entry.roll(now) {
            info!(account = %account_id, period_start = %entry.period_start, "quota period reset");
        }

        if entry.in_use() >= entry.ceiling {
            debug!(
                account = %account_id,
                consumed = entry.consumed,
                reserved = entry.reserved.len(),
                ceiling = entry.ceiling,
                "quota reservation refused"
            );
            return Err(QuotaError::Exceeded {
                account_id: account_id.clone(),
                ceiling: entry.ceiling,
                period_end: entry.period_end,
            });
        }

        let id = self.next_reservation.fetch_add(1, Ordering::Relaxed);
        entry.reserved.insert(id);
        debug!(account = %account_id, reservation = id, "quota reserved");

        Ok(ReservationToken {
            id,
            account_id: account_id.clone(),
        })
    }

    /// Convert a reservation into permanent consumption for the current period.
    ///
    /// Consumption never passes the ceiling: if the ceiling was lowered while the
    /// reservation was held and no credit is left, the hold is dropped and `Exceeded`
    /// is returned.
    pub fn commit(&self, token: ReservationToken) -> Result<(), QuotaError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("quota mutex poisoned");
        let entry = Self::settle(&mut entries, &token)?;
        entry.roll(now);
        if entry.consumed >= entry.ceiling {
            info!(
                account = %token.account_id,
                reservation = token.id,
                consumed = entry.consumed,
                ceiling = entry.ceiling,
                "quota commit refused; ceiling lowered below usage"
            );
            return Err(QuotaError::Exceeded {
                account_id: token.account_id.clone(),
                ceiling: entry.ceiling,
                period_end: entry.period_end,
            });
        }
        entry.consumed = entry.consumed.saturating_add(1);
        debug!(
            account = %token.account_id,
            reservation = token.id,
            consumed = entry.consumed,
            "quota committed"
        );
        Ok(())
    }

    /// Return a reserved credit without counting it against the ceiling.
    pub fn release(&self, token: ReservationToken) -> Result<(), QuotaError> {
        let mut entries = self.entries.lock().expect("quota mutex poisoned");
        Self::settle(&mut entries, &token)?;
        debug!(account = %token.account_id, reservation = token.id, "quota released");
        Ok(())
    }

    pub fn status(&self, account_id: &AccountId) -> QuotaStatus {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("quota mutex poisoned");
        match entries.get_mut(account_id) {
            Some(entry) => {
                entry.roll(now);
                entry.status(account_id)
            }
            None => LedgerEntry::new(self.default_ceiling, now).status(account_id),
        }
    }

    /// Apply a plan change. Takes effect for the next reservation and for commits of
    /// reservations already held.
    pub fn set_ceiling(&self, account_id: &AccountId, ceiling: u32) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("quota mutex poisoned");
        entries
            .entry(account_id.clone())
            .or_insert_with(|| LedgerEntry::new(ceiling, now))
            .ceiling = ceiling;
        info!(account = %account_id, ceiling, "quota ceiling updated");
    }

    fn settle<'a>(
        entries: &'a mut HashMap<AccountId, LedgerEntry>,
        token: &ReservationToken,
    ) -> Result<&'a mut LedgerEntry, QuotaError> {
        let unknown = || QuotaError::UnknownReservation {
            account_id: token.account_id.clone(),
            reservation: token.id,
        };

        let entry = entries.get_mut(&token.account_id).ok_or_else(unknown)?;
        if !entry.reserved.remove(&token.id) {
            return Err(unknown());
        }
        Ok(entry)
    }
}

impl std::fmt::Debug for QuotaLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaLedger")
            .field("default_ceiling", &self.default_ceiling)
            .finish_non_exhaustive()
    }
}
