//! Usage quota ledger
//!
//! Tracks a per-day message counter that restarts on every calendar-day
//! change, plus a separate non-expiring bonus balance. Each ledger sits
//! behind its own mutex so concurrent message-send paths cannot both read
//! a stale count and double-increment.

use crate::events::{emit, EngineEvent, EventSender};
use crate::state::{keys, Persistence};
use crate::types::{BonusLedger, DailyUsage};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source of "today" in the operating locale
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the system's local time zone
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    date: std::sync::RwLock<NaiveDate>,
}

impl ManualClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: std::sync::RwLock::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.write().unwrap_or_else(|e| e.into_inner()) = date;
    }

    /// Move forward by whole days
    pub fn advance_days(&self, days: u64) {
        let mut date = self.date.write().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = date.checked_add_days(chrono::Days::new(days)) {
            *date = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.date.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Outcome of spending one message allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum QuotaDecision {
    /// Counted against today's quota
    Daily { used: u32, remaining: u32 },
    /// Daily quota exhausted; one bonus credit spent
    Bonus { remaining_bonus: u32 },
    /// Nothing left to spend
    Exhausted,
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, QuotaDecision::Exhausted)
    }
}

/// Daily message counter and bonus-credit balance
pub struct UsageQuotaLedger {
    daily: Mutex<DailyUsage>,
    bonus: Mutex<BonusLedger>,
    daily_limit: u32,
    clock: Arc<dyn Clock>,
    persistence: Arc<Persistence>,
    event_tx: EventSender,
}

impl UsageQuotaLedger {
    /// Restore both ledgers from persistence
    pub async fn load(
        persistence: Arc<Persistence>,
        clock: Arc<dyn Clock>,
        daily_limit: u32,
        event_tx: EventSender,
    ) -> Self {
        let daily: DailyUsage = persistence.load(keys::DAILY_USAGE).await;
        let bonus: BonusLedger = persistence.load(keys::BONUS_LEDGER).await;

        tracing::debug!(
            daily_count = daily.message_count,
            daily_date = %daily.date,
            bonus = bonus.balance,
            "Quota ledgers loaded"
        );

        Self {
            daily: Mutex::new(daily),
            bonus: Mutex::new(bonus),
            daily_limit,
            clock,
            persistence,
            event_tx,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Count one message against today
    ///
    /// The first increment of a new day yields 1.
    pub async fn increment_daily_usage(&self) -> u32 {
        let mut daily = self.daily.lock().await;
        self.bump_daily(&mut daily)
    }

    /// Current daily usage; a stale date resets the count as a side effect
    pub async fn daily_usage(&self) -> DailyUsage {
        let mut daily = self.daily.lock().await;
        self.roll_over(&mut daily);
        daily.clone()
    }

    /// Messages left in today's quota
    pub async fn remaining_today(&self) -> u32 {
        let usage = self.daily_usage().await;
        self.daily_limit.saturating_sub(usage.message_count)
    }

    /// Spend one bonus credit if any are left
    pub async fn use_bonus_message(&self) -> bool {
        let mut bonus = self.bonus.lock().await;
        self.take_bonus(&mut bonus)
    }

    /// Add bonus credits, returning the new balance
    pub async fn add_bonus_messages(&self, count: u32) -> u32 {
        let mut bonus = self.bonus.lock().await;
        bonus.balance = bonus.balance.saturating_add(count);
        self.save_bonus(&bonus);

        tracing::info!(added = count, balance = bonus.balance, "Bonus messages added");
        bonus.balance
    }

    pub async fn bonus_balance(&self) -> u32 {
        self.bonus.lock().await.balance
    }

    /// Spend one message allowance: daily quota first, then a bonus credit
    pub async fn consume_message(&self) -> QuotaDecision {
        let mut daily = self.daily.lock().await;
        self.roll_over(&mut daily);

        if daily.message_count < self.daily_limit {
            let used = self.bump_daily(&mut daily);
            return QuotaDecision::Daily {
                used,
                remaining: self.daily_limit.saturating_sub(used),
            };
        }

        // Lock order is always daily then bonus
        let mut bonus = self.bonus.lock().await;
        if self.take_bonus(&mut bonus) {
            QuotaDecision::Bonus {
                remaining_bonus: bonus.balance,
            }
        } else {
            tracing::info!(limit = self.daily_limit, "Message quota exhausted");
            QuotaDecision::Exhausted
        }
    }

    fn bump_daily(&self, daily: &mut DailyUsage) -> u32 {
        let today = self.clock.today();
        if daily.date != today {
            *daily = DailyUsage {
                message_count: 1,
                date: today,
            };
        } else {
            daily.message_count = daily.message_count.saturating_add(1);
        }
        self.save_daily(daily);
        daily.message_count
    }

    fn roll_over(&self, daily: &mut DailyUsage) {
        let today = self.clock.today();
        if daily.date != today {
            tracing::debug!(stale = %daily.date, today = %today, "Daily usage reset");
            *daily = DailyUsage {
                message_count: 0,
                date: today,
            };
            self.save_daily(daily);
        }
    }

    fn take_bonus(&self, bonus: &mut BonusLedger) -> bool {
        if bonus.balance == 0 {
            return false;
        }
        bonus.balance -= 1;
        self.save_bonus(bonus);
        true
    }

    fn save_daily(&self, daily: &DailyUsage) {
        if let Err(e) = self.persistence.put(keys::DAILY_USAGE, daily) {
            tracing::warn!(error = %e, "Failed to queue daily usage write");
        }
        emit(
            &self.event_tx,
            EngineEvent::DailyUsageChanged {
                usage: daily.clone(),
            },
        );
    }

    fn save_bonus(&self, bonus: &BonusLedger) {
        if let Err(e) = self.persistence.put(keys::BONUS_LEDGER, bonus) {
            tracing::warn!(error = %e, "Failed to queue bonus ledger write");
        }
        emit(
            &self.event_tx,
            EngineEvent::BonusBalanceChanged {
                balance: bonus.balance,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryStateStore, StateStore};
    use tokio::sync::broadcast;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    async fn ledger_with(
        store: Arc<MemoryStateStore>,
        clock: Arc<ManualClock>,
        limit: u32,
    ) -> (UsageQuotaLedger, Arc<Persistence>) {
        let (tx, _rx) = broadcast::channel(256);
        let persistence = Arc::new(Persistence::new(store, tx.clone()));
        let ledger = UsageQuotaLedger::load(persistence.clone(), clock, limit, tx).await;
        (ledger, persistence)
    }

    #[tokio::test]
    async fn test_increment_same_day() {
        let clock = Arc::new(ManualClock::new(day(14)));
        let (ledger, _) = ledger_with(Arc::new(MemoryStateStore::new()), clock, 10).await;

        assert_eq!(ledger.increment_daily_usage().await, 1);
        assert_eq!(ledger.increment_daily_usage().await, 2);
        assert_eq!(ledger.increment_daily_usage().await, 3);
        assert_eq!(ledger.daily_usage().await.message_count, 3);
        assert_eq!(ledger.remaining_today().await, 7);
    }

    #[tokio::test]
    async fn test_day_boundary_restarts_at_one() {
        let clock = Arc::new(ManualClock::new(day(14)));
        let (ledger, _) = ledger_with(Arc::new(MemoryStateStore::new()), clock.clone(), 10).await;

        for _ in 0..5 {
            ledger.increment_daily_usage().await;
        }
        clock.advance_days(1);

        assert_eq!(ledger.increment_daily_usage().await, 1);
        assert_eq!(ledger.daily_usage().await.date, day(15));
    }

    #[tokio::test]
    async fn test_stale_read_resets_and_persists() {
        let store = Arc::new(MemoryStateStore::new());
        store
            .save(
                keys::DAILY_USAGE,
                &serde_json::json!({"messageCount": 9, "date": "2026-10-13"}),
            )
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(day(14)));
        let (ledger, persistence) = ledger_with(store.clone(), clock, 10).await;

        let usage = ledger.daily_usage().await;
        assert_eq!(usage.message_count, 0);
        assert_eq!(usage.date, day(14));

        persistence.flush().await;
        let stored = store.load(keys::DAILY_USAGE).await.unwrap().unwrap();
        assert_eq!(stored["messageCount"], 0);
        assert_eq!(stored["date"], "2026-10-14");
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_serialized() {
        let clock = Arc::new(ManualClock::new(day(14)));
        let (ledger, _) = ledger_with(Arc::new(MemoryStateStore::new()), clock, 1000).await;
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.increment_daily_usage().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ledger.daily_usage().await.message_count, 100);
    }

    #[tokio::test]
    async fn test_bonus_never_negative() {
        let clock = Arc::new(ManualClock::new(day(14)));
        let (ledger, _) = ledger_with(Arc::new(MemoryStateStore::new()), clock, 10).await;

        assert!(!ledger.use_bonus_message().await);
        assert_eq!(ledger.bonus_balance().await, 0);

        assert_eq!(ledger.add_bonus_messages(2).await, 2);
        assert!(ledger.use_bonus_message().await);
        assert!(ledger.use_bonus_message().await);
        assert!(!ledger.use_bonus_message().await);
        assert_eq!(ledger.bonus_balance().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_bonus_consumption() {
        let clock = Arc::new(ManualClock::new(day(14)));
        let (ledger, _) = ledger_with(Arc::new(MemoryStateStore::new()), clock, 10).await;
        let ledger = Arc::new(ledger);
        ledger.add_bonus_messages(10).await;

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.use_bonus_message().await })
            })
            .collect();

        let mut spent = 0;
        for handle in handles {
            if handle.await.unwrap() {
                spent += 1;
            }
        }
        assert_eq!(spent, 10);
        assert_eq!(ledger.bonus_balance().await, 0);
    }

    #[tokio::test]
    async fn test_consume_prefers_daily_then_bonus() {
        let clock = Arc::new(ManualClock::new(day(14)));
        let (ledger, _) = ledger_with(Arc::new(MemoryStateStore::new()), clock.clone(), 2).await;
        ledger.add_bonus_messages(1).await;

        assert_eq!(
            ledger.consume_message().await,
            QuotaDecision::Daily { used: 1, remaining: 1 }
        );
        assert_eq!(
            ledger.consume_message().await,
            QuotaDecision::Daily { used: 2, remaining: 0 }
        );
        assert_eq!(
            ledger.consume_message().await,
            QuotaDecision::Bonus { remaining_bonus: 0 }
        );
        let exhausted = ledger.consume_message().await;
        assert_eq!(exhausted, QuotaDecision::Exhausted);
        assert!(!exhausted.is_allowed());

        // New day frees the daily quota again
        clock.advance_days(1);
        assert_eq!(
            ledger.consume_message().await,
            QuotaDecision::Daily { used: 1, remaining: 1 }
        );
    }

    #[tokio::test]
    async fn test_ledgers_persist_independently() {
        let store = Arc::new(MemoryStateStore::new());
        let clock = Arc::new(ManualClock::new(day(14)));
        {
            let (ledger, persistence) = ledger_with(store.clone(), clock.clone(), 10).await;
            ledger.increment_daily_usage().await;
            ledger.increment_daily_usage().await;
            ledger.add_bonus_messages(5).await;
            persistence.flush().await;
        }

        let (restored, _) = ledger_with(store, clock, 10).await;
        assert_eq!(restored.daily_usage().await.message_count, 2);
        assert_eq!(restored.bonus_balance().await, 5);
    }
}
