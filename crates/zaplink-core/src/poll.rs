// ── Adaptive poll scheduling ──
//
// Polling cadence is a pure function of (poll class, observed state),
// recomputed on every scheduling decision -- there is no stored
// per-device drift to go stale. The scheduler only tracks WHEN each
// (device, class) pair is next due and how many consecutive failures
// it has seen; the tick loop that acts on this lives with the Account.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::model::DeviceKind;

/// The three data classes polled from the cloud, each on its own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display)]
pub enum PollClass {
    /// Charger observations / installation detail. Seconds to minutes.
    State,
    /// Full device info. Hourly.
    Info,
    /// Firmware status per installation. Daily.
    Firmware,
}

/// Cadence tuning for the scheduler.
#[derive(Debug, Clone)]
pub struct CadencePolicy {
    /// State-class interval while all chargers are idle.
    pub state_idle: Duration,
    /// State-class interval while any tracked charger is charging.
    pub state_charging: Duration,
    pub info: Duration,
    pub firmware: Duration,
    /// Retry interval after a failed fetch.
    pub retry_backoff: Duration,
    /// Consecutive failures tolerated before the device is flagged
    /// unavailable and cadence falls back to normal.
    pub max_consecutive_failures: u32,
    /// Confirmation-sweep delays after a charger command.
    pub charger_trigger_delays: Vec<Duration>,
    /// Confirmation-sweep delays after an installation update.
    pub installation_trigger_delays: Vec<Duration>,
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self {
            state_idle: Duration::from_secs(10 * 60),
            state_charging: Duration::from_secs(60),
            info: Duration::from_secs(60 * 60),
            firmware: Duration::from_secs(24 * 60 * 60),
            retry_backoff: Duration::from_secs(30),
            max_consecutive_failures: 5,
            charger_trigger_delays: vec![
                Duration::from_secs(2),
                Duration::from_secs(7),
                Duration::from_secs(15),
            ],
            installation_trigger_delays: vec![Duration::from_secs(2), Duration::from_secs(7)],
        }
    }
}

/// The interval for a poll class given the current state snapshot.
///
/// Pure: same inputs, same answer. `any_charging` is whether any
/// tracked charger is actively charging right now.
pub fn cadence(policy: &CadencePolicy, class: PollClass, any_charging: bool) -> Duration {
    match class {
        PollClass::State if any_charging => policy.state_charging,
        PollClass::State => policy.state_idle,
        PollClass::Info => policy.info,
        PollClass::Firmware => policy.firmware,
    }
}

struct SlotState {
    next_due: Instant,
    failures: u32,
}

/// Next-due bookkeeping for every (device, class) pair, plus the
/// per-device confirmation-sweep tasks.
pub struct PollScheduler {
    policy: CadencePolicy,
    slots: DashMap<(String, PollClass), SlotState>,
    sweeps: DashMap<String, JoinHandle<()>>,
}

impl PollScheduler {
    pub fn new(policy: CadencePolicy) -> Self {
        Self {
            policy,
            slots: DashMap::new(),
            sweeps: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &CadencePolicy {
        &self.policy
    }

    /// Register the poll classes for a device, all due immediately.
    /// Firmware is installation-scoped (the endpoint covers every
    /// charger of the installation in one response).
    pub fn register_device(&self, uid: &str, kind: DeviceKind) {
        let now = Instant::now();
        let mut classes = vec![PollClass::State, PollClass::Info];
        if kind == DeviceKind::Installation {
            classes.push(PollClass::Firmware);
        }
        for class in classes {
            self.slots.entry((uid.to_owned(), class)).or_insert(SlotState {
                next_due: now,
                failures: 0,
            });
        }
    }

    pub fn unregister_device(&self, uid: &str) {
        self.slots.retain(|(slot_uid, _), _| slot_uid != uid);
        if let Some((_, task)) = self.sweeps.remove(uid) {
            task.abort();
        }
    }

    /// The (device, class) pairs due at `now`.
    pub fn due(&self, now: Instant) -> Vec<(String, PollClass)> {
        self.slots
            .iter()
            .filter(|entry| entry.next_due <= now)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Earliest scheduled deadline, if any slot exists.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().map(|entry| entry.next_due).min()
    }

    /// Pull a class forward to "due now" (accelerated confirmation).
    pub fn mark_due_now(&self, uid: &str, class: PollClass) {
        if let Some(mut slot) = self.slots.get_mut(&(uid.to_owned(), class)) {
            slot.next_due = Instant::now();
        }
    }

    /// Reschedule after a successful fetch.
    pub fn on_success(&self, uid: &str, class: PollClass, any_charging: bool) {
        if let Some(mut slot) = self.slots.get_mut(&(uid.to_owned(), class)) {
            slot.failures = 0;
            slot.next_due = Instant::now() + cadence(&self.policy, class, any_charging);
        }
    }

    /// Reschedule after a failed fetch; returns the consecutive-failure
    /// count. Within the tolerance the retry backoff applies; beyond it
    /// the normal cadence resumes (the caller flags unavailability).
    pub fn on_failure(&self, uid: &str, class: PollClass, any_charging: bool) -> u32 {
        let Some(mut slot) = self.slots.get_mut(&(uid.to_owned(), class)) else {
            return 0;
        };
        slot.failures = slot.failures.saturating_add(1);
        let delay = if slot.failures < self.policy.max_consecutive_failures {
            self.policy.retry_backoff
        } else {
            cadence(&self.policy, class, any_charging)
        };
        slot.next_due = Instant::now() + delay;
        debug!(uid, %class, failures = slot.failures, ?delay, "fetch failed, rescheduled");
        slot.failures
    }

    /// Install the confirmation-sweep task for a device, cancelling one
    /// already in flight.
    pub fn install_sweep(&self, uid: &str, task: JoinHandle<()>) {
        if let Some(previous) = self.sweeps.insert(uid.to_owned(), task) {
            previous.abort();
        }
    }

    /// Abort all sweep tasks (teardown).
    pub fn abort_sweeps(&self) {
        self.sweeps.retain(|_, task| {
            task.abort();
            false
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cadence_is_pure_and_adaptive() {
        let policy = CadencePolicy::default();
        assert_eq!(
            cadence(&policy, PollClass::State, false),
            Duration::from_secs(600)
        );
        assert_eq!(
            cadence(&policy, PollClass::State, true),
            Duration::from_secs(60)
        );
        assert_eq!(cadence(&policy, PollClass::Info, true), Duration::from_secs(3600));
        assert_eq!(
            cadence(&policy, PollClass::Firmware, false),
            Duration::from_secs(86400)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_devices_are_due_immediately() {
        let scheduler = PollScheduler::new(CadencePolicy::default());
        scheduler.register_device("inst1", DeviceKind::Installation);
        scheduler.register_device("chg1", DeviceKind::Charger);

        let mut due = scheduler.due(Instant::now());
        due.sort();
        assert_eq!(
            due,
            vec![
                ("chg1".to_owned(), PollClass::State),
                ("chg1".to_owned(), PollClass::Info),
                ("inst1".to_owned(), PollClass::State),
                ("inst1".to_owned(), PollClass::Info),
                ("inst1".to_owned(), PollClass::Firmware),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_reschedules_with_current_cadence() {
        let scheduler = PollScheduler::new(CadencePolicy::default());
        scheduler.register_device("chg1", DeviceKind::Charger);

        // Idle: next state poll lands a full idle interval out.
        scheduler.on_success("chg1", PollClass::State, false);
        assert!(scheduler.due(Instant::now()).iter().all(|(_, c)| *c != PollClass::State));
        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(scheduler
            .due(Instant::now())
            .contains(&("chg1".to_owned(), PollClass::State)));

        // Charging: the interval shrinks on the next scheduling decision.
        scheduler.on_success("chg1", PollClass::State, true);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(scheduler
            .due(Instant::now())
            .contains(&("chg1".to_owned(), PollClass::State)));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_use_retry_backoff_then_fall_back() {
        let policy = CadencePolicy {
            retry_backoff: Duration::from_secs(30),
            max_consecutive_failures: 3,
            ..CadencePolicy::default()
        };
        let scheduler = PollScheduler::new(policy);
        scheduler.register_device("chg1", DeviceKind::Charger);

        assert_eq!(scheduler.on_failure("chg1", PollClass::State, false), 1);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(scheduler
            .due(Instant::now())
            .contains(&("chg1".to_owned(), PollClass::State)));

        assert_eq!(scheduler.on_failure("chg1", PollClass::State, false), 2);
        // Third consecutive failure: back to normal cadence.
        assert_eq!(scheduler.on_failure("chg1", PollClass::State, false), 3);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!scheduler
            .due(Instant::now())
            .contains(&("chg1".to_owned(), PollClass::State)));
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(scheduler
            .due(Instant::now())
            .contains(&("chg1".to_owned(), PollClass::State)));
    }

    #[tokio::test(start_paused = true)]
    async fn mark_due_now_accelerates_a_slot() {
        let scheduler = PollScheduler::new(CadencePolicy::default());
        scheduler.register_device("chg1", DeviceKind::Charger);
        scheduler.on_success("chg1", PollClass::State, false);
        assert!(!scheduler
            .due(Instant::now())
            .contains(&("chg1".to_owned(), PollClass::State)));

        scheduler.mark_due_now("chg1", PollClass::State);
        assert!(scheduler
            .due(Instant::now())
            .contains(&("chg1".to_owned(), PollClass::State)));
    }
}
