// libs/appointment-sync-cell/src/services/reminder.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;

use crate::clock::Clock;
use crate::models::{Appointment, Reminder, ReminderClass};
use crate::services::notifications::NotificationSink;
use crate::services::store::AppointmentStore;

const MAX_WARNING_MINUTES: i64 = 24 * 60;
const MAX_SCAN_SECS: u64 = 60 * 60;

/// Reminder thresholds. `resolution` is also the scan period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    pub warn_before: Duration,
    pub resolution: Duration,
}

impl ReminderPolicy {
    pub fn new(warn_before: Duration, resolution: Duration) -> Self {
        Self {
            warn_before,
            resolution,
        }
    }

    /// Out-of-range values are logged and replaced by the defaults.
    pub fn from_config(config: &AppConfig) -> Self {
        let defaults = Self::default();

        let warn_before = if (1..=MAX_WARNING_MINUTES).contains(&config.reminder_warning_minutes) {
            Duration::minutes(config.reminder_warning_minutes)
        } else {
            warn!(
                "Reminder warning of {} minutes is outside 1..={}, using {}",
                config.reminder_warning_minutes,
                MAX_WARNING_MINUTES,
                defaults.warn_before.num_minutes()
            );
            defaults.warn_before
        };

        let resolution = if (1..=MAX_SCAN_SECS).contains(&config.reminder_scan_secs) {
            Duration::seconds(config.reminder_scan_secs as i64)
        } else {
            warn!(
                "Reminder scan period of {}s is outside 1..={}, using {}s",
                config.reminder_scan_secs,
                MAX_SCAN_SECS,
                defaults.resolution.num_seconds()
            );
            defaults.resolution
        };

        Self::new(warn_before, resolution)
    }

    fn scan_period(&self) -> std::time::Duration {
        match self.resolution.to_std() {
            Ok(period) if !period.is_zero() => period,
            _ => std::time::Duration::from_secs(60),
        }
    }
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(15), Duration::seconds(60))
    }
}

/// Which reminder classes already fired, keyed by appointment.
///
/// Entries remember the appointment time they fired for so they can be
/// evicted once that time is safely in the past.
#[derive(Debug, Default)]
pub struct ReminderLedger {
    fired: HashMap<(String, ReminderClass), DateTime<Utc>>,
}

impl ReminderLedger {
    pub fn contains(&self, appointment_id: &str, class: ReminderClass) -> bool {
        self.fired.contains_key(&(appointment_id.to_string(), class))
    }

    /// Returns false when the key was already present.
    pub fn record(&mut self, appointment_id: &str, class: ReminderClass, scheduled_at: DateTime<Utc>) -> bool {
        self.fired
            .insert((appointment_id.to_string(), class), scheduled_at)
            .is_none()
    }

    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.fired.len();
        self.fired.retain(|_, scheduled_at| *scheduled_at >= cutoff);
        before - self.fired.len()
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

/// Evaluates one scan. Only PENDING and CONFIRMED appointments are considered.
///
/// The warning fires only inside `(warn_before - resolution, warn_before]`,
/// so it is raised by the single scan nearest the threshold and never late.
/// The due reminder fires inside `[0, resolution]`; past appointments never fire.
pub fn due_reminders(
    policy: &ReminderPolicy,
    ledger: &mut ReminderLedger,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> Vec<Reminder> {
    let zero = Duration::zero();
    let mut reminders = Vec::new();

    for appointment in appointments.iter().filter(|a| a.status.is_active()) {
        let delta = appointment.scheduled_at - now;

        let in_warning_window = delta > zero
            && delta <= policy.warn_before
            && delta > policy.warn_before - policy.resolution;

        if in_warning_window
            && ledger.record(&appointment.id, ReminderClass::Upcoming, appointment.scheduled_at)
        {
            reminders.push(reminder_for(appointment, ReminderClass::Upcoming));
        }

        let in_due_window = delta >= zero && delta <= policy.resolution;

        if in_due_window
            && ledger.record(&appointment.id, ReminderClass::DueNow, appointment.scheduled_at)
        {
            reminders.push(reminder_for(appointment, ReminderClass::DueNow));
        }
    }

    reminders
}

fn reminder_for(appointment: &Appointment, class: ReminderClass) -> Reminder {
    Reminder {
        appointment_id: appointment.id.clone(),
        class,
        scheduled_at: appointment.scheduled_at,
        patient_name: appointment.display_name(),
    }
}

/// Periodic reminder scan over the store's committed snapshot.
///
/// One ledger per scheduler, and at most one timer per scheduler: `start` is
/// idempotent, so a remount can never produce a second ticking loop.
pub struct ReminderScheduler {
    store: Arc<AppointmentStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    policy: ReminderPolicy,
    ledger: Mutex<ReminderLedger>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<AppointmentStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        policy: ReminderPolicy,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            policy,
            ledger: Mutex::new(ReminderLedger::default()),
            timer: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> ReminderPolicy {
        self.policy
    }

    pub async fn scan(&self) -> Vec<Reminder> {
        let now = self.clock.now();
        self.scan_at(now).await
    }

    #[instrument(skip(self))]
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let snapshot = self.store.snapshot().await;

        let reminders = match self.ledger.lock() {
            Ok(mut ledger) => {
                let reminders = due_reminders(&self.policy, &mut ledger, &snapshot.appointments, now);
                let evicted = ledger.evict_before(now - self.policy.resolution);
                if evicted > 0 {
                    debug!("Evicted {} stale reminder ledger entries", evicted);
                }
                reminders
            }
            Err(_) => Vec::new(),
        };

        let warning_minutes = self.policy.warn_before.num_minutes();
        for reminder in &reminders {
            info!(
                "Reminder {} for appointment {}",
                reminder.class.as_str(),
                reminder.appointment_id
            );
            self.sink.notify(reminder.to_notification(warning_minutes));
        }

        reminders
    }

    /// Scans immediately, then once per resolution period. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let Ok(mut timer) = self.timer.lock() else {
            return;
        };

        if timer.as_ref().map_or(false, |handle| !handle.is_finished()) {
            debug!("Reminder scheduler already running");
            return;
        }

        let scheduler = Arc::downgrade(self);
        let period = self.policy.scan_period();

        *timer = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.scan().await;
            }
        }));

        info!("Reminder scheduler started with period {:?}", period);
    }

    pub fn stop(&self) {
        let handle = match self.timer.lock() {
            Ok(mut timer) => timer.take(),
            Err(_) => None,
        };

        if let Some(handle) = handle {
            handle.abort();
            info!("Reminder scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .map(|timer| timer.as_ref().map_or(false, |handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().map(|ledger| ledger.len()).unwrap_or(0)
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
