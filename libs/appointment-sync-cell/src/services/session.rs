// libs/appointment-sync-cell/src/services/session.rs
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::clock::Clock;
use crate::models::{
    Actor, AppointmentSnapshot, AppointmentStatus, PatientHistory, RemovalTicket, StatusCounts,
    TriageView, ViewState,
};
use crate::services::bridge::RealtimeEventBridge;
use crate::services::gateway::AppointmentGateway;
use crate::services::history::PatientHistoryService;
use crate::services::notifications::NotificationFeed;
use crate::services::projection;
use crate::services::realtime::RealtimeConnection;
use crate::services::reminder::{ReminderPolicy, ReminderScheduler};
use crate::services::store::{AppointmentStore, RefreshMode};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: std::time::Duration,
    pub utc_offset: FixedOffset,
    pub reminder_policy: ReminderPolicy,
    pub notification_capacity: usize,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let utc_offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| {
                warn!("UTC offset of {} minutes is out of range, using UTC", config.utc_offset_minutes);
                Utc.fix()
            });

        Self {
            poll_interval: std::time::Duration::from_secs(config.poll_interval_secs.max(1)),
            utc_offset,
            reminder_policy: ReminderPolicy::from_config(config),
            notification_capacity: 50,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Everything one signed-in doctor's appointment screen runs on.
///
/// Background services (push bridge, reminder timer, poller) run while at
/// least one [`ScreenLease`] is held and stop when the last one is dropped.
pub struct TriageSession {
    actor: RwLock<Actor>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    store: Arc<AppointmentStore>,
    history: PatientHistoryService,
    connection: Arc<RealtimeConnection>,
    bridge: RealtimeEventBridge,
    scheduler: Arc<ReminderScheduler>,
    feed: Arc<NotificationFeed>,
    view: RwLock<ViewState>,
    leases: Mutex<usize>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TriageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageSession").finish_non_exhaustive()
    }
}

impl TriageSession {
    pub fn new(
        actor: Actor,
        gateway: Arc<dyn AppointmentGateway>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let feed = Arc::new(NotificationFeed::new(settings.notification_capacity));
        let store = Arc::new(AppointmentStore::new(gateway.clone(), clock.clone()));
        let connection = Arc::new(RealtimeConnection::new());
        let bridge = RealtimeEventBridge::new(connection.clone(), store.clone(), feed.clone());
        let scheduler = Arc::new(ReminderScheduler::new(
            store.clone(),
            feed.clone(),
            clock.clone(),
            settings.reminder_policy,
        ));

        Arc::new(Self {
            actor: RwLock::new(actor),
            settings,
            clock,
            store,
            history: PatientHistoryService::new(gateway),
            connection,
            bridge,
            scheduler,
            feed,
            view: RwLock::new(ViewState::default()),
            leases: Mutex::new(0),
            poller: Mutex::new(None),
        })
    }

    pub fn actor(&self) -> Actor {
        self.actor
            .read()
            .map(|actor| actor.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Swaps in a refreshed token for the same doctor. Reminder history and
    /// view state are kept; a running bridge is resubscribed with the new token.
    pub fn rotate_token(&self, token: &str) -> Result<(), AppError> {
        let actor = {
            let mut actor = self
                .actor
                .write()
                .map_err(|_| AppError::Server("Session state unavailable".to_string()))?;
            if actor.token == token {
                return Ok(());
            }
            actor.token = token.to_string();
            actor.clone()
        };

        if self.is_active() {
            self.bridge.start(&actor)?;
        }
        debug!("Rotated token for doctor {}", actor.id);
        Ok(())
    }

    pub fn store(&self) -> &Arc<AppointmentStore> {
        &self.store
    }

    pub fn connection(&self) -> &Arc<RealtimeConnection> {
        &self.connection
    }

    pub fn notifications(&self) -> &Arc<NotificationFeed> {
        &self.feed
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    pub fn bridge(&self) -> &RealtimeEventBridge {
        &self.bridge
    }

    pub fn pending_count(&self) -> watch::Receiver<usize> {
        self.store.subscribe_pending_count()
    }

    pub fn is_active(&self) -> bool {
        self.leases.lock().map(|leases| *leases > 0).unwrap_or(false)
    }

    /// Acquires a lease on the screen's background services.
    ///
    /// The first lease performs a surfaced refresh, then starts the push
    /// bridge, the reminder timer (which scans the fresh snapshot at once) and
    /// the silent poller. A failed initial refresh does not block activation;
    /// it is reported on the lease.
    pub async fn activate(self: &Arc<Self>) -> Result<ScreenLease, AppError> {
        let actor = self.actor();
        if !actor.is_doctor() {
            return Err(AppError::Auth(
                "The appointment screen requires a signed-in doctor".to_string(),
            ));
        }

        let first = {
            let mut leases = self
                .leases
                .lock()
                .map_err(|_| AppError::Server("Session state unavailable".to_string()))?;
            *leases += 1;
            *leases == 1
        };

        let mut initial_error = None;
        if first {
            if let Err(e) = self.refresh().await {
                warn!("Initial refresh for doctor {} failed: {}", actor.id, e);
                initial_error = Some(e);
            }

            if let Err(e) = self.start_services() {
                self.release_lease();
                return Err(e);
            }
            info!("Triage session activated for doctor {}", actor.id);
        } else {
            debug!("Additional lease on active session for doctor {}", actor.id);
        }

        Ok(ScreenLease {
            session: Some(self.clone()),
            initial_error,
        })
    }

    fn start_services(self: &Arc<Self>) -> Result<(), AppError> {
        self.bridge.start(&self.actor())?;
        self.scheduler.start();

        if let Ok(mut poller) = self.poller.lock() {
            if poller.as_ref().map_or(true, |handle| handle.is_finished()) {
                *poller = Some(self.spawn_poller());
            }
        }

        Ok(())
    }

    fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::downgrade(self);
        let period = self.settings.poll_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The immediate tick is covered by the activation refresh.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                let actor = session.actor();
                let _ = session
                    .store
                    .refresh(&actor.id, &actor.token, RefreshMode::Silent)
                    .await;
            }
        })
    }

    fn release_lease(&self) {
        let last = match self.leases.lock() {
            Ok(mut leases) => {
                *leases = leases.saturating_sub(1);
                *leases == 0
            }
            Err(_) => false,
        };

        if last {
            self.stop_services();
            info!("Triage session deactivated for doctor {}", self.actor().id);
        }
    }

    fn stop_services(&self) {
        self.bridge.stop();
        self.scheduler.stop();

        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
    }

    /// Ends the session for good: services stop and the push connection closes.
    pub fn close(&self) {
        if let Ok(mut leases) = self.leases.lock() {
            *leases = 0;
        }
        self.stop_services();
        self.connection.close();
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        self.clock.now().with_timezone(&self.settings.utc_offset)
    }

    pub async fn snapshot(&self) -> Arc<AppointmentSnapshot> {
        self.store.snapshot().await
    }

    pub async fn counts(&self) -> StatusCounts {
        let snapshot = self.store.snapshot().await;
        projection::count_by_status(&snapshot.appointments, &self.local_now())
    }

    pub fn view_state(&self) -> ViewState {
        self.view
            .read()
            .map(|view| view.clone())
            .unwrap_or_default()
    }

    pub async fn view(&self) -> TriageView {
        let snapshot = self.store.snapshot().await;
        projection::triage_view(&snapshot.appointments, &self.view_state(), &self.local_now())
    }

    pub async fn set_view(&self, active_tab: AppointmentStatus, search_query: &str) -> Result<TriageView, AppError> {
        if !active_tab.is_triage_tab() {
            return Err(AppError::ValidationError(format!(
                "There is no {} tab",
                active_tab.to_string().to_lowercase()
            )));
        }

        self.switch_tab(active_tab, Some(search_query));
        Ok(self.view().await)
    }

    fn switch_tab(&self, active_tab: AppointmentStatus, search_query: Option<&str>) {
        if let Ok(mut view) = self.view.write() {
            view.active_tab = active_tab;
            if let Some(query) = search_query {
                view.search_query = query.to_string();
            }
        }
    }

    /// Surfaced refresh: failure clears the list and is returned.
    pub async fn refresh(&self) -> Result<Arc<AppointmentSnapshot>, AppError> {
        let actor = self.actor();
        self.store
            .refresh(&actor.id, &actor.token, RefreshMode::Surfaced)
            .await
    }

    /// Confirms, re-reads, and moves the view to the CONFIRMED tab.
    pub async fn confirm(&self, appointment_id: &str) -> Result<TriageView, AppError> {
        self.store
            .apply_status_change(&self.actor(), appointment_id, AppointmentStatus::Confirmed)
            .await?;
        self.switch_tab(AppointmentStatus::Confirmed, None);
        Ok(self.view().await)
    }

    pub async fn reschedule(
        &self,
        appointment_id: &str,
        scheduled_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<TriageView, AppError> {
        self.store
            .apply_reschedule(&self.actor(), appointment_id, scheduled_at, reason)
            .await?;
        Ok(self.view().await)
    }

    /// Cancels, re-reads, and moves the view to the CANCELLED tab.
    pub async fn cancel(&self, appointment_id: &str, cancellation_reason: &str) -> Result<TriageView, AppError> {
        self.store
            .cancel(&self.actor(), appointment_id, cancellation_reason)
            .await?;
        self.switch_tab(AppointmentStatus::Cancelled, None);
        Ok(self.view().await)
    }

    pub async fn request_removal(&self, appointment_id: &str) -> Result<RemovalTicket, AppError> {
        self.store.request_removal(appointment_id).await
    }

    pub fn abandon_removal(&self, token: Uuid) -> bool {
        self.store.abandon_removal(token)
    }

    pub async fn confirm_removal(&self, token: Uuid) -> Result<TriageView, AppError> {
        self.store.confirm_removal(&self.actor(), token).await?;
        Ok(self.view().await)
    }

    pub async fn patient_history(&self, patient_id: &str) -> PatientHistory {
        self.history.fetch(patient_id, &self.actor().token).await
    }
}

/// Ownership handle for an active screen. Dropping it releases the lease.
#[derive(Debug)]
pub struct ScreenLease {
    session: Option<Arc<TriageSession>>,
    initial_error: Option<AppError>,
}

impl ScreenLease {
    pub fn session(&self) -> Option<&Arc<TriageSession>> {
        self.session.as_ref()
    }

    /// Failure of the activation refresh, if it failed.
    pub fn initial_error(&self) -> Option<&AppError> {
        self.initial_error.as_ref()
    }

    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(session) = self.session.take() {
            session.release_lease();
        }
    }
}

impl Drop for ScreenLease {
    fn drop(&mut self) {
        self.release_now();
    }
}

struct ActiveSession {
    session: Arc<TriageSession>,
    _lease: ScreenLease,
}

/// Holds the one active session and replaces it when the actor changes.
pub struct SessionManager {
    gateway: Arc<dyn AppointmentGateway>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    current: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn AppointmentGateway>, clock: Arc<dyn Clock>, settings: SessionSettings) -> Self {
        Self {
            gateway,
            clock,
            settings,
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Activates a session for `actor`, tearing down any session of another
    /// actor first. The same doctor under a refreshed token keeps the running
    /// session. Returns the session and the initial refresh failure, if any.
    pub async fn activate(&self, actor: Actor) -> Result<(Arc<TriageSession>, Option<AppError>), AppError> {
        if !actor.is_doctor() {
            return Err(AppError::Auth(
                "The appointment screen requires a signed-in doctor".to_string(),
            ));
        }

        let mut current = self.current.lock().await;

        if let Some(active) = current.as_ref() {
            if active.session.actor().same_identity(&actor) {
                active.session.rotate_token(&actor.token)?;
                return Ok((active.session.clone(), None));
            }
        }

        if let Some(previous) = current.take() {
            info!(
                "Actor changed from {} to {}, closing previous session",
                previous.session.actor().id,
                actor.id
            );
            previous.session.close();
        }

        let session = TriageSession::new(actor, self.gateway.clone(), self.clock.clone(), self.settings.clone());
        let lease = session.activate().await?;
        let initial_error = lease.initial_error().cloned();

        *current = Some(ActiveSession {
            session: session.clone(),
            _lease: lease,
        });

        Ok((session, initial_error))
    }

    /// Returns false when no session was active.
    pub async fn deactivate(&self) -> bool {
        match self.current.lock().await.take() {
            Some(active) => {
                active.session.close();
                true
            }
            None => false,
        }
    }

    pub async fn current(&self) -> Option<Arc<TriageSession>> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// The active session, provided it belongs to `user_id`.
    pub async fn session_for(&self, user_id: &str) -> Result<Arc<TriageSession>, AppError> {
        match self.current().await {
            Some(session) if session.actor().id == user_id => Ok(session),
            Some(_) => Err(AppError::Auth(
                "Another doctor is signed in on this device".to_string(),
            )),
            None => Err(AppError::NotFound(
                "No active appointment session; activate one first".to_string(),
            )),
        }
    }
}
