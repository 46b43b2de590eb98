// libs/appointment-sync-cell/src/services/bridge.rs
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use shared_models::error::AppError;

use crate::models::{Actor, RealtimeEvent, RealtimeEventKind};
use crate::services::notifications::NotificationSink;
use crate::services::realtime::{EventReceiver, RealtimeConnection};
use crate::services::store::{AppointmentStore, RefreshMode};

/// An event naming another doctor is dropped; an event naming nobody is kept,
/// since the push channel is already scoped to the actor's delivery room.
pub fn is_relevant(event: &RealtimeEvent, actor_id: &str) -> bool {
    match event.owner() {
        Some(owner) => owner == actor_id,
        None => true,
    }
}

struct BridgeTask {
    actor: Actor,
    handle: JoinHandle<()>,
}

/// Turns push events into silent store refreshes plus a notification.
pub struct RealtimeEventBridge {
    connection: Arc<RealtimeConnection>,
    store: Arc<AppointmentStore>,
    sink: Arc<dyn NotificationSink>,
    running: Mutex<Option<BridgeTask>>,
}

impl RealtimeEventBridge {
    pub fn new(
        connection: Arc<RealtimeConnection>,
        store: Arc<AppointmentStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            connection,
            store,
            sink,
            running: Mutex::new(None),
        }
    }

    /// Subscribes for `actor`. Calling it again for the same actor is a no-op;
    /// calling it for a different actor replaces the old subscriptions.
    pub fn start(&self, actor: &Actor) -> Result<(), AppError> {
        if !actor.is_doctor() {
            return Err(AppError::Auth(
                "Realtime updates require a signed-in doctor".to_string(),
            ));
        }

        let mut running = self
            .running
            .lock()
            .map_err(|_| AppError::Server("Realtime bridge state unavailable".to_string()))?;

        if let Some(task) = running.as_ref() {
            if task.actor == *actor && !task.handle.is_finished() {
                debug!("Realtime bridge already running for {}", actor.id);
                return Ok(());
            }
        }

        if let Some(previous) = running.take() {
            self.teardown(previous);
        }

        let subscribe = |kind| {
            self.connection
                .subscribe(kind)
                .map_err(|e| AppError::Network(e.to_string()))
        };
        let created = subscribe(RealtimeEventKind::Created)?;
        let updated = subscribe(RealtimeEventKind::StatusUpdated)?;

        let handle = tokio::spawn(run_bridge(
            self.store.clone(),
            self.sink.clone(),
            actor.clone(),
            created,
            updated,
        ));

        info!("Realtime bridge started for doctor {}", actor.id);
        *running = Some(BridgeTask {
            actor: actor.clone(),
            handle,
        });
        Ok(())
    }

    pub fn stop(&self) {
        let task = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => None,
        };

        if let Some(task) = task {
            info!("Realtime bridge stopped for doctor {}", task.actor.id);
            self.teardown(task);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.as_ref().map_or(false, |task| !task.handle.is_finished()))
            .unwrap_or(false)
    }

    fn teardown(&self, task: BridgeTask) {
        task.handle.abort();
        for kind in RealtimeEventKind::ALL {
            self.connection.unsubscribe(kind);
        }
    }
}

impl Drop for RealtimeEventBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_bridge(
    store: Arc<AppointmentStore>,
    sink: Arc<dyn NotificationSink>,
    actor: Actor,
    mut created: EventReceiver,
    mut updated: EventReceiver,
) {
    loop {
        let received = tokio::select! {
            event = created.recv() => event,
            event = updated.recv() => event,
        };

        match received {
            Ok(event) => handle_event(&store, sink.as_ref(), &actor, event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Realtime bridge lagged by {} events, refreshing", skipped);
                spawn_silent_refresh(store.clone(), actor.clone());
            }
            Err(RecvError::Closed) => {
                debug!("Realtime channel closed, bridge exiting");
                break;
            }
        }
    }
}

#[instrument(skip(store, sink, actor), fields(doctor_id = %actor.id, kind = event.kind().name()))]
fn handle_event(
    store: &Arc<AppointmentStore>,
    sink: &dyn NotificationSink,
    actor: &Actor,
    event: RealtimeEvent,
) {
    if !is_relevant(&event, &actor.id) {
        debug!("Ignoring event owned by another doctor");
        return;
    }

    spawn_silent_refresh(store.clone(), actor.clone());
    sink.notify(event.summary());
}

fn spawn_silent_refresh(store: Arc<AppointmentStore>, actor: Actor) {
    tokio::spawn(async move {
        // Silent mode never surfaces an error.
        let _ = store
            .refresh(&actor.id, &actor.token, RefreshMode::Silent)
            .await;
    });
}
