pub mod bridge;
pub mod gateway;
pub mod history;
pub mod notifications;
pub mod projection;
pub mod realtime;
pub mod reminder;
pub mod session;
pub mod store;

pub use bridge::RealtimeEventBridge;
pub use gateway::{AppointmentGateway, RestAppointmentGateway};
pub use history::PatientHistoryService;
pub use notifications::{NotificationFeed, NotificationSink};
pub use realtime::{RealtimeConnection, RealtimeError};
pub use reminder::{ReminderLedger, ReminderPolicy, ReminderScheduler};
pub use session::{ScreenLease, SessionManager, SessionSettings, TriageSession};
pub use store::{AppointmentStore, RefreshMode};
