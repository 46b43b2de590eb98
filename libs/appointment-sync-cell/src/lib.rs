pub mod clock;
pub mod models;
pub mod handlers;
pub mod router;
pub mod services;

pub use clock::{Clock, ManualClock, SystemClock};
pub use models::*;
pub use handlers::TriageState;
pub use router::triage_routes;
