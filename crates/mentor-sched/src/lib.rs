//! Reminder scheduling: projects recurring weekly appointments onto
//! future occurrences, classifies how far away they are, and sends each
//! reminder at most once per weekly cycle.

pub mod occurrence;
pub mod threshold;
pub mod tick;

use std::sync::Arc;

use chrono::FixedOffset;
use mentor_bot::gateway::MessengerGateway;
use mentor_db::Database;

/// Everything a tick needs, handed in at construction. There are no
/// ambient singletons: tests build one of these around an in-memory
/// database and a fake gateway.
pub struct AppContext {
    pub db: Arc<Database>,
    pub gateway: Arc<dyn MessengerGateway>,
    pub tz: FixedOffset,
}
