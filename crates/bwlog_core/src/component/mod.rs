//! Logging components: the sender processes of a user's log.

mod record;
mod registry;

pub use record::{ComponentIdentity, LoggingComponent, APP_ID_OFFSET};
pub use registry::ComponentRegistry;
