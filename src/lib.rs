pub mod audio;
pub mod detectors;
pub mod kernel;
pub mod services;
pub mod session;

pub use kernel::event::{Event, EventId, EventKind};
pub use kernel::store::{EventStore, StoreSnapshot};
pub use session::reactor::SessionReactor;
