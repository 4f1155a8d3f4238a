pub mod command;
pub mod config;
pub mod live;
pub mod persist;
pub mod reactor;
pub mod review;

pub use command::{Command, CommandError};
pub use config::SessionConfig;
pub use live::LiveSession;
pub use persist::{PersistError, SessionSnapshot};
pub use reactor::{SessionReactor, TickReport};
pub use review::ReviewSession;
