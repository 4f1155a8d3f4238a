pub mod correlation;
pub mod event;
pub mod latency;
pub mod store;
pub mod time;
pub mod timeline;
