mod handler;

pub use handler::{cleanup_expired_crossed_events, cleanup_expired_history};
