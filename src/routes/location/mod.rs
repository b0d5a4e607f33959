mod handler;
pub mod model;

pub use handler::{publish_location, record_location};
