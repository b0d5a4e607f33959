pub mod alert;
pub mod crossing;
pub mod location;
pub mod maintenance;
pub mod nearby;
