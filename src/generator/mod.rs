pub mod compose;
pub mod context;
pub mod error;
pub mod outlet;
pub mod outline;
pub mod research;
pub mod router;
pub mod state;
pub mod types;
pub mod workflow;
