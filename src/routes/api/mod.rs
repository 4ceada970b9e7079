pub mod auth;
pub mod me;
pub mod router;

pub use router::router;
