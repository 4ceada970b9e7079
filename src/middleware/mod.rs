pub mod guards;
pub mod json_error;
pub mod panic;

pub use guards::{AuthGuard, AuthRoleGuard};
pub use json_error::json_error_middleware;
pub use panic::catch_panic_layer;
