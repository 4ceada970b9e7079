pub mod cookies;
pub mod gateway;
pub mod guard;
pub mod single_flight;

pub use gateway::{AuthGateway, HttpAuthGateway, LocalAuthGateway};
pub use guard::session_guard;
pub use single_flight::{RefreshCoordinator, SingleFlight};
