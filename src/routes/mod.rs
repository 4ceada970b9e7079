pub mod api;
pub mod entry;
pub mod pages;

pub use entry::{API_PREFIX, app, router};
