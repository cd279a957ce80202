//! Terminal front-end: one module per command family.

pub mod alloc;
pub mod holdings;
pub mod roi;
pub mod setup;
pub mod snapshot;
pub mod ui;
pub mod value;
