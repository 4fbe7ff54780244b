pub mod compactor;
pub mod config;
pub mod engine;
pub mod import;
pub mod journal;
pub mod limits;
pub mod model;
pub mod observability;
pub mod property;
pub mod tax;
