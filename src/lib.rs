pub mod config;
pub mod decode;
pub mod ingest;
pub mod project;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod transport;
pub mod ui;
