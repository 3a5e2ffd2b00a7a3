pub mod bid;
pub mod config;
pub mod error;
pub mod factoring;
pub mod identity;
pub mod invoice;
pub mod lifecycle;
pub mod logging;
pub mod policy;
pub mod report;
pub mod service;
pub mod state;
pub mod store;
pub mod transition;
pub mod utils;
