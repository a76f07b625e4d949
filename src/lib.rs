// Library for the daemon and tests to access modules

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod feed;
pub mod models;
pub mod routes;
pub mod source;
pub mod threat_log;
pub mod tracker;
pub mod version;
