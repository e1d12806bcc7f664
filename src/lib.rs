pub mod config;
pub mod document;
pub mod humanize;
pub mod ledger;
pub mod media;
pub mod messaging; // Expose for tests (MockProducer)
pub mod observability;
pub mod proto;
pub mod queue;
pub mod repair;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod validator;
pub mod worker;
