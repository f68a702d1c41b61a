pub mod api;
pub mod app;
pub mod config;
pub mod humanize;
pub mod ledger;
pub mod messaging;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod search;
pub mod storage;
pub mod worker;
