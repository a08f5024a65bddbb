pub mod bulk;
pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod records;
pub mod runner;
pub mod scenarios;
pub mod shell;
pub mod store;
