pub mod config;
pub mod logging;

pub mod dedup;
pub mod executor;
pub mod ledger;
pub mod paths;
pub mod pool;
pub mod retry;
