pub mod archive_client;
pub mod config;
pub mod cost;
pub mod dedup;
pub mod engine;
pub mod fits;
pub mod frames;
pub mod ledger;
pub mod lock;
pub mod names;
pub mod paths;
pub mod pipeline;
pub mod reduction;
pub mod runlog;
pub mod summary;
pub mod util;
pub mod warn;
