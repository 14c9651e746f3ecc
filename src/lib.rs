pub mod aggregate;
pub mod cache;
pub mod config;
pub mod fetch_error;
pub mod fetcher;
pub mod label;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod schedule_page;
pub mod source;
