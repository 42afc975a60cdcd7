//! news-harvester library
//!
//! A content-extraction service that submits long-running scraping jobs
//! (selector discovery, article scraping, article cleaning), runs them under
//! bounded concurrency and tracks their progress through a polling API.

pub mod config;
pub mod errors;
pub mod intake;
pub mod jobs;
pub mod models;
pub mod overview;
pub mod pipeline;
pub mod web;
