//! Burrow - a daily digest aggregator
//!
//! Fetches weather, reading highlights, news and social posts concurrently,
//! merges them so every configured sub-source is represented, renders one
//! email and sends it on a daily schedule.

pub mod aggregator;
pub mod config;
pub mod db;
pub mod digest;
pub mod enrich;
pub mod mailer;
pub mod merge;
pub mod normalize;
pub mod render;
pub mod routes;
pub mod source;
pub mod sources;
