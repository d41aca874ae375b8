//! Newswire - A News Aggregation Feed
//!
//! This crate fetches headlines from an upstream news provider, caches them
//! in SQLite, pushes new items to connected clients in real time and keeps a
//! client-side feed state that merges every source into one view.

pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod realtime;
pub mod routes;
pub mod store;
