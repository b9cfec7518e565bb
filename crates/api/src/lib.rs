//! HTTP API: trigger runs and inspect the delivery queue.

pub mod app;
