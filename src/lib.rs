// src/lib.rs
// Library interface for crtmon
pub mod bus;
pub mod cert_parser;
pub mod cli;
pub mod coalescer;
pub mod config;
pub mod ct_log;
pub mod dispatcher;
pub mod engine;
pub mod matcher;
pub mod notify;
pub mod output;
pub mod stats;
pub mod types;
