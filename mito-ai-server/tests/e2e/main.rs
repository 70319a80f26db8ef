//! End-to-end tests: a real server on 127.0.0.1:0 driven over websocket.

mod auth;
mod common;
mod completion;
mod invalid_json;
mod streaming;
