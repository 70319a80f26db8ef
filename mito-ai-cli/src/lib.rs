//! Websocket client for the Mito AI completion service.

pub mod client;
