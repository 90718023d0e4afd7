//! Network layer: the chat server client and the request interceptor.

pub mod api_types;
pub mod client;
pub mod intercept;
