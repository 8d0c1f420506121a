//! HTTP implementation of the dayloop remote-service contracts.

mod client;

pub use client::ApiClient;
