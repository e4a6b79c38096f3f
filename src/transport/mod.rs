//! 传输层：后端 HTTP 调用。
//!
//! HTTP transport shared by every remote backend adapter.

pub mod http;

pub use http::{HttpFailure, HttpTransport};
