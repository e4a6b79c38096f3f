//! 类型模块：定义请求、提示与聊天消息等核心数据类型。
//!
//! # Types Module
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Request`] | Immutable LLM request; the unit that gets fingerprinted and cached |
//! | [`Prompt`] | Borrowed view of a request handed to a backend adapter |
//! | [`Message`] | Chat message with role and text content |
//! | [`MessageRole`] | Message role (system, user, assistant) |
//!
//! ## Example
//!
//! ```rust
//! use bug_oracle::types::Request;
//!
//! let request = Request::new("openai", "gpt-4o-mini")
//!     .with_role("You classify e-commerce incidents.")
//!     .with_payload("Checkout button unresponsive on mobile");
//!
//! let prompt = request.prompt();
//! assert_eq!(prompt.messages().len(), 2);
//! ```

pub mod message;
pub mod request;

pub use message::{Message, MessageRole};
pub use request::{Prompt, Request};
