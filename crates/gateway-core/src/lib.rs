//! Gateway Core - the application's single message channel to the backend.
//!
//! Connection status, per-topic subscriptions, best-effort publish, and a
//! bounded caller-owned reconnect loop. The wire transport itself lives
//! behind the [`channel::MessageChannel`] trait.

pub mod channel;
pub mod connect;
pub mod gateway;
pub mod loopback;
pub mod model;

// Re-export commonly used types
pub use channel::{ChannelLink, MessageChannel};
pub use connect::connect_with_retry;
pub use gateway::{Gateway, Subscription};
pub use loopback::{LoopbackChannel, LoopbackRemote};
pub use model::{ConnectionStatus, Frame, RetryPolicy};
