//! Subscriber side of the chat.

pub mod api;
pub mod connection;
pub mod session;
pub mod view;

pub use api::{websocket_url, ApiError, MessagesApi};
pub use connection::{Connection, Lifecycle, Subscription, TransportError};
pub use view::{ChatView, Draft, SubscriptionState, Transition};
