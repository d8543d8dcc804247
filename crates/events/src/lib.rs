//! Broker abstraction and the user-id wire format.

pub mod broker;
pub mod codec;
pub mod in_memory_broker;

pub use broker::{Broker, BrokerError, Message, MessageSource, Subscription};
pub use codec::{DecodeError, USER_ID_PAYLOAD_LEN, decode_user_id, encode_user_id};
pub use in_memory_broker::InMemoryBroker;
