//! Fixed-width binary encoding of user ids on the broker.
//!
//! A message value is exactly 8 bytes: the id as a big-endian unsigned
//! 64-bit integer. No key, no envelope, no headers.

use thiserror::Error;

use userlink_core::{Error, UserId};

/// Width of an encoded user id.
pub const USER_ID_PAYLOAD_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message value is too short to convert to a user id: {len} bytes")]
    TooShort { len: usize },
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Error::malformed(value.to_string())
    }
}

pub fn encode_user_id(id: UserId) -> [u8; USER_ID_PAYLOAD_LEN] {
    (id.get() as u64).to_be_bytes()
}

/// Decode the first 8 bytes of `payload`.
///
/// Trailing bytes are ignored; anything shorter than 8 bytes is rejected.
pub fn decode_user_id(payload: &[u8]) -> Result<UserId, DecodeError> {
    let head: [u8; USER_ID_PAYLOAD_LEN] = payload
        .get(..USER_ID_PAYLOAD_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or(DecodeError::TooShort { len: payload.len() })?;

    Ok(UserId::new(u64::from_be_bytes(head) as i64))
}
