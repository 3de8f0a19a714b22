//! Fast textual codec for identifiers.
//!
//! A token is exactly 32 lowercase hexadecimal characters (the raw 16 bytes
//! of the UUID, no braces or dashes). The interpreted target embeds tokens as
//! table keys and the bridge decodes them while building instances, so both
//! directions avoid intermediate allocations.
//!
//! Decoding accepts only the canonical lowercase form. Anything else is
//! rejected rather than normalised, which keeps `decode -> encode`
//! byte-for-byte exact.

use uuid::Uuid;

use crate::id::VariableId;

/// Length of a fast token in bytes.
pub const TOKEN_LEN: usize = 32;

/// Errors produced when decoding a fast token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid token length: expected {TOKEN_LEN}, got {found}")]
    Length { found: usize },

    #[error("invalid token character {character:?} at position {position}")]
    Character { position: usize, character: char },
}

/// Encodes `id` into `buf` and returns the token as a string slice.
pub fn encode_into<'b>(id: &Uuid, buf: &'b mut [u8; TOKEN_LEN]) -> &'b str {
    id.simple().encode_lower(buf)
}

/// Encodes an identifier into its fast token.
pub fn create_string_fast_from_id(id: &Uuid) -> String {
    let mut buf = [0u8; TOKEN_LEN];
    encode_into(id, &mut buf).to_owned()
}

/// Decodes a fast token produced by [`create_string_fast_from_id`].
pub fn create_id_from_string_fast(token: &str) -> Result<Uuid, CodecError> {
    let bytes = token.as_bytes();
    if bytes.len() != TOKEN_LEN {
        return Err(CodecError::Length { found: bytes.len() });
    }

    let mut raw = [0u8; 16];
    for (i, slot) in raw.iter_mut().enumerate() {
        let hi = nibble(bytes, 2 * i)?;
        let lo = nibble(bytes, 2 * i + 1)?;
        *slot = (hi << 4) | lo;
    }
    Ok(Uuid::from_bytes(raw))
}

fn nibble(bytes: &[u8], position: usize) -> Result<u8, CodecError> {
    let c = bytes[position];
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(CodecError::Character {
            position,
            character: c as char,
        }),
    }
}

impl VariableId {
    /// Fast token for this variable, as used in emitted script text.
    pub fn to_fast_token(&self) -> String {
        create_string_fast_from_id(&self.0)
    }

    /// Parses a fast token back into a variable id.
    pub fn from_fast_token(token: &str) -> Result<Self, CodecError> {
        create_id_from_string_fast(token).map(VariableId)
    }
}
