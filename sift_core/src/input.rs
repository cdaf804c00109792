use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Anything that can be executed and scored: raw byte buffers, or textual
/// programs. Its bytes define its [`InputId`].
pub trait Input: Send + Sync + std::fmt::Debug {
    fn as_bytes(&self) -> &[u8];
}

impl Input for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Input for [u8] {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl Input for String {
    fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
}

impl Input for str {
    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid input id {0:?}: expected 32 hex characters")]
pub struct ParseInputIdError(pub String);

/// Stable identity of a test input, derived from its content.
///
/// Two inputs with identical bytes share an identity, so scores and selector
/// weights recorded for one apply to the other.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct InputId([u8; 16]);

impl InputId {
    pub fn of<I: Input + ?Sized>(input: &I) -> Self {
        Self::from_bytes(input.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        InputId(md5::compute(bytes).0)
    }

    pub fn as_array(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for InputId {
    fn from(digest: [u8; 16]) -> Self {
        InputId(digest)
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputId({self})")
    }
}

impl FromStr for InputId {
    type Err = ParseInputIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.is_ascii() {
            return Err(ParseInputIdError(s.to_string()));
        }
        let mut digest = [0u8; 16];
        for (i, byte) in digest.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseInputIdError(s.to_string()))?;
        }
        Ok(InputId(digest))
    }
}

impl From<InputId> for String {
    fn from(id: InputId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for InputId {
    type Error = ParseInputIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_bytes_share_identity() {
        let program = String::from("open /dev/null");
        let bytes: Vec<u8> = program.clone().into_bytes();
        assert_eq!(InputId::of(&program), InputId::of(&bytes));
        assert_eq!(InputId::of("open /dev/null"), InputId::of(bytes.as_slice()));
        assert_ne!(InputId::of(&program), InputId::of("open /dev/zero"));
    }

    #[test]
    fn identity_is_md5_of_content() {
        let input: Vec<u8> = b"GOOD".to_vec();
        let id = InputId::of(&input);
        assert_eq!(id.as_array(), &md5::compute(b"GOOD").0);
        assert_eq!(id, InputId::from_bytes(b"GOOD"));
        assert_ne!(id, InputId::from_bytes(b"BAD"));
    }

    #[test]
    fn identity_hex_parses_back() {
        let id = InputId::from_bytes(b"seed");
        let hex = id.to_string();
        assert_eq!(hex, format!("{:x}", md5::compute(b"seed")));
        assert_eq!(hex.parse::<InputId>(), Ok(id));
        assert!("abc".parse::<InputId>().is_err());
        assert!("zz".repeat(16).parse::<InputId>().is_err());
    }
}
