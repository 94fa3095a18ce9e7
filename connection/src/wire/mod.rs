//! Chia wire codec.
//!
//! Values are encoded against a static schema, no type tags are written. The
//! layout rules are:
//!
//! * **Integers** - fixed width, big-endian.
//! * **Bool** - a single `0x00` or `0x01` byte.
//! * **Fixed bytes** - exactly `N` raw bytes.
//! * **Bytes and strings** - `u32` length prefix followed by the raw bytes.
//! * **Optional** - a bool presence flag, followed by the value if set.
//! * **List** - `u32` item count followed by the items.
//! * **Tuples and structs** - fields concatenated in declared order.
//!
//! # Optional zero values
//!
//! Decoding trusts the presence flag. Encoding treats a present value equal to
//! its type's zero value (numeric zero, empty string, empty list) as absent, so
//! `Some(0u32)` and `None` produce the same bytes. Chia nodes expect this.
//!
//! # Example
//!
//! ```
//! use chia_peers_connection::wire::{self, WireError};
//!
//! let bytes = wire::encode(&(8444u16, String::from("mainnet")));
//! let (value, consumed) = wire::decode::<(u16, String)>(&bytes)?;
//! assert_eq!(value, (8444, String::from("mainnet")));
//! assert_eq!(consumed, bytes.len());
//! # Ok::<(), WireError>(())
//! ```

mod impls;

pub use impls::Bytes;

use std::fmt;

/// Errors raised while decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes remain than the type requires.
    BufferUnderflow { needed: usize, remaining: usize },
    /// A bool byte other than `0x00` or `0x01`.
    InvalidBool(u8),
    /// String bytes are not valid UTF-8.
    InvalidUtf8,
    /// Bytes were left over after decoding a complete value.
    TrailingBytes { remaining: usize },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::BufferUnderflow { needed, remaining } => {
                write!(
                    f,
                    "Buffer underflow: needed {needed} bytes, {remaining} remaining"
                )
            }
            WireError::InvalidBool(byte) => write!(f, "Invalid bool byte: {byte:#04x}"),
            WireError::InvalidUtf8 => write!(f, "String is not valid UTF-8"),
            WireError::TrailingBytes { remaining } => {
                write!(f, "{remaining} trailing bytes after decoded value")
            }
        }
    }
}

impl std::error::Error for WireError {}

/// Cursor over an input buffer.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(WireError::BufferUnderflow {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Consume exactly `N` bytes into an array.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

/// Types which can be written in the wire layout.
pub trait Encode {
    /// Append the encoding of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Whether the value is its type's zero value.
    ///
    /// A present optional holding a zero value is encoded as absent.
    fn is_zero_value(&self) -> bool {
        false
    }
}

/// Types which can be read from the wire layout.
pub trait Decode: Sized {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError>;
}

/// Encode a value into a fresh buffer.
pub fn encode<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

/// Decode a value from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode<T: Decode>(bytes: &[u8]) -> Result<(T, usize), WireError> {
    let mut reader = Reader::new(bytes);
    let value = T::decode(&mut reader)?;
    Ok((value, reader.position()))
}

/// Decode a value which must span all of `bytes`.
pub fn decode_exact<T: Decode>(bytes: &[u8]) -> Result<T, WireError> {
    let (value, consumed) = decode(bytes)?;
    if consumed != bytes.len() {
        return Err(WireError::TrailingBytes {
            remaining: bytes.len() - consumed,
        });
    }
    Ok(value)
}

/// Implements [`Encode`] and [`Decode`] for a struct, fields in wire order.
macro_rules! wire_struct {
    ($name:ident { $($field:ident),* $(,)? }) => {
        impl $crate::wire::Encode for $name {
            #[allow(unused_variables)]
            fn encode(&self, buf: &mut Vec<u8>) {
                $( $crate::wire::Encode::encode(&self.$field, buf); )*
            }
        }

        impl $crate::wire::Decode for $name {
            #[allow(unused_variables)]
            fn decode(
                reader: &mut $crate::wire::Reader<'_>,
            ) -> Result<Self, $crate::wire::WireError> {
                Ok($name {
                    $( $field: $crate::wire::Decode::decode(reader)?, )*
                })
            }
        }
    };
}

pub(crate) use wire_struct;
