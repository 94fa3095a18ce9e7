//! Encode and decode for the primitive and composite wire types.

use super::{Decode, Encode, Reader, WireError};

impl Encode for bool {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(*self));
    }

    fn is_zero_value(&self) -> bool {
        !*self
    }
}

impl Decode for bool {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        match reader.take_array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(WireError::InvalidBool(byte)),
        }
    }
}

macro_rules! impl_uint {
    ($($ty:ty),*) => {
        $(
            impl Encode for $ty {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_be_bytes());
                }

                fn is_zero_value(&self) -> bool {
                    *self == 0
                }
            }

            impl Decode for $ty {
                fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
                    Ok(<$ty>::from_be_bytes(reader.take_array()?))
                }
            }
        )*
    };
}

impl_uint!(u8, u16, u32, u64, u128);

impl<const N: usize> Encode for [u8; N] {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        reader.take_array()
    }
}

fn encode_length(len: usize, buf: &mut Vec<u8>) {
    // Lengths beyond u32 are not representable on the wire.
    (len as u32).encode(buf);
}

fn decode_length(reader: &mut Reader<'_>) -> Result<usize, WireError> {
    Ok(u32::decode(reader)? as usize)
}

/// Length prefixed raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl Encode for Bytes {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_length(self.0.len(), buf);
        buf.extend_from_slice(&self.0);
    }

    fn is_zero_value(&self) -> bool {
        self.0.is_empty()
    }
}

impl Decode for Bytes {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let len = decode_length(reader)?;
        Ok(Bytes(reader.take(len)?.to_vec()))
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_length(self.len(), buf);
        buf.extend_from_slice(self.as_bytes());
    }

    fn is_zero_value(&self) -> bool {
        self.is_empty()
    }
}

impl Decode for String {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let len = decode_length(reader)?;
        let bytes = reader.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Some(value) if !value.is_zero_value() => {
                true.encode(buf);
                value.encode(buf);
            }
            _ => false.encode(buf),
        }
    }

    fn is_zero_value(&self) -> bool {
        match self {
            Some(value) => value.is_zero_value(),
            None => true,
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        if bool::decode(reader)? {
            Ok(Some(T::decode(reader)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_length(self.len(), buf);
        for item in self {
            item.encode(buf);
        }
    }

    fn is_zero_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let count = decode_length(reader)?;
        // The count comes from the remote, only trust it as far as the buffer goes.
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

macro_rules! impl_tuple {
    ($($name:ident $value:ident),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode(&self, buf: &mut Vec<u8>) {
                let ($($value,)+) = self;
                $( $value.encode(buf); )+
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
                Ok(($($name::decode(reader)?,)+))
            }
        }
    };
}

impl_tuple!(A a, B b);
impl_tuple!(A a, B b, C c);
impl_tuple!(A a, B b, C c, D d);
