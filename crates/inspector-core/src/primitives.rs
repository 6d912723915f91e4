// Fixed-width scalars and text. A read must use the kind that was written;
// nothing is widened or narrowed.
use std::rc::Rc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::inspector::{Channel, Inspect, Inspector};

macro_rules! scalar {
    ($($t:ty => $read:ident, $write:ident;)*) => {
        $(
            impl Inspect for $t {
                fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
                    match insp.channel() {
                        Channel::Read(r) => *self = r.$read()?,
                        Channel::Write(w) => w.$write(*self)?,
                    }
                    Ok(())
                }
                fn differs(&self, other: &Self) -> bool {
                    self != other
                }
            }
        )*
    };
}

scalar! {
    u8 => read_u8, write_u8;
    i8 => read_i8, write_i8;
    u16 => read_u16, write_u16;
    i16 => read_i16, write_i16;
    u32 => read_u32, write_u32;
    i32 => read_i32, write_i32;
    u64 => read_u64, write_u64;
    i64 => read_i64, write_i64;
}

impl Inspect for f32 {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => *self = r.read_f32()?,
            Channel::Write(w) => w.write_f32(*self)?,
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self.to_bits() != other.to_bits()
    }
}

impl Inspect for f64 {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => *self = r.read_f64()?,
            Channel::Write(w) => w.write_f64(*self)?,
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self.to_bits() != other.to_bits()
    }
}

impl Inspect for bool {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => {
                *self = match r.read_u8()? {
                    0 => false,
                    1 => true,
                    other => return Err(Error::malformed(format!("bad bool byte {other:#x}"))),
                }
            }
            Channel::Write(w) => w.write_u8(*self as u8)?,
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

// Unicode scalar value, 4 bytes.
impl Inspect for char {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => {
                let v = r.read_u32()?;
                *self = char::from_u32(v)
                    .ok_or_else(|| Error::malformed(format!("bad char {v:#x}")))?;
            }
            Channel::Write(w) => w.write_u32(*self as u32)?,
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

impl Inspect for Decimal {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => {
                let raw = r.read_array::<16>()?;
                // flags: scale in bits 16..24, sign in bit 31, the rest zero
                let flags = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                if flags & 0x7F00_FFFF != 0 || (flags >> 16) & 0xFF > 28 {
                    return Err(Error::malformed(format!("bad decimal flags {flags:#010x}")));
                }
                *self = Decimal::deserialize(raw);
            }
            Channel::Write(w) => w.write_bytes(&self.serialize())?,
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self.serialize() != other.serialize()
    }
}

// GUID byte order: little-endian a/b/c then the 8 trailing bytes as-is.
impl Inspect for Uuid {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => *self = Uuid::from_bytes_le(r.read_array::<16>()?),
            Channel::Write(w) => w.write_bytes(&self.to_bytes_le())?,
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

impl Inspect for String {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            return insp.write_str(Some(self.as_str()));
        }
        let s = insp.read_str()?.ok_or(Error::UnexpectedNull("string"))?;
        *self = s.to_string();
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

impl Inspect for Option<String> {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            return insp.write_str(self.as_deref());
        }
        *self = insp.read_str()?.map(|s| s.to_string());
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

impl Inspect for Rc<str> {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            return insp.write_str(Some(&**self));
        }
        *self = insp.read_str()?.ok_or(Error::UnexpectedNull("string"))?;
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

impl Inspect for Option<Rc<str>> {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        insp.string(self)
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}
