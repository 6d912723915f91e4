//! inspector-core: versioned binary object-graph codec
//!
//! One description per type drives both directions:
//! - `Describe` impls list a type's fields once; the `Inspector` engine
//!   encodes or decodes them depending on the session
//! - Shared references and cycles keep their identity (back-references)
//! - Strings are pooled per stream
//! - Every payload carries its type's version, so newer code reads older data
//! - Polymorphic slots carry a type name unless the declared base is stored
//! - JSON bridge used by the CLI
//!
pub mod array;
pub mod collections;
pub mod error;
pub mod inspector;
pub mod json;
pub mod primitives;
pub mod registry;
pub mod stream;
pub mod time;

mod ancestors;
mod objects;
mod strings;

pub use array::RectArray;
pub use error::{Error, Result};
pub use inspector::{Inspect, Inspector, SessionOptions, SessionStats};
pub use json::{JsonDocument, decode_json, encode_json, read_json_stream, write_json_stream};
pub use registry::{Describe, Handler, Inspectable, Registry, TypeHandler};
pub use stream::TextEncoding;
pub use time::{DateTime, DateTimeKind, DateTimeOffset, TimeSpan};

/// Writes one root field with default options and the global registry.
pub fn encode<T: Inspect>(root: &mut T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut insp = Inspector::writer(&mut buf, SessionOptions::default());
    insp.field(root)?;
    insp.finish()?;
    Ok(buf)
}

pub fn decode<T: Inspect + Default>(bytes: &[u8]) -> Result<T> {
    let mut root = T::default();
    let mut insp = Inspector::reader(bytes, SessionOptions::default());
    insp.field(&mut root)?;
    Ok(root)
}

/// Writes a versioned value type as the root.
pub fn encode_value<T: Describe>(root: &mut T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut insp = Inspector::writer(&mut buf, SessionOptions::default());
    insp.value(root)?;
    insp.finish()?;
    Ok(buf)
}

pub fn decode_value<T: Describe>(bytes: &[u8]) -> Result<T> {
    let mut insp = Inspector::reader(bytes, SessionOptions::default());
    insp.read_value()
}
