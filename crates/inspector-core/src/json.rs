//! JSON bridge: `serde_json::Value` as a field kind, and a versioned
//! document wrapper used by the CLI.
//!
//! Layout of one value: a kind byte, then
//! - `0` null, nothing follows
//! - `1` bool, one byte
//! - `2` / `3` / `4` number as i64 / u64 / f64
//! - `5` string, pooled
//! - `6` array, count then values
//! - `7` object, count then pooled key and value per member
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::inspector::{Inspect, Inspector, SessionOptions, SessionStats};
use crate::registry::Describe;

const NULL: u8 = 0;
const BOOL: u8 = 1;
const INT: u8 = 2;
const UINT: u8 = 3;
const FLOAT: u8 = 4;
const STRING: u8 = 5;
const ARRAY: u8 = 6;
const OBJECT: u8 = 7;

fn kind_of(v: &Value) -> u8 {
    match v {
        Value::Null => NULL,
        Value::Bool(_) => BOOL,
        Value::Number(n) if n.is_i64() => INT,
        Value::Number(n) if n.is_u64() => UINT,
        Value::Number(_) => FLOAT,
        Value::String(_) => STRING,
        Value::Array(_) => ARRAY,
        Value::Object(_) => OBJECT,
    }
}

fn write_json(insp: &mut Inspector<'_>, v: &Value) -> Result<()> {
    let mut kind = kind_of(v);
    insp.field(&mut kind)?;
    match v {
        Value::Null => Ok(()),
        Value::Bool(b) => insp.field(&mut { *b }),
        Value::Number(n) => match kind {
            INT => insp.field(&mut n.as_i64().unwrap_or_default()),
            UINT => insp.field(&mut n.as_u64().unwrap_or_default()),
            _ => insp.field(&mut n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => insp.write_str(Some(s.as_str())),
        Value::Array(items) => insp.nest("json array", |insp| {
            insp.write_len(items.len())?;
            items.iter().try_for_each(|item| write_json(insp, item))
        }),
        Value::Object(members) => insp.nest("json object", |insp| {
            insp.write_len(members.len())?;
            for (k, item) in members {
                insp.write_str(Some(k.as_str()))?;
                write_json(insp, item)?;
            }
            Ok(())
        }),
    }
}

fn read_json(insp: &mut Inspector<'_>) -> Result<Value> {
    let mut kind = 0u8;
    insp.field(&mut kind)?;
    let v = match kind {
        NULL => Value::Null,
        BOOL => {
            let mut b = false;
            insp.field(&mut b)?;
            Value::Bool(b)
        }
        INT => {
            let mut n = 0i64;
            insp.field(&mut n)?;
            Value::from(n)
        }
        UINT => {
            let mut n = 0u64;
            insp.field(&mut n)?;
            Value::from(n)
        }
        FLOAT => {
            let mut f = 0f64;
            insp.field(&mut f)?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| Error::malformed(format!("non-finite json number {f}")))?
        }
        STRING => {
            let s = insp.read_str()?.ok_or(Error::UnexpectedNull("json string"))?;
            Value::String(s.to_string())
        }
        ARRAY => insp.nest("json array", |insp| {
            let len = insp.read_len("json array")?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(read_json(insp)?);
            }
            Ok(Value::Array(items))
        })?,
        OBJECT => insp.nest("json object", |insp| {
            let len = insp.read_len("json object")?;
            let mut members = Map::new();
            for _ in 0..len {
                let key = insp.read_str()?.ok_or(Error::UnexpectedNull("json key"))?;
                let item = read_json(insp)?;
                members.insert(key.to_string(), item);
            }
            Ok(Value::Object(members))
        })?,
        other => return Err(Error::malformed(format!("bad json kind {other}"))),
    };
    Ok(v)
}

impl Inspect for Value {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            return write_json(insp, self);
        }
        *self = read_json(insp)?;
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

/// A JSON root stored as a versioned value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDocument {
    pub root: Value,
}

impl Describe for JsonDocument {
    const TYPE_NAME: &'static str = "Inspector.JsonDocument";
    const LATEST_VERSION: u32 = 1;

    fn create(_insp: &mut Inspector<'_>, _version: u32, _is_latest: bool) -> Result<Self> {
        Ok(Self::default())
    }

    fn describe(&mut self, insp: &mut Inspector<'_>, _version: u32) -> Result<()> {
        insp.field(&mut self.root)
    }
}

pub fn encode_json(root: &Value, options: SessionOptions) -> Result<(Vec<u8>, SessionStats)> {
    let mut doc = JsonDocument { root: root.clone() };
    let mut buf = Vec::new();
    let mut insp = Inspector::writer(&mut buf, options);
    insp.value(&mut doc)?;
    let stats = insp.finish()?;
    Ok((buf, stats))
}

pub fn decode_json(bytes: &[u8], options: SessionOptions) -> Result<Value> {
    let mut doc = JsonDocument::default();
    let mut insp = Inspector::reader(bytes, options);
    insp.value(&mut doc)?;
    insp.finish()?;
    Ok(doc.root)
}

pub fn write_json_stream(path: &Path, root: &Value, options: SessionOptions) -> Result<SessionStats> {
    let mut doc = JsonDocument { root: root.clone() };
    let file = BufWriter::new(File::create(path)?);
    let mut insp = Inspector::writer(file, options);
    insp.value(&mut doc)?;
    insp.finish()
}

pub fn read_json_stream(path: &Path, options: SessionOptions) -> Result<Value> {
    let mut doc = JsonDocument::default();
    let file = BufReader::new(File::open(path)?);
    let mut insp = Inspector::reader(file, options);
    insp.value(&mut doc)?;
    Ok(doc.root)
}
