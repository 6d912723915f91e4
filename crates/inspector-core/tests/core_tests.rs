use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone};
use inspector_core::{
    DateTime, DateTimeKind, DateTimeOffset, Describe, Error, Inspect, Inspector, RectArray,
    Result, SessionOptions, TextEncoding, TimeSpan, decode, decode_value, encode, encode_value,
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn utf16() -> SessionOptions {
    SessionOptions {
        encoding: TextEncoding::Utf16Le,
        ..SessionOptions::default()
    }
}

// ---- primitives ----

#[derive(Debug, Default, PartialEq)]
struct Record {
    small: i8,
    word: u16,
    big: i64,
    ratio: f32,
    precise: f64,
    on: bool,
    letter: char,
    price: Decimal,
    id: Uuid,
    when: DateTime,
    local: DateTimeOffset,
    span: TimeSpan,
}

impl Describe for Record {
    const TYPE_NAME: &'static str = "Tests.Record";
    const LATEST_VERSION: u32 = 1;
    fn create(_: &mut Inspector<'_>, _: u32, _: bool) -> Result<Self> {
        Ok(Self::default())
    }
    fn describe(&mut self, insp: &mut Inspector<'_>, _: u32) -> Result<()> {
        insp.field(&mut self.small)?;
        insp.field(&mut self.word)?;
        insp.field(&mut self.big)?;
        insp.field(&mut self.ratio)?;
        insp.field(&mut self.precise)?;
        insp.field(&mut self.on)?;
        insp.field(&mut self.letter)?;
        insp.field(&mut self.price)?;
        insp.field(&mut self.id)?;
        insp.field(&mut self.when)?;
        insp.field(&mut self.local)?;
        insp.field(&mut self.span)
    }
}

#[test]
fn record_of_every_primitive_roundtrips() {
    let naive = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(12, 30, 5)
        .unwrap();
    let offset = FixedOffset::east_opt(2 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
        .unwrap();
    let mut r = Record {
        small: -7,
        word: 0xBEEF,
        big: i64::MIN + 1,
        ratio: 0.25,
        precise: -1.0e300,
        on: true,
        letter: 'ж',
        price: Decimal::new(123_456, 2),
        id: Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap(),
        when: DateTime::from_naive(naive, DateTimeKind::Local).unwrap(),
        local: DateTimeOffset::from_chrono(offset).unwrap(),
        span: TimeSpan::from_delta(TimeDelta::milliseconds(1500)),
    };
    let bytes = encode_value(&mut r).unwrap();
    assert_eq!(bytes.len(), 4 + 1 + 2 + 8 + 4 + 8 + 1 + 4 + 16 + 16 + 9 + 12 + 8);
    let d: Record = decode_value(&bytes).unwrap();
    assert_eq!(d, r);
    assert_eq!(d.when.kind, DateTimeKind::Local);
    assert_eq!(d.when.to_naive(), Some(naive));
    assert_eq!(d.local.offset_minutes, 120);
    assert_eq!(d.local.to_chrono(), Some(offset));
    assert_eq!(d.span.to_delta(), Some(TimeDelta::milliseconds(1500)));
}

#[test]
fn ticks_use_the_0001_epoch() {
    let y2k = NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let dt = DateTime::from_naive(y2k, DateTimeKind::Utc).unwrap();
    assert_eq!(dt.ticks, 630_822_816_000_000_000);
    let off = DateTimeOffset {
        ticks: dt.ticks,
        offset_minutes: 60,
    };
    assert_eq!(off.utc_ticks(), Some(dt.ticks - 60 * 60 * 10_000_000));
}

#[test]
fn instants_outside_tick_range_are_none() {
    assert!(DateTime::from_naive(NaiveDateTime::MAX, DateTimeKind::Utc).is_none());
    assert!(DateTime::from_naive(NaiveDateTime::MIN, DateTimeKind::Utc).is_none());
    let far = FixedOffset::east_opt(0)
        .unwrap()
        .from_utc_datetime(&NaiveDateTime::MAX);
    assert!(DateTimeOffset::from_chrono(far).is_none());

    let decoded = DateTimeOffset {
        ticks: i64::MAX,
        offset_minutes: -60,
    };
    assert_eq!(decoded.utc_ticks(), None);
    let decoded = DateTimeOffset {
        ticks: i64::MIN,
        offset_minutes: 60,
    };
    assert_eq!(decoded.utc_ticks(), None);
}

#[test]
fn guid_uses_mixed_endian_layout() {
    let mut id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
    let bytes = encode(&mut id).unwrap();
    assert_eq!(
        bytes,
        [
            0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff
        ]
    );
}

#[test]
fn bad_bool_and_date_kind_are_malformed() {
    assert!(matches!(decode::<bool>(&[2]), Err(Error::Malformed(_))));
    let mut bytes = 0i64.to_le_bytes().to_vec();
    bytes.push(9);
    assert!(matches!(decode::<DateTime>(&bytes), Err(Error::Malformed(_))));
    let surrogate = 0xD800u32.to_le_bytes();
    assert!(matches!(decode::<char>(&surrogate), Err(Error::Malformed(_))));
}

#[test]
fn truncated_stream_is_io_error() {
    let bytes = encode(&mut 42i64).unwrap();
    let err = decode::<i64>(&bytes[..5]).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn decimal_with_bad_flags_is_malformed() {
    let mut price = Decimal::new(-1_999, 3);
    let bytes = encode(&mut price).unwrap();
    assert_eq!(decode::<Decimal>(&bytes).unwrap(), price);

    let mut raw = [0u8; 16];
    raw[..4].copy_from_slice(&0x00FF_0000u32.to_le_bytes());
    raw[4] = 1;
    let err = decode::<Decimal>(&raw).unwrap_err();
    assert!(matches!(err, Error::Malformed(_)));

    raw[..4].copy_from_slice(&0x0000_0001u32.to_le_bytes());
    let err = decode::<Decimal>(&raw).unwrap_err();
    assert!(matches!(err, Error::Malformed(_)));
}

// ---- strings ----

#[test]
fn repeated_string_is_pooled() {
    let mut words = vec!["hello".to_string(); 5];
    let bytes = encode(&mut words).unwrap();
    // count, first payload, four back-references
    assert_eq!(bytes.len(), 4 + (4 + 5) + 4 * 4);
    assert_eq!(&bytes[13..17], &(-2i32).to_le_bytes());
    let back: Vec<String> = decode(&bytes).unwrap();
    assert_eq!(back, words);
}

#[test]
fn interned_strings_share_one_allocation() {
    let s: Rc<str> = Rc::from("shared");
    let mut list = vec![Some(s.clone()), Some(Rc::from("other")), Some(s)];
    let bytes = encode(&mut list).unwrap();
    let back: Vec<Option<Rc<str>>> = decode(&bytes).unwrap();
    let a = back[0].as_ref().unwrap();
    let c = back[2].as_ref().unwrap();
    assert!(Rc::ptr_eq(a, c));
    assert_eq!(&**back[1].as_ref().unwrap(), "other");
}

#[test]
fn empty_string_differs_from_null() {
    let mut list = vec![Some(String::new()), None, Some(String::new())];
    let bytes = encode(&mut list).unwrap();
    // count, empty payload, null, back-reference
    assert_eq!(bytes.len(), 16);
    let back: Vec<Option<String>> = decode(&bytes).unwrap();
    assert_eq!(back, list);
}

#[test]
fn null_in_plain_string_slot_fails() {
    let bytes = encode(&mut None::<String>).unwrap();
    let err = decode::<String>(&bytes).unwrap_err();
    assert!(matches!(err, Error::UnexpectedNull("string")));
}

#[test]
fn unknown_string_back_reference_fails() {
    let bytes = (-2i32).to_le_bytes();
    let err = decode::<Option<String>>(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::UnknownBackReference {
            table: "string",
            index: 0
        }
    ));
}

#[test]
fn utf16_strings_roundtrip() {
    let mut s = "héllo wörld".to_string();
    let mut buf = Vec::new();
    let mut insp = Inspector::writer(&mut buf, utf16());
    insp.field(&mut s).unwrap();
    insp.finish().unwrap();
    assert_eq!(&buf[..4], &22i32.to_le_bytes());

    let mut back = String::new();
    let mut insp = Inspector::reader(buf.as_slice(), utf16());
    insp.field(&mut back).unwrap();
    assert_eq!(back, s);

    // 0xE9 0x00 is not valid UTF-8
    assert!(decode::<String>(&buf).is_err());
}

#[test]
fn string_longer_than_limit_is_rejected() {
    let bytes = encode(&mut "0123456789".to_string()).unwrap();
    let opts = SessionOptions {
        max_length: 4,
        ..SessionOptions::default()
    };
    let mut back = String::new();
    let mut insp = Inspector::reader(bytes.as_slice(), opts);
    assert!(matches!(insp.field(&mut back), Err(Error::Malformed(_))));
}

#[test]
fn string_shorter_than_its_header_is_io_error() {
    let mut bytes = 1_000_000i32.to_le_bytes().to_vec();
    bytes.extend_from_slice(b"abc");
    let err = decode::<String>(&bytes).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

// ---- nullable values ----

#[derive(Debug, Default, PartialEq)]
struct Spot {
    x: i32,
}

impl Describe for Spot {
    const TYPE_NAME: &'static str = "Tests.Spot";
    const LATEST_VERSION: u32 = 1;
    fn create(_: &mut Inspector<'_>, _: u32, _: bool) -> Result<Self> {
        Ok(Self::default())
    }
    fn describe(&mut self, insp: &mut Inspector<'_>, _: u32) -> Result<()> {
        insp.field(&mut self.x)
    }
}

fn words(vals: &[i32]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[test]
fn nullable_value_keeps_null_and_payload() {
    let mut buf = Vec::new();
    let mut insp = Inspector::writer(&mut buf, SessionOptions::default());
    let mut empty: Option<Spot> = None;
    let mut full = Some(Spot { x: 5 });
    insp.nullable(&mut empty).unwrap();
    insp.nullable(&mut full).unwrap();
    insp.finish().unwrap();
    assert_eq!(buf[..4], (-1i32).to_le_bytes());
    // null, then version 1 and the field
    assert_eq!(buf, words(&[-1, 1, 5]));

    let mut a = Some(Spot { x: 9 });
    let mut b = None;
    let mut insp = Inspector::reader(buf.as_slice(), SessionOptions::default());
    insp.nullable(&mut a).unwrap();
    insp.nullable(&mut b).unwrap();
    assert_eq!(a, None);
    assert_eq!(b, Some(Spot { x: 5 }));
}

#[test]
fn back_reference_in_nullable_slot_is_malformed() {
    let bytes = words(&[-2]);
    let mut slot: Option<Spot> = None;
    let mut insp = Inspector::reader(bytes.as_slice(), SessionOptions::default());
    assert!(matches!(insp.nullable(&mut slot), Err(Error::Malformed(_))));
}

// ---- collections ----

#[test]
fn maps_and_nested_sequences_roundtrip() {
    let mut ordered: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    ordered.insert("a".into(), vec![1, 2, 3]);
    ordered.insert("b".into(), vec![]);
    let bytes = encode(&mut ordered).unwrap();
    assert_eq!(decode::<BTreeMap<String, Vec<u32>>>(&bytes).unwrap(), ordered);

    let mut hashed: HashMap<i32, Option<String>> = HashMap::new();
    hashed.insert(1, Some("one".into()));
    hashed.insert(-1, None);
    let bytes = encode(&mut hashed).unwrap();
    assert_eq!(decode::<HashMap<i32, Option<String>>>(&bytes).unwrap(), hashed);
}

#[test]
fn optional_sequence_keeps_null() {
    let mut none: Option<Vec<i16>> = None;
    let bytes = encode(&mut none).unwrap();
    assert_eq!(bytes, (-1i32).to_le_bytes());
    assert_eq!(decode::<Option<Vec<i16>>>(&bytes).unwrap(), None);
    assert!(matches!(
        decode::<Vec<i16>>(&bytes),
        Err(Error::UnexpectedNull("sequence"))
    ));

    let mut empty: Option<Vec<i16>> = Some(vec![]);
    let bytes = encode(&mut empty).unwrap();
    assert_eq!(decode::<Option<Vec<i16>>>(&bytes).unwrap(), Some(vec![]));
}

// ---- arrays ----

#[test]
fn rect_array_3x4_keeps_shape_and_order() {
    let mut grid = RectArray::from_vec([3, 4], (0..12).collect::<Vec<i32>>()).unwrap();
    let bytes = encode(&mut grid).unwrap();
    assert_eq!(bytes.len(), 2 * 4 + 12 * 4);
    assert_eq!(&bytes[..8], &[3, 0, 0, 0, 4, 0, 0, 0]);
    let back: RectArray<i32, 2> = decode(&bytes).unwrap();
    assert_eq!(back.dims(), [3, 4]);
    assert_eq!(back.get([1, 2]), Some(&6));
    assert_eq!(back.get([2, 3]), Some(&11));
    assert_eq!(back.get([3, 0]), None);
    assert_eq!(back, grid);
}

#[test]
fn rect_array_with_zero_dimension() {
    let mut empty: RectArray<u64, 3> = RectArray::from_vec([2, 0, 5], vec![]).unwrap();
    let bytes = encode(&mut empty).unwrap();
    assert_eq!(bytes.len(), 12);
    let back: RectArray<u64, 3> = decode(&bytes).unwrap();
    assert_eq!(back.dims(), [2, 0, 5]);
    assert!(back.is_empty());
}

#[test]
fn mismatched_rect_array_is_rejected() {
    assert!(RectArray::from_vec([2, 2], vec![1u8, 2, 3]).is_err());
}

// Records the array level each element was visited at.
#[derive(Debug, Default, Clone, PartialEq)]
struct Level(u8);

impl Inspect for Level {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        let mut level = insp.array_level() as u8;
        insp.field(&mut level)?;
        self.0 = level;
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

#[test]
fn array_passes_descend_once_per_dimension() {
    let mut cube = RectArray::new([2, 2, 2], Level::default());
    let bytes = encode(&mut cube).unwrap();
    let back: RectArray<Level, 3> = decode(&bytes).unwrap();
    assert!(back.iter().all(|l| l.0 == 3));
    assert_eq!(back.len(), 8);
}

#[derive(Debug, Default, PartialEq)]
struct Bitmap {
    pixels: RectArray<u8, 2>,
}

impl Describe for Bitmap {
    const TYPE_NAME: &'static str = "Tests.Bitmap";
    const LATEST_VERSION: u32 = 1;
    fn create(_: &mut Inspector<'_>, _: u32, _: bool) -> Result<Self> {
        Ok(Self::default())
    }
    fn describe(&mut self, insp: &mut Inspector<'_>, _: u32) -> Result<()> {
        insp.byte_array(&mut self.pixels)
    }
}

#[test]
fn byte_array_uses_raw_block() {
    let raw: Vec<u8> = (0..6).map(|i| i * 40).collect();
    let mut bmp = Bitmap {
        pixels: RectArray::from_vec([2, 3], raw.clone()).unwrap(),
    };
    let bytes = encode_value(&mut bmp).unwrap();
    assert_eq!(bytes.len(), 4 + 8 + 6);
    assert_eq!(&bytes[12..], raw.as_slice());
    let back: Bitmap = decode_value(&bytes).unwrap();
    assert_eq!(back, bmp);
}

#[test]
fn byte_block_roundtrips() {
    let mut blob = vec![0u8, 255, 7, 7, 1];
    let mut buf = Vec::new();
    let mut insp = Inspector::writer(&mut buf, SessionOptions::default());
    insp.bytes(&mut blob).unwrap();
    insp.finish().unwrap();
    assert_eq!(buf.len(), 4 + 5);

    let mut back = Vec::new();
    let mut insp = Inspector::reader(buf.as_slice(), SessionOptions::default());
    insp.bytes(&mut back).unwrap();
    assert_eq!(back, blob);
}

// ---- properties ----

#[derive(Default)]
struct Gauge {
    value: i32,
    changes: Vec<i32>,
}

impl Describe for Gauge {
    const TYPE_NAME: &'static str = "Tests.Gauge";
    const LATEST_VERSION: u32 = 1;
    fn create(_: &mut Inspector<'_>, _: u32, _: bool) -> Result<Self> {
        Ok(Self {
            value: 7,
            changes: Vec::new(),
        })
    }
    fn describe(&mut self, insp: &mut Inspector<'_>, _: u32) -> Result<()> {
        let mut seen = None;
        insp.property(self.value, |v| seen = Some(v))?;
        if let Some(v) = seen {
            self.value = v;
            self.changes.push(v);
        }
        Ok(())
    }
}

#[test]
fn property_callback_fires_only_on_change() {
    let mut same = Gauge {
        value: 7,
        changes: Vec::new(),
    };
    let bytes = encode_value(&mut same).unwrap();
    assert!(same.changes.is_empty());
    let back: Gauge = decode_value(&bytes).unwrap();
    assert_eq!(back.value, 7);
    assert!(back.changes.is_empty());

    let mut moved = Gauge {
        value: 9,
        changes: Vec::new(),
    };
    let bytes = encode_value(&mut moved).unwrap();
    assert!(moved.changes.is_empty());
    let back: Gauge = decode_value(&bytes).unwrap();
    assert_eq!(back.value, 9);
    assert_eq!(back.changes, vec![9]);
}

// ---- JSON bridge ----

#[test]
fn json_document_roundtrips() {
    let doc = serde_json::json!({
        "name": "inspector",
        "tags": ["a", "b", "a"],
        "n": -5,
        "big": u64::MAX,
        "pi": 3.5,
        "none": null,
        "nested": { "ok": true, "list": [[], {}] }
    });
    let (bytes, stats) = inspector_core::encode_json(&doc, SessionOptions::default()).unwrap();
    assert_eq!(stats.bytes, bytes.len() as u64);
    // 9 keys plus "inspector", "a", "b"
    assert_eq!(stats.strings, 12);
    let back = inspector_core::decode_json(&bytes, SessionOptions::default()).unwrap();
    assert_eq!(back, doc);
    assert!(back["big"].is_u64());
    assert!(back["n"].is_i64());
}

#[test]
fn json_file_roundtrip_utf16() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("doc.bin");
    let doc = serde_json::json!({ "greeting": "héllo", "items": [1, 2.5, "x"] });
    let stats = inspector_core::write_json_stream(&p, &doc, utf16()).unwrap();
    assert_eq!(std::fs::metadata(&p).unwrap().len(), stats.bytes);
    let back = inspector_core::read_json_stream(&p, utf16()).unwrap();
    assert_eq!(back, doc);
}

#[test]
fn deep_json_hits_depth_limit() {
    let mut doc = serde_json::json!(0);
    for _ in 0..10 {
        doc = serde_json::json!([doc]);
    }
    let (bytes, _) = inspector_core::encode_json(&doc, SessionOptions::default()).unwrap();
    let shallow = SessionOptions {
        max_depth: 4,
        ..SessionOptions::default()
    };
    let err = inspector_core::decode_json(&bytes, shallow).unwrap_err();
    assert!(matches!(err, Error::Malformed(_)));
}

#[test]
fn unknown_json_kind_is_malformed() {
    let mut bytes = 1i32.to_le_bytes().to_vec();
    bytes.push(42);
    let err = inspector_core::decode_json(&bytes, SessionOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Malformed(_)));
}
