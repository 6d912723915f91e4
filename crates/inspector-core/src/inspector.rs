//! The traversal engine.
//!
//! One [`Inspector`] is one session: a single read or a single write of an
//! object graph. User types describe their fields once (see
//! [`Describe`]) and the same calls encode or decode depending on the
//! session's direction.
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, trace};

use crate::ancestors::AncestorStack;
use crate::error::{Error, Result};
use crate::objects::{EXPLICIT_TYPE, Lead, NULL, ObjectTable, back_ref};
use crate::registry::{Describe, Handler, Inspectable, Registry};
use crate::stream::{ByteReader, ByteWriter, TextEncoding};
use crate::strings::StringTable;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub encoding: TextEncoding,
    /// Deepest allowed nesting of objects and values.
    pub max_depth: usize,
    /// Largest string, byte block or sequence accepted on read.
    pub max_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            max_depth: 512,
            max_length: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes: u64,
    pub strings: usize,
    pub objects: usize,
}

pub(crate) enum Channel<'a> {
    Read(ByteReader<'a>),
    Write(ByteWriter<'a>),
}

/// A field kind the engine can move in both directions.
///
/// `inspect` writes `self` on a write session and overwrites it on a read
/// session. `differs` backs [`Inspector::property`]; shared references
/// compare by identity.
pub trait Inspect {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()>;
    fn differs(&self, other: &Self) -> bool;
}

pub struct Inspector<'a> {
    channel: Channel<'a>,
    options: SessionOptions,
    registry: &'a Registry,
    strings: StringTable,
    objects: ObjectTable,
    types: HashMap<Rc<str>, Arc<dyn Handler>>,
    ancestors: AncestorStack,
    depth: usize,
    array_level: usize,
}

impl<'a> Inspector<'a> {
    /// Pass `&mut stream` to leave the stream open after the session, or the
    /// stream itself to have it dropped with the session.
    pub fn reader(stream: impl Read + 'a, options: SessionOptions) -> Self {
        debug!("read session start ({:?})", options.encoding);
        Self::with_channel(Channel::Read(ByteReader::new(stream)), options)
    }

    pub fn writer(stream: impl Write + 'a, options: SessionOptions) -> Self {
        debug!("write session start ({:?})", options.encoding);
        Self::with_channel(Channel::Write(ByteWriter::new(stream)), options)
    }

    fn with_channel(channel: Channel<'a>, options: SessionOptions) -> Self {
        Self {
            channel,
            options,
            registry: Registry::global(),
            strings: StringTable::default(),
            objects: ObjectTable::default(),
            types: HashMap::new(),
            ancestors: AncestorStack::default(),
            depth: 0,
            array_level: 0,
        }
    }

    pub fn with_registry(mut self, registry: &'a Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.channel, Channel::Read(_))
    }

    pub fn is_writing(&self) -> bool {
        matches!(self.channel, Channel::Write(_))
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn stats(&self) -> SessionStats {
        let bytes = match &self.channel {
            Channel::Read(r) => r.pos(),
            Channel::Write(w) => w.written(),
        };
        SessionStats {
            bytes,
            strings: self.strings.len(),
            objects: self.objects.len(),
        }
    }

    /// Flushes a writer and ends the session.
    pub fn finish(mut self) -> Result<SessionStats> {
        if let Channel::Write(w) = &mut self.channel {
            w.flush()?;
        }
        let stats = self.stats();
        debug!(
            "session done: {} bytes, {} strings, {} objects",
            stats.bytes, stats.strings, stats.objects
        );
        Ok(stats)
    }

    pub(crate) fn channel(&mut self) -> &mut Channel<'a> {
        &mut self.channel
    }

    // ---- generic field operations ----

    pub fn field<T: Inspect>(&mut self, slot: &mut T) -> Result<()> {
        slot.inspect(self)
    }

    /// Moves `old`; on read, `on_change` receives the decoded value only if
    /// it differs from `old`. Never called on write.
    pub fn property<T, F>(&mut self, old: T, on_change: F) -> Result<()>
    where
        T: Inspect + Clone,
        F: FnOnce(T),
    {
        if self.is_writing() {
            let mut v = old;
            return v.inspect(self);
        }
        let mut v = old.clone();
        v.inspect(self)?;
        if v.differs(&old) {
            on_change(v);
        }
        Ok(())
    }

    // ---- framing integers ----

    pub(crate) fn read_lead(&mut self) -> Result<Lead> {
        match &mut self.channel {
            Channel::Read(r) => Ok(Lead::classify(r.read_i32()?)),
            Channel::Write(_) => Err(Error::malformed("read on a write session")),
        }
    }

    pub(crate) fn write_tag(&mut self, v: i32) -> Result<()> {
        match &mut self.channel {
            Channel::Write(w) => w.write_i32(v),
            Channel::Read(_) => Err(Error::malformed("write on a read session")),
        }
    }

    pub(crate) fn read_len(&mut self, what: &str) -> Result<usize> {
        match self.read_lead()? {
            Lead::Fresh(n) => self.check_len(n as usize, what),
            other => Err(Error::malformed(format!("bad {what} length {other:?}"))),
        }
    }

    pub(crate) fn write_len(&mut self, len: usize) -> Result<()> {
        let v = i32::try_from(len)
            .map_err(|_| Error::malformed(format!("length {len} does not fit the stream")))?;
        self.write_tag(v)
    }

    pub(crate) fn check_len(&self, len: usize, what: &str) -> Result<usize> {
        if len > self.options.max_length {
            return Err(Error::malformed(format!(
                "{what} length {len} exceeds limit {}",
                self.options.max_length
            )));
        }
        Ok(len)
    }

    fn enter(&mut self, type_name: &'static str) -> Result<()> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(Error::malformed(format!(
                "nesting deeper than {} at {type_name}",
                self.options.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn nest<R>(
        &mut self,
        what: &'static str,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.enter(what)?;
        let r = f(self);
        self.leave();
        r
    }

    // ---- strings ----

    pub(crate) fn write_str(&mut self, s: Option<&str>) -> Result<()> {
        let Some(s) = s else {
            return self.write_tag(NULL);
        };
        if let Some(i) = self.strings.lookup(s) {
            return self.write_tag(back_ref(i)?);
        }
        self.strings.pool(Rc::from(s));
        let encoding = self.options.encoding;
        let bytes = encoding.encode(s);
        self.write_len(bytes.len())?;
        match &mut self.channel {
            Channel::Write(w) => w.write_bytes(&bytes),
            Channel::Read(_) => Err(Error::malformed("write on a read session")),
        }
    }

    pub(crate) fn read_str(&mut self) -> Result<Option<Rc<str>>> {
        match self.read_lead()? {
            Lead::Null => Ok(None),
            Lead::BackRef(i) => self.strings.get(i).map(Some),
            Lead::Fresh(len) => {
                let len = self.check_len(len as usize, "string")?;
                let bytes = match &mut self.channel {
                    Channel::Read(r) => r.read_vec(len)?,
                    Channel::Write(_) => return Err(Error::malformed("read on a write session")),
                };
                let s: Rc<str> = self.options.encoding.decode(bytes)?.into();
                self.strings.push(s.clone());
                Ok(Some(s))
            }
        }
    }

    /// Interned string slot; a read returns the pooled `Rc` for repeats.
    pub fn string(&mut self, slot: &mut Option<Rc<str>>) -> Result<()> {
        if self.is_writing() {
            return self.write_str(slot.as_deref());
        }
        *slot = self.read_str()?;
        Ok(())
    }

    // ---- value types ----

    fn read_version(&mut self, type_name: &'static str, word: u32, latest: u32) -> Result<u32> {
        if word & EXPLICIT_TYPE != 0 {
            return Err(Error::malformed(format!(
                "type tag in a statically typed {type_name} slot"
            )));
        }
        check_version(type_name, word, latest)
    }

    pub(crate) fn read_value<T: Describe>(&mut self) -> Result<T> {
        let word = match self.read_lead()? {
            Lead::Fresh(w) => w,
            other => {
                return Err(Error::malformed(format!(
                    "expected {} version, found {other:?}",
                    T::TYPE_NAME
                )));
            }
        };
        self.read_value_body(word)
    }

    fn read_value_body<T: Describe>(&mut self, word: u32) -> Result<T> {
        let version = self.read_version(T::TYPE_NAME, word, T::LATEST_VERSION)?;
        self.nest(T::TYPE_NAME, |insp| {
            let mut v = T::create(insp, version, version == T::LATEST_VERSION)?;
            v.describe(insp, version)?;
            Ok(v)
        })
    }

    pub(crate) fn write_value<T: Describe>(&mut self, v: &mut T) -> Result<()> {
        self.write_tag(version_word(T::LATEST_VERSION)?)?;
        self.nest(T::TYPE_NAME, |insp| v.describe(insp, T::LATEST_VERSION))
    }

    /// Inline value: a version tag then the fields, never deduplicated.
    pub fn value<T: Describe>(&mut self, slot: &mut T) -> Result<()> {
        if self.is_writing() {
            return self.write_value(slot);
        }
        *slot = self.read_value()?;
        Ok(())
    }

    pub fn nullable<T: Describe>(&mut self, slot: &mut Option<T>) -> Result<()> {
        if self.is_writing() {
            return match slot {
                None => self.write_tag(NULL),
                Some(v) => self.write_value(v),
            };
        }
        *slot = match self.read_lead()? {
            Lead::Null => None,
            Lead::Fresh(word) => Some(self.read_value_body(word)?),
            Lead::BackRef(i) => {
                return Err(Error::malformed(format!(
                    "back-reference {i} in a {} value slot",
                    T::TYPE_NAME
                )));
            }
        };
        Ok(())
    }

    pub fn values<T: Describe>(&mut self, slot: &mut Vec<T>) -> Result<()> {
        if self.is_writing() {
            self.write_len(slot.len())?;
            for v in slot.iter_mut() {
                self.write_value(v)?;
            }
            return Ok(());
        }
        let len = self.read_len("sequence")?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(self.read_value()?);
        }
        *slot = out;
        Ok(())
    }

    // ---- shared references ----

    pub fn object<T: Describe>(&mut self, slot: &mut Option<Rc<RefCell<T>>>) -> Result<()> {
        if self.is_writing() {
            return self.write_object(slot.as_ref());
        }
        *slot = self.read_object()?;
        Ok(())
    }

    fn write_object<T: Describe>(&mut self, slot: Option<&Rc<RefCell<T>>>) -> Result<()> {
        let Some(rc) = slot else {
            return self.write_tag(NULL);
        };
        let addr = Rc::as_ptr(rc) as *const () as usize;
        if let Some(i) = self.objects.find(addr) {
            trace!("{} back-reference #{i}", T::TYPE_NAME);
            return self.write_tag(back_ref(i)?);
        }
        let i = self.objects.assign(addr, Box::new(rc.clone()));
        trace!("{} registered as #{i}", T::TYPE_NAME);
        self.write_tag(version_word(T::LATEST_VERSION)?)?;
        self.ancestors.push_concrete(T::TYPE_NAME, rc);
        let res = self.nest(T::TYPE_NAME, |insp| {
            let mut v = rc
                .try_borrow_mut()
                .map_err(|_| Error::ObjectBusy(T::TYPE_NAME))?;
            v.describe(insp, T::LATEST_VERSION)
        });
        self.ancestors.pop();
        res
    }

    fn read_object<T: Describe>(&mut self) -> Result<Option<Rc<RefCell<T>>>> {
        let word = match self.read_lead()? {
            Lead::Null => return Ok(None),
            Lead::BackRef(i) => {
                let slot = self.objects.get(i)?;
                let found = slot.type_name;
                return slot
                    .obj
                    .clone()
                    .downcast::<RefCell<T>>()
                    .map(Some)
                    .map_err(|_| Error::TypeMismatch {
                        expected: T::TYPE_NAME,
                        found: found.to_string(),
                    });
            }
            Lead::Fresh(word) => word,
        };
        let version = self.read_version(T::TYPE_NAME, word, T::LATEST_VERSION)?;
        let rc = self.nest(T::TYPE_NAME, |insp| {
            let value = T::create(insp, version, version == T::LATEST_VERSION)?;
            let rc = Rc::new(RefCell::new(value));
            let i = insp.objects.register(rc.clone(), T::TYPE_NAME);
            trace!("{} materialised as #{i} (v{version})", T::TYPE_NAME);
            insp.ancestors.push_concrete(T::TYPE_NAME, &rc);
            let res = rc
                .try_borrow_mut()
                .map_err(|_| Error::ObjectBusy(T::TYPE_NAME))
                .and_then(|mut v| v.describe(insp, version));
            insp.ancestors.pop();
            res.map(|_| rc)
        })?;
        Ok(Some(rc))
    }

    pub fn objects<T: Describe>(&mut self, slot: &mut Vec<Option<Rc<RefCell<T>>>>) -> Result<()> {
        slot.inspect(self)
    }

    // ---- polymorphic references ----

    /// Slot whose runtime type may be any member registered for family `F`.
    pub fn polymorphic<F>(&mut self, slot: &mut Option<Rc<RefCell<F>>>) -> Result<()>
    where
        F: ?Sized + Inspectable,
    {
        if self.is_writing() {
            return self.write_polymorphic(slot.as_ref());
        }
        *slot = self.read_polymorphic()?;
        Ok(())
    }

    pub fn polymorphic_seq<F>(&mut self, slot: &mut Vec<Option<Rc<RefCell<F>>>>) -> Result<()>
    where
        F: ?Sized + Inspectable,
    {
        if self.is_writing() {
            self.write_len(slot.len())?;
            for item in slot.iter() {
                self.write_polymorphic(item.as_ref())?;
            }
            return Ok(());
        }
        let len = self.read_len("sequence")?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(self.read_polymorphic()?);
        }
        *slot = out;
        Ok(())
    }

    fn write_polymorphic<F>(&mut self, slot: Option<&Rc<RefCell<F>>>) -> Result<()>
    where
        F: ?Sized + Inspectable,
    {
        let Some(rc) = slot else {
            return self.write_tag(NULL);
        };
        let addr = Rc::as_ptr(rc) as *const () as usize;
        if let Some(i) = self.objects.find(addr) {
            return self.write_tag(back_ref(i)?);
        }
        let name = rc
            .try_borrow()
            .map_err(|_| Error::ObjectBusy(std::any::type_name::<F>()))?
            .type_name();
        let handler = self.registry.resolve(name)?;
        let i = self.objects.assign(addr, Box::new(rc.clone()));
        let version = handler.latest_version();
        if self.registry.declared_base::<F>() == Some(name) {
            trace!("{name} registered as #{i} (declared type)");
            self.write_tag(version_word(version)?)?;
        } else {
            trace!("{name} registered as #{i} (explicit type)");
            self.write_tag(version_word(version)? | EXPLICIT_TYPE as i32)?;
            self.write_str(Some(name))?;
        }
        self.ancestors.push_view(name, rc);
        let res = self.nest(name, |insp| {
            let mut v = rc.try_borrow_mut().map_err(|_| Error::ObjectBusy(name))?;
            handler.describe(insp, v.as_any_mut(), version)
        });
        self.ancestors.pop();
        res
    }

    fn read_polymorphic<F>(&mut self) -> Result<Option<Rc<RefCell<F>>>>
    where
        F: ?Sized + Inspectable,
    {
        let word = match self.read_lead()? {
            Lead::Null => return Ok(None),
            Lead::BackRef(i) => {
                let slot = self.objects.get(i)?;
                let (obj, found) = (slot.obj.clone(), slot.type_name);
                return self
                    .registry
                    .upcast::<F>(found, obj)
                    .map(Some)
                    .ok_or_else(|| Error::TypeMismatch {
                        expected: std::any::type_name::<F>(),
                        found: found.to_string(),
                    });
            }
            Lead::Fresh(word) => word,
        };
        let handler = if word & EXPLICIT_TYPE != 0 {
            self.read_type()?
        } else {
            let base = self.registry.declared_base::<F>().ok_or_else(|| {
                Error::malformed(format!(
                    "untagged payload for {} which declares no base type",
                    std::any::type_name::<F>()
                ))
            })?;
            self.registry.resolve(base)?
        };
        let name = handler.type_name();
        let version = check_version(name, word & !EXPLICIT_TYPE, handler.latest_version())?;
        let rc = self.nest(name, |insp| {
            let obj = handler.create(insp, version, version == handler.latest_version())?;
            let i = insp.objects.register(obj.clone(), name);
            trace!("{name} materialised as #{i} (v{version})");
            let rc = insp
                .registry
                .upcast::<F>(name, obj.clone())
                .ok_or_else(|| Error::TypeMismatch {
                    expected: std::any::type_name::<F>(),
                    found: name.to_string(),
                })?;
            insp.ancestors.push_view(name, &rc);
            let res = handler.describe_shared(insp, &obj, version);
            insp.ancestors.pop();
            res.map(|_| rc)
        })?;
        Ok(Some(rc))
    }

    fn read_type(&mut self) -> Result<Arc<dyn Handler>> {
        let name = self
            .read_str()?
            .ok_or(Error::UnexpectedNull("type name"))?;
        if let Some(h) = self.types.get(&name) {
            return Ok(h.clone());
        }
        let h = self.registry.resolve(&name)?;
        trace!("type tag `{name}` resolved to {}", h.type_name());
        self.types.insert(name, h.clone());
        Ok(h)
    }

    // ---- ancestors ----

    /// Nearest object under description that can be viewed as `P`.
    /// The relationship is never stored; both directions rebuild it from the
    /// call shape.
    ///
    /// An object entered through a polymorphic slot is only visible as that
    /// slot's family: a `Dog` reached through `polymorphic::<dyn Animal>` is
    /// found by `parent::<dyn Animal>()`, while `parent::<Dog>()` skips it and
    /// may return `None`.
    pub fn parent<P: ?Sized + 'static>(&self) -> Option<Rc<RefCell<P>>> {
        self.ancestors.find::<P>(self.registry)
    }

    pub fn ancestor_path(&self) -> Vec<&'static str> {
        self.ancestors.path()
    }

    pub fn ancestor_depth(&self) -> usize {
        self.ancestors.depth()
    }

    // ---- arrays ----

    pub fn descend(&mut self) {
        self.array_level += 1;
        trace!("array level {}", self.array_level);
    }

    pub fn ascend(&mut self) {
        self.array_level = self.array_level.saturating_sub(1);
    }

    pub fn array_level(&self) -> usize {
        self.array_level
    }

    /// Bulk byte block: a length then the raw bytes.
    pub fn bytes(&mut self, slot: &mut Vec<u8>) -> Result<()> {
        if self.is_writing() {
            self.write_len(slot.len())?;
            return self.write_raw(slot);
        }
        let len = self.read_len("byte block")?;
        *slot = self.read_raw(len)?;
        Ok(())
    }

    pub(crate) fn write_raw(&mut self, b: &[u8]) -> Result<()> {
        match &mut self.channel {
            Channel::Write(w) => w.write_bytes(b),
            Channel::Read(_) => Err(Error::malformed("write on a read session")),
        }
    }

    pub(crate) fn read_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        match &mut self.channel {
            Channel::Read(r) => r.read_vec(len),
            Channel::Write(_) => Err(Error::malformed("read on a write session")),
        }
    }
}

fn version_word(version: u32) -> Result<i32> {
    if version == 0 || version >= EXPLICIT_TYPE {
        return Err(Error::malformed(format!("version {version} out of range")));
    }
    Ok(version as i32)
}

fn check_version(type_name: &'static str, found: u32, latest: u32) -> Result<u32> {
    if found == 0 {
        return Err(Error::malformed(format!("version 0 for {type_name}")));
    }
    if found > latest {
        return Err(Error::FutureVersion {
            type_name,
            found,
            latest,
        });
    }
    Ok(found)
}
