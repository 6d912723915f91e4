//! Per-type descriptors and the process-wide handler table.
//!
//! Concrete types implement [`Describe`]. Statically typed slots call it
//! directly; polymorphic slots and stored type names go through the
//! type-erased [`Handler`] kept in a [`Registry`]. Registration happens
//! up front; afterwards the registry is safe for concurrent readers.
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::inspector::Inspector;

/// Schema contract for one concrete type.
///
/// `describe` must visit the same fields, in the same order, for a given
/// version in both directions: the operation sequence is the wire schema.
pub trait Describe: Any + Sized {
    const TYPE_NAME: &'static str;
    const LATEST_VERSION: u32;

    /// Builds a blank instance for decoding `version`; `describe` fills it.
    fn create(insp: &mut Inspector<'_>, version: u32, is_latest: bool) -> Result<Self>;

    fn describe(&mut self, insp: &mut Inspector<'_>, version: u32) -> Result<()>;
}

/// Object-safe view of a described value. Family traits used in polymorphic
/// slots take this as a supertrait (`trait Shape: Inspectable {}`).
pub trait Inspectable: Any {
    fn type_name(&self) -> &'static str;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Describe> Inspectable for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub trait Handler: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn latest_version(&self) -> u32;
    /// Returns a fresh `Rc<RefCell<T>>` behind `dyn Any`.
    fn create(&self, insp: &mut Inspector<'_>, version: u32, is_latest: bool)
    -> Result<Rc<dyn Any>>;
    fn describe(&self, insp: &mut Inspector<'_>, instance: &mut dyn Any, version: u32)
    -> Result<()>;
    fn describe_shared(&self, insp: &mut Inspector<'_>, obj: &Rc<dyn Any>, version: u32)
    -> Result<()>;
}

pub struct TypeHandler<T>(PhantomData<fn() -> T>);

impl<T> Default for TypeHandler<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Describe> Handler for TypeHandler<T> {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn latest_version(&self) -> u32 {
        T::LATEST_VERSION
    }

    fn create(
        &self,
        insp: &mut Inspector<'_>,
        version: u32,
        is_latest: bool,
    ) -> Result<Rc<dyn Any>> {
        let value = T::create(insp, version, is_latest)?;
        Ok(Rc::new(RefCell::new(value)))
    }

    fn describe(
        &self,
        insp: &mut Inspector<'_>,
        instance: &mut dyn Any,
        version: u32,
    ) -> Result<()> {
        let found = (*instance).type_id();
        let Some(v) = instance.downcast_mut::<T>() else {
            return Err(Error::TypeMismatch {
                expected: T::TYPE_NAME,
                found: format!("{found:?}"),
            });
        };
        v.describe(insp, version)
    }

    fn describe_shared(
        &self,
        insp: &mut Inspector<'_>,
        obj: &Rc<dyn Any>,
        version: u32,
    ) -> Result<()> {
        let cell = obj
            .downcast_ref::<RefCell<T>>()
            .ok_or_else(|| Error::TypeMismatch {
                expected: T::TYPE_NAME,
                found: "foreign object".to_string(),
            })?;
        let mut v = cell
            .try_borrow_mut()
            .map_err(|_| Error::ObjectBusy(T::TYPE_NAME))?;
        v.describe(insp, version)
    }
}

type UpcastFn<F> = Box<dyn Fn(Rc<dyn Any>) -> Option<Rc<RefCell<F>>> + Send + Sync>;

struct Upcaster<F: ?Sized>(UpcastFn<F>);

#[derive(Default)]
struct Family {
    base: Option<&'static str>,
    members: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
pub struct Registry {
    by_type: DashMap<TypeId, Arc<dyn Handler>>,
    by_name: DashMap<String, Arc<dyn Handler>>,
    aliases: DashMap<String, &'static str>,
    families: DashMap<TypeId, Family>,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by sessions that are not given one.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    pub fn register<T: Describe>(&self) -> &Self {
        if self.by_type.contains_key(&TypeId::of::<T>()) {
            return self;
        }
        let handler: Arc<dyn Handler> = Arc::new(TypeHandler::<T>::default());
        self.by_type.insert(TypeId::of::<T>(), handler.clone());
        self.by_name.insert(T::TYPE_NAME.to_string(), handler);
        debug!("registered {} (latest v{})", T::TYPE_NAME, T::LATEST_VERSION);
        self
    }

    /// Makes `D` storable in `Option<Rc<RefCell<F>>>` slots. `upcast` is
    /// normally the identity closure `|d| d`, which performs the unsizing.
    pub fn register_subtype<F: ?Sized + 'static, D: Describe>(
        &self,
        upcast: fn(Rc<RefCell<D>>) -> Rc<RefCell<F>>,
    ) -> &Self {
        self.register::<D>();
        let cast: UpcastFn<F> = Box::new(move |obj: Rc<dyn Any>| {
            obj.downcast::<RefCell<D>>().ok().map(upcast)
        });
        self.families
            .entry(TypeId::of::<F>())
            .or_default()
            .members
            .insert(D::TYPE_NAME, Arc::new(Upcaster(cast)));
        self
    }

    /// Instances of `D` in `F` slots are written without a type name.
    pub fn declare_base<F: ?Sized + 'static, D: Describe>(&self) -> &Self {
        self.families.entry(TypeId::of::<F>()).or_default().base = Some(D::TYPE_NAME);
        self
    }

    /// Reads payloads stored under `old_name` with `T`'s handler.
    pub fn alias<T: Describe>(&self, old_name: &str) -> &Self {
        self.register::<T>();
        self.aliases.insert(old_name.to_string(), T::TYPE_NAME);
        self
    }

    pub fn handler<T: Describe>(&self) -> Arc<dyn Handler> {
        self.register::<T>();
        match self.by_type.get(&TypeId::of::<T>()) {
            Some(h) => h.clone(),
            None => Arc::new(TypeHandler::<T>::default()),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>> {
        if let Some(h) = self.by_name.get(name) {
            return Ok(h.clone());
        }
        let target = self.aliases.get(name).map(|t| *t);
        if let Some(target) = target
            && let Some(h) = self.by_name.get(target)
        {
            warn!("type `{name}` read as `{target}` through alias");
            return Ok(h.clone());
        }
        Err(Error::UnknownType(name.to_string()))
    }

    pub(crate) fn declared_base<F: ?Sized + 'static>(&self) -> Option<&'static str> {
        self.families.get(&TypeId::of::<F>()).and_then(|f| f.base)
    }

    pub fn upcast<F: ?Sized + 'static>(
        &self,
        type_name: &str,
        obj: Rc<dyn Any>,
    ) -> Option<Rc<RefCell<F>>> {
        let member = self
            .families
            .get(&TypeId::of::<F>())
            .and_then(|f| f.members.get(type_name).cloned())?;
        let up = member.downcast_ref::<Upcaster<F>>()?;
        (up.0)(obj)
    }
}
