// Object identity table plus the sentinel layout shared by strings, objects
// and nullable values.
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};

pub(crate) const NULL: i32 = -1;
// Set on a version word when an explicit type name follows.
pub(crate) const EXPLICIT_TYPE: u32 = 0x4000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lead {
    Null,
    BackRef(usize),
    Fresh(u32),
}

impl Lead {
    pub(crate) fn classify(v: i32) -> Lead {
        match v {
            NULL => Lead::Null,
            v if v < NULL => Lead::BackRef((-(v as i64) - 2) as usize),
            v => Lead::Fresh(v as u32),
        }
    }
}

pub(crate) fn back_ref(index: usize) -> Result<i32> {
    i32::try_from(index)
        .ok()
        .and_then(|i| i.checked_add(2))
        .map(|i| -i)
        .ok_or_else(|| Error::malformed(format!("identity index {index} out of range")))
}

pub(crate) struct ObjectSlot {
    pub(crate) obj: Rc<dyn Any>,
    pub(crate) type_name: &'static str,
}

/// Write side keys by allocation address and keeps a clone of every visited
/// reference so an address cannot be reused mid-session. Read side holds
/// every materialised object as `Rc<RefCell<Concrete>>` behind `dyn Any`.
#[derive(Default)]
pub(crate) struct ObjectTable {
    seen: HashMap<usize, usize>,
    keep_alive: Vec<Box<dyn Any>>,
    slots: Vec<ObjectSlot>,
}

impl ObjectTable {
    pub(crate) fn len(&self) -> usize {
        self.seen.len().max(self.slots.len())
    }

    pub(crate) fn find(&self, addr: usize) -> Option<usize> {
        self.seen.get(&addr).copied()
    }

    pub(crate) fn assign(&mut self, addr: usize, keep: Box<dyn Any>) -> usize {
        let i = self.keep_alive.len();
        self.seen.insert(addr, i);
        self.keep_alive.push(keep);
        i
    }

    pub(crate) fn register(&mut self, obj: Rc<dyn Any>, type_name: &'static str) -> usize {
        let i = self.slots.len();
        self.slots.push(ObjectSlot { obj, type_name });
        i
    }

    pub(crate) fn get(&self, index: usize) -> Result<&ObjectSlot> {
        self.slots.get(index).ok_or(Error::UnknownBackReference {
            table: "object",
            index,
        })
    }
}
