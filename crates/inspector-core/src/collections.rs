// Sequence and map field kinds: an i32 count (or -1 for a null collection)
// followed by the elements, map entries as key then value.
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::inspector::{Inspect, Inspector};
use crate::objects::{Lead, NULL};
use crate::registry::Describe;

fn read_count(insp: &mut Inspector<'_>, what: &str) -> Result<Option<usize>> {
    match insp.read_lead()? {
        Lead::Null => Ok(None),
        Lead::Fresh(n) => insp.check_len(n as usize, what).map(Some),
        Lead::BackRef(i) => Err(Error::malformed(format!(
            "back-reference {i} where a {what} count belongs"
        ))),
    }
}

fn write_seq<T: Inspect>(insp: &mut Inspector<'_>, items: &mut [T]) -> Result<()> {
    insp.write_len(items.len())?;
    for item in items.iter_mut() {
        item.inspect(insp)?;
    }
    Ok(())
}

fn read_seq<T: Inspect + Default>(insp: &mut Inspector<'_>, len: usize) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        let mut item = T::default();
        item.inspect(insp)?;
        out.push(item);
    }
    Ok(out)
}

fn seq_differs<T: Inspect>(a: &[T], b: &[T]) -> bool {
    a.len() != b.len() || a.iter().zip(b).any(|(x, y)| x.differs(y))
}

impl<T: Inspect + Default> Inspect for Vec<T> {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            return write_seq(insp, self);
        }
        let len = read_count(insp, "sequence")?.ok_or(Error::UnexpectedNull("sequence"))?;
        *self = read_seq(insp, len)?;
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        seq_differs(self, other)
    }
}

impl<T: Inspect + Default> Inspect for Option<Vec<T>> {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            return match self {
                None => insp.write_tag(NULL),
                Some(items) => write_seq(insp, items),
            };
        }
        *self = match read_count(insp, "sequence")? {
            None => None,
            Some(len) => Some(read_seq(insp, len)?),
        };
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => false,
            (Some(a), Some(b)) => seq_differs(a, b),
            _ => true,
        }
    }
}

impl<K, V> Inspect for BTreeMap<K, V>
where
    K: Inspect + Default + Ord + Clone,
    V: Inspect + Default,
{
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            insp.write_len(self.len())?;
            for (k, v) in self.iter_mut() {
                // keys are immutable in place; write a clone
                k.clone().inspect(insp)?;
                v.inspect(insp)?;
            }
            return Ok(());
        }
        let len = read_count(insp, "map")?.ok_or(Error::UnexpectedNull("map"))?;
        let mut out = BTreeMap::new();
        for _ in 0..len {
            let mut k = K::default();
            k.inspect(insp)?;
            let mut v = V::default();
            v.inspect(insp)?;
            out.insert(k, v);
        }
        *self = out;
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self.len() != other.len()
            || self
                .iter()
                .zip(other)
                .any(|((ka, va), (kb, vb))| ka.differs(kb) || va.differs(vb))
    }
}

impl<K, V> Inspect for HashMap<K, V>
where
    K: Inspect + Default + Eq + Hash + Clone,
    V: Inspect + Default,
{
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        if insp.is_writing() {
            insp.write_len(self.len())?;
            for (k, v) in self.iter_mut() {
                k.clone().inspect(insp)?;
                v.inspect(insp)?;
            }
            return Ok(());
        }
        let len = read_count(insp, "map")?.ok_or(Error::UnexpectedNull("map"))?;
        let mut out = HashMap::with_capacity(len.min(1024));
        for _ in 0..len {
            let mut k = K::default();
            k.inspect(insp)?;
            let mut v = V::default();
            v.inspect(insp)?;
            out.insert(k, v);
        }
        *self = out;
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self.len() != other.len()
            || self
                .iter()
                .any(|(k, v)| other.get(k).is_none_or(|o| v.differs(o)))
    }
}

/// Monomorphic shared reference; compares by identity.
impl<T: Describe> Inspect for Option<Rc<RefCell<T>>> {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        insp.object(self)
    }
    fn differs(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => false,
            (Some(a), Some(b)) => !Rc::ptr_eq(a, b),
            _ => true,
        }
    }
}
