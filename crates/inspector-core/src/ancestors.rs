use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::registry::Registry;

// `view` is a `Weak<RefCell<S>>` for the slot's static type S. `concrete`
// is only set for monomorphic slots, so both directions see the same stack.
struct AncestorEntry {
    type_name: &'static str,
    view: Box<dyn Any>,
    concrete: Option<Weak<dyn Any>>,
}

/// Non-owning stack of the reference objects currently being described.
#[derive(Default)]
pub(crate) struct AncestorStack {
    entries: Vec<AncestorEntry>,
}

impl AncestorStack {
    pub(crate) fn depth(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn push_concrete<T: Any>(&mut self, type_name: &'static str, rc: &Rc<RefCell<T>>) {
        let erased: Rc<dyn Any> = rc.clone();
        self.entries.push(AncestorEntry {
            type_name,
            view: Box::new(Rc::downgrade(rc)),
            concrete: Some(Rc::downgrade(&erased)),
        });
    }

    pub(crate) fn push_view<F: ?Sized + 'static>(
        &mut self,
        type_name: &'static str,
        rc: &Rc<RefCell<F>>,
    ) {
        self.entries.push(AncestorEntry {
            type_name,
            view: Box::new(Rc::downgrade(rc)),
            concrete: None,
        });
    }

    pub(crate) fn pop(&mut self) {
        self.entries.pop();
    }

    pub(crate) fn path(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.type_name).collect()
    }

    // Nearest ancestor viewable as `P`, either through its slot type or a
    // family registered for its concrete type.
    pub(crate) fn find<P: ?Sized + 'static>(&self, registry: &Registry) -> Option<Rc<RefCell<P>>> {
        for e in self.entries.iter().rev() {
            if let Some(w) = e.view.downcast_ref::<Weak<RefCell<P>>>() {
                if let Some(rc) = w.upgrade() {
                    return Some(rc);
                }
                continue;
            }
            if let Some(obj) = e.concrete.as_ref().and_then(|w| w.upgrade())
                && let Some(rc) = registry.upcast::<P>(e.type_name, obj)
            {
                return Some(rc);
            }
        }
        None
    }
}
