// Per-session string pool. Writers pool by content; readers append in the
// same order, so indices stay aligned between the two directions.
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct StringTable {
    index: HashMap<Rc<str>, usize>,
    slots: Vec<Rc<str>>,
}

impl StringTable {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn lookup(&self, s: &str) -> Option<usize> {
        self.index.get(s).copied()
    }

    // Returns the slot index, which is the next free one when `s` is new.
    pub(crate) fn pool(&mut self, s: Rc<str>) -> usize {
        if let Some(i) = self.index.get(&s) {
            return *i;
        }
        let i = self.slots.len();
        self.index.insert(s.clone(), i);
        self.slots.push(s);
        i
    }

    // Read side: always appends so indices follow the writer's numbering.
    pub(crate) fn push(&mut self, s: Rc<str>) -> usize {
        let i = self.slots.len();
        self.index.entry(s.clone()).or_insert(i);
        self.slots.push(s);
        i
    }

    pub(crate) fn get(&self, index: usize) -> Result<Rc<str>> {
        self.slots
            .get(index)
            .cloned()
            .ok_or(Error::UnknownBackReference {
                table: "string",
                index,
            })
    }
}
