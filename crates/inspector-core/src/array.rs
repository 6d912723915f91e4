use crate::error::{Error, Result};
use crate::inspector::{Inspect, Inspector};

/// Rank-`R` array stored row-major (last index varies fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct RectArray<T, const R: usize> {
    dims: [usize; R],
    items: Vec<T>,
}

fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
}

impl<T: Clone, const R: usize> RectArray<T, R> {
    pub fn new(dims: [usize; R], fill: T) -> Self {
        let n = element_count(&dims).unwrap_or(0);
        Self {
            dims,
            items: vec![fill; n],
        }
    }
}

impl<T, const R: usize> RectArray<T, R> {
    /// Fails when `items` does not hold exactly the product of `dims`.
    pub fn from_vec(dims: [usize; R], items: Vec<T>) -> Result<Self> {
        match element_count(&dims) {
            Some(n) if n == items.len() => Ok(Self { dims, items }),
            _ => Err(Error::malformed(format!(
                "{} items do not fill dimensions {dims:?}",
                items.len()
            ))),
        }
    }

    pub fn dims(&self) -> [usize; R] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn offset(&self, index: [usize; R]) -> Option<usize> {
        let mut off = 0usize;
        for (i, d) in index.iter().zip(self.dims.iter()) {
            if i >= d {
                return None;
            }
            off = off * d + i;
        }
        Some(off)
    }

    pub fn get(&self, index: [usize; R]) -> Option<&T> {
        self.offset(index).and_then(|o| self.items.get(o))
    }

    pub fn get_mut(&mut self, index: [usize; R]) -> Option<&mut T> {
        self.offset(index).and_then(|o| self.items.get_mut(o))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Default, const R: usize> Default for RectArray<T, R> {
    fn default() -> Self {
        let n = if R == 0 { 1 } else { 0 };
        Self {
            dims: [0; R],
            items: (0..n).map(|_| T::default()).collect(),
        }
    }
}

// One nested pass per dimension, bracketed by descend/ascend.
fn walk(
    insp: &mut Inspector<'_>,
    dims: &[usize],
    each: &mut dyn FnMut(&mut Inspector<'_>) -> Result<()>,
) -> Result<()> {
    let Some((&n, rest)) = dims.split_first() else {
        return each(insp);
    };
    insp.descend();
    for _ in 0..n {
        if rest.is_empty() {
            each(insp)?;
        } else {
            walk(insp, rest, each)?;
        }
    }
    insp.ascend();
    Ok(())
}

impl<'a> Inspector<'a> {
    fn array_dims<const R: usize>(&mut self, dims: &mut [usize; R]) -> Result<usize> {
        if self.is_writing() {
            for d in dims.iter() {
                self.write_len(*d)?;
            }
            return element_count(dims)
                .ok_or_else(|| Error::malformed(format!("dimensions {dims:?} overflow")));
        }
        for d in dims.iter_mut() {
            *d = self.read_len("array dimension")?;
        }
        let n = element_count(dims)
            .ok_or_else(|| Error::malformed(format!("dimensions {dims:?} overflow")))?;
        self.check_len(n, "array")
    }

    /// Rectangular array: the `R` dimension lengths, then every element
    /// through its own field kind.
    pub fn array<T, const R: usize>(&mut self, slot: &mut RectArray<T, R>) -> Result<()>
    where
        T: Inspect + Default,
    {
        let mut dims = slot.dims;
        let n = self.array_dims(&mut dims)?;
        if self.is_writing() {
            if n != slot.items.len() {
                return Err(Error::malformed(format!(
                    "array holds {} items for dimensions {dims:?}",
                    slot.items.len()
                )));
            }
            let mut items = slot.items.iter_mut();
            return walk(self, &dims, &mut |insp| match items.next() {
                Some(item) => item.inspect(insp),
                None => Err(Error::malformed("array ran out of items")),
            });
        }
        let mut items = Vec::with_capacity(n.min(1024));
        walk(self, &dims, &mut |insp| {
            let mut item = T::default();
            item.inspect(insp)?;
            items.push(item);
            Ok(())
        })?;
        *slot = RectArray { dims, items };
        Ok(())
    }

    /// Byte array: dimension lengths then one raw block, no per-element framing.
    pub fn byte_array<const R: usize>(&mut self, slot: &mut RectArray<u8, R>) -> Result<()> {
        let mut dims = slot.dims;
        let n = self.array_dims(&mut dims)?;
        if self.is_writing() {
            if n != slot.items.len() {
                return Err(Error::malformed(format!(
                    "array holds {} bytes for dimensions {dims:?}",
                    slot.items.len()
                )));
            }
            return self.write_raw(&slot.items);
        }
        let items = self.read_raw(n)?;
        *slot = RectArray { dims, items };
        Ok(())
    }
}

impl<T: Inspect + Default, const R: usize> Inspect for RectArray<T, R> {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        insp.array(self)
    }
    fn differs(&self, other: &Self) -> bool {
        self.dims != other.dims
            || self.items.len() != other.items.len()
            || self.items.iter().zip(&other.items).any(|(a, b)| a.differs(b))
    }
}
