//! Argument carriers for function invocation.
//!
//! Positional arguments travel in [`ArgValues`], size-specialized for the
//! common zero/one/two shapes so most calls avoid a heap allocation.
//! Refinements travel separately in a keyed [`Refinements`] map. Both types
//! own their values: every error path drains them back through the heap so
//! refcounts stay balanced.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    error::{ErrorValue, RunResult},
    heap::Heap,
    intern::SymbolId,
    value::Value,
};

/// Positional argument values for one invocation.
#[derive(Debug)]
pub(crate) enum ArgValues {
    Empty,
    One(Value),
    Two(Value, Value),
    Many(SmallVec<[Value; 4]>),
}

impl ArgValues {
    pub fn from_vec(mut values: SmallVec<[Value; 4]>) -> Self {
        match values.len() {
            0 => Self::Empty,
            1 => Self::One(values.remove(0)),
            2 => {
                let b = values.remove(1);
                let a = values.remove(0);
                Self::Two(a, b)
            }
            _ => Self::Many(values),
        }
    }

    /// Borrows the first positional argument, used by action dispatch to
    /// pick the implementation table before consuming the arguments.
    pub fn first(&self) -> Option<&Value> {
        match self {
            Self::Empty => None,
            Self::One(a) | Self::Two(a, _) => Some(a),
            Self::Many(values) => values.first(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
            Self::Many(values) => values.len(),
        }
    }

    /// Exactly one argument, or `ArgCount` (draining on failure).
    pub fn get_one(self, name: &str, heap: &mut Heap) -> RunResult<Value> {
        match self {
            Self::One(a) => Ok(a),
            other => {
                let count = other.count();
                other.drop_with_heap(heap);
                Err(ErrorValue::arg_count(name, 1, count))
            }
        }
    }

    /// Exactly two arguments, or `ArgCount` (draining on failure).
    pub fn get_two(self, name: &str, heap: &mut Heap) -> RunResult<(Value, Value)> {
        match self {
            Self::Two(a, b) => Ok((a, b)),
            other => {
                let count = other.count();
                other.drop_with_heap(heap);
                Err(ErrorValue::arg_count(name, 2, count))
            }
        }
    }

    /// Exactly three arguments, or `ArgCount` (draining on failure).
    pub fn get_three(self, name: &str, heap: &mut Heap) -> RunResult<(Value, Value, Value)> {
        match self {
            Self::Many(mut values) if values.len() == 3 => {
                let c = values.remove(2);
                let b = values.remove(1);
                let a = values.remove(0);
                Ok((a, b, c))
            }
            other => {
                let count = other.count();
                other.drop_with_heap(heap);
                Err(ErrorValue::arg_count(name, 3, count))
            }
        }
    }

    /// Releases every contained value.
    pub fn drop_with_heap(self, heap: &mut Heap) {
        match self {
            Self::Empty => {}
            Self::One(a) => a.drop_with_heap(heap),
            Self::Two(a, b) => {
                a.drop_with_heap(heap);
                b.drop_with_heap(heap);
            }
            Self::Many(values) => {
                for value in values {
                    value.drop_with_heap(heap);
                }
            }
        }
    }
}

/// Refinement values for one invocation, keyed by refinement name.
///
/// A boolean refinement mentioned at the call site is stored as
/// `Logic(true)`; a value-taking refinement stores its value. Refinements
/// not mentioned are absent, which readers interpret as `none`.
#[derive(Debug, Default)]
pub(crate) struct Refinements {
    map: AHashMap<SymbolId, Value>,
}

impl Refinements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: SymbolId, value: Value, heap: &mut Heap) {
        if let Some(old) = self.map.insert(name, value) {
            old.drop_with_heap(heap);
        }
    }

    /// True when the refinement was mentioned with a truthy value.
    pub fn flag(&self, name: SymbolId) -> bool {
        self.map.get(&name).is_some_and(Value::is_truthy)
    }

    pub fn value(&self, name: SymbolId) -> Option<&Value> {
        self.map.get(&name)
    }

    /// Removes and returns the refinement's value, if mentioned.
    pub fn take(&mut self, name: SymbolId) -> Option<Value> {
        self.map.remove(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (SymbolId, Value)> + '_ {
        self.map.drain()
    }

    pub fn drop_with_heap(mut self, heap: &mut Heap) {
        for (_, value) in self.map.drain() {
            value.drop_with_heap(heap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Arity mismatch drains the supplied values and reports counts.
    #[test]
    fn arity_error_drains_values() {
        let mut heap = Heap::new();
        let s = heap.alloc_string("x".into());
        let args = ArgValues::from_vec(smallvec::smallvec![s]);
        let err = args.get_two("probe", &mut heap);
        assert!(err.is_err());
        assert_eq!(heap.stats(0).live_objects, 0, "failed arity check must release args");
    }

    /// from_vec picks the size-specialized variant.
    #[test]
    fn from_vec_specializes() {
        assert!(matches!(ArgValues::from_vec(smallvec::smallvec![]), ArgValues::Empty));
        assert!(matches!(
            ArgValues::from_vec(smallvec::smallvec![Value::Int(1)]),
            ArgValues::One(_)
        ));
        assert!(matches!(
            ArgValues::from_vec(smallvec::smallvec![Value::Int(1), Value::Int(2)]),
            ArgValues::Two(..)
        ));
        let three = ArgValues::from_vec(smallvec::smallvec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(three.count(), 3);
    }

    /// Unmentioned refinements read as absent/false.
    #[test]
    fn refinement_defaults() {
        let mut heap = Heap::new();
        let mut interns = crate::intern::Interns::new();
        let shout = interns.intern("shout");
        let quiet = interns.intern("quiet");
        let mut refs = Refinements::new();
        refs.insert(shout, Value::Logic(true), &mut heap);
        assert!(refs.flag(shout));
        assert!(!refs.flag(quiet));
        assert!(refs.value(quiet).is_none());
        refs.drop_with_heap(&mut heap);
    }
}
