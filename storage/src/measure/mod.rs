//! Incrementally maintained aggregates over the items under a page.
//!
//! Every page carries a [`MeasureSet`]: one measure instance per configured
//! prototype, in configuration order. Mutations try the cheap incremental
//! path first (`add`/`subtract`); a `false` return means the change cannot be
//! applied incrementally and the owner must recompute the whole set.

mod builtin;

pub use builtin::{CountMeasure, MaxMeasure, MinMeasure, SumMeasure};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Current value of a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureResult {
    /// No items contributed yet (e.g. the minimum of an empty page).
    Empty,
    Value(i64),
}

impl MeasureResult {
    pub fn value(self) -> Option<i64> {
        match self {
            MeasureResult::Empty => None,
            MeasureResult::Value(value) => Some(value),
        }
    }
}

pub trait Measure<T>: fmt::Debug {
    /// Stable name used to look the measure up in a [`MeasureSet`].
    fn name(&self) -> &str;

    fn result(&self) -> MeasureResult;

    /// Folds `item` into the result. Returns false if the update could not be applied.
    fn add(&mut self, item: &T) -> bool;

    /// Removes `item` from the result. Returns false if the update could not be applied.
    fn subtract(&mut self, item: &T) -> bool;

    /// Folds the result of another instance of this measure (a child subtree) into this one.
    fn add_result(&mut self, other: MeasureResult) -> bool;

    fn subtract_result(&mut self, other: MeasureResult) -> bool;

    fn reset(&mut self);

    /// Fresh, empty instance configured like this one.
    fn create_new(&self) -> Box<dyn Measure<T>>;

    /// Copy of this instance including its current result.
    fn clone_measure(&self) -> Box<dyn Measure<T>>;

    /// Resets and replays every item.
    fn recalculate<'a>(&mut self, items: &mut dyn Iterator<Item = &'a T>) {
        self.reset();
        for item in items {
            self.add(item);
        }
    }

    /// Resets and combines the results of child subtrees.
    fn aggregate(&mut self, results: &mut dyn Iterator<Item = MeasureResult>) {
        self.reset();
        for result in results {
            self.add_result(result);
        }
    }
}

/// A change propagated up the tree: either one item from a leaf, or the whole
/// measure set of a child subtree.
#[derive(Debug)]
pub enum MeasureDelta<'a, T> {
    Item(&'a T),
    Set(&'a MeasureSet<T>),
}

impl<T> Clone for MeasureDelta<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MeasureDelta<'_, T> {}

/// The ordered measure instances attached to a page.
#[derive(Debug)]
pub struct MeasureSet<T> {
    measures: Vec<Box<dyn Measure<T>>>,
}

impl<T> MeasureSet<T> {
    /// Creates an empty instance of every prototype, preserving order.
    pub fn from_prototypes(prototypes: &[Arc<dyn Measure<T>>]) -> Self {
        Self {
            measures: prototypes.iter().map(|m| m.create_new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<MeasureResult> {
        self.measures
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.result())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Measure<T>> {
        self.measures.iter().map(|m| m.as_ref())
    }

    /// `(name, result)` pairs in configuration order.
    pub fn results(&self) -> Vec<(&str, MeasureResult)> {
        self.measures.iter().map(|m| (m.name(), m.result())).collect()
    }

    pub fn add(&mut self, item: &T) -> bool {
        self.measures.iter_mut().all(|m| m.add(item))
    }

    pub fn subtract(&mut self, item: &T) -> bool {
        self.measures.iter_mut().all(|m| m.subtract(item))
    }

    pub fn add_set(&mut self, other: &MeasureSet<T>) -> bool {
        self.measures
            .iter_mut()
            .zip(other.measures.iter())
            .all(|(m, o)| m.add_result(o.result()))
    }

    pub fn subtract_set(&mut self, other: &MeasureSet<T>) -> bool {
        self.measures
            .iter_mut()
            .zip(other.measures.iter())
            .all(|(m, o)| m.subtract_result(o.result()))
    }

    pub fn apply_add(&mut self, delta: MeasureDelta<'_, T>) -> bool {
        match delta {
            MeasureDelta::Item(item) => self.add(item),
            MeasureDelta::Set(set) => self.add_set(set),
        }
    }

    pub fn apply_subtract(&mut self, delta: MeasureDelta<'_, T>) -> bool {
        match delta {
            MeasureDelta::Item(item) => self.subtract(item),
            MeasureDelta::Set(set) => self.subtract_set(set),
        }
    }

    pub fn reset(&mut self) {
        for measure in &mut self.measures {
            measure.reset();
        }
    }

    /// Recomputes every measure from `items`.
    pub fn recalculate(&mut self, items: &[T]) {
        for measure in &mut self.measures {
            measure.recalculate(&mut items.iter());
        }
    }

    /// Recomputes every measure by combining child subtree sets.
    pub fn aggregate(&mut self, children: &[&MeasureSet<T>]) {
        for (position, measure) in self.measures.iter_mut().enumerate() {
            measure.aggregate(&mut children.iter().map(|c| c.measures[position].result()));
        }
    }
}

impl<T> Clone for MeasureSet<T> {
    fn clone(&self) -> Self {
        Self {
            measures: self.measures.iter().map(|m| m.clone_measure()).collect(),
        }
    }
}

impl<T> PartialEq for MeasureSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.results() == other.results()
    }
}
