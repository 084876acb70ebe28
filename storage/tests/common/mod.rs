//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use anyhow::{bail, ensure, Result};
use ordex_storage::{
    BloomFilter, Index, IndexConfiguration, IndexConfigurationBuilder, Measure, MeasureResult,
    MemoryPageProvider, MinMeasure, Page, PageProvider, PageRef, SumMeasure,
};
use std::collections::HashSet;

pub type TestIndex = Index<i64, i64, MemoryPageProvider<i64, i64>>;

/// Routes `log` records from the library through a test-aware subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Count that never applies a change incrementally, so every mutation takes
/// the recompute path.
#[derive(Debug, Clone, Default)]
pub struct StubbornCount {
    count: i64,
}

impl StubbornCount {
    pub const NAME: &'static str = "Stubborn";
}

impl Measure<i64> for StubbornCount {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn result(&self) -> MeasureResult {
        MeasureResult::Value(self.count)
    }

    fn add(&mut self, _item: &i64) -> bool {
        false
    }

    fn subtract(&mut self, _item: &i64) -> bool {
        false
    }

    fn add_result(&mut self, _other: MeasureResult) -> bool {
        false
    }

    fn subtract_result(&mut self, _other: MeasureResult) -> bool {
        false
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn create_new(&self) -> Box<dyn Measure<i64>> {
        Box::new(StubbornCount::default())
    }

    fn clone_measure(&self) -> Box<dyn Measure<i64>> {
        Box::new(self.clone())
    }

    fn recalculate<'a>(&mut self, items: &mut dyn Iterator<Item = &'a i64>) {
        self.count = items.count() as i64;
    }

    fn aggregate(&mut self, results: &mut dyn Iterator<Item = MeasureResult>) {
        self.count = results.filter_map(MeasureResult::value).sum();
    }
}

/// Exact "filter" backed by a set, so tests can reason about its answers.
#[derive(Debug, Default)]
pub struct SetFilter {
    keys: HashSet<i64>,
}

impl BloomFilter<i64> for SetFilter {
    fn insert(&mut self, key: &i64) {
        self.keys.insert(*key);
    }

    fn may_contain(&self, key: &i64) -> bool {
        self.keys.contains(key)
    }
}

pub fn configuration(page_size: usize) -> IndexConfiguration<i64, i64> {
    IndexConfigurationBuilder::new(|item: &i64| *item)
        .page_size(page_size)
        .measure(SumMeasure::new("Sum", |v: &i64| *v))
        .measure(MinMeasure::new("Min", |v: &i64| *v))
        .measure(StubbornCount::default())
        .bloom_filter(|_| Box::new(SetFilter::default()))
        .build()
        .expect("valid test configuration")
}

pub fn index(page_size: usize) -> TestIndex {
    Index::create(MemoryPageProvider::new(), configuration(page_size)).expect("index created")
}

/// Verifies every structural invariant of the tree and returns the keys in
/// leaf-chain order.
pub fn check_invariants(index: &TestIndex) -> Result<Vec<i64>> {
    let configuration = index.configuration()?;
    let provider = index.provider();
    let root = index.root()?;

    let mut leaves = Vec::new();
    let mut leaf_depth = None;
    check_subtree(index, root, true, 0, &mut leaf_depth, &mut leaves)?;

    let mut chain = Vec::new();
    let mut keys = Vec::new();
    let mut previous = None;
    let mut current = Some(index.leftmost()?);
    while let Some(reference) = current {
        let leaf = provider.resolve(reference)?.as_leaf()?;
        ensure!(
            leaf.left() == previous,
            "leaf {} links left to {:?}, expected {:?}",
            reference,
            leaf.left(),
            previous
        );
        keys.extend(leaf.items().iter().map(|item| configuration.extract_key(item)));
        chain.push(reference);
        previous = Some(reference);
        current = leaf.right();
    }

    ensure!(chain == leaves, "leaf chain {:?} differs from tree order {:?}", chain, leaves);
    ensure!(previous == Some(index.rightmost()?), "rightmost is not the last leaf");
    ensure!(keys.windows(2).all(|pair| pair[0] < pair[1]), "keys out of order: {:?}", keys);
    ensure!(
        index.measures()?.results() == provider.resolve(root)?.measures().results(),
        "descriptor measures do not mirror the root"
    );
    ensure!(index.len()? == keys.len(), "count {} != {} keys", index.len()?, keys.len());
    Ok(keys)
}

/// Returns the smallest key of the subtree.
fn check_subtree(
    index: &TestIndex,
    reference: PageRef,
    is_root: bool,
    depth: usize,
    leaf_depth: &mut Option<usize>,
    leaves: &mut Vec<PageRef>,
) -> Result<Option<i64>> {
    let configuration = index.configuration()?;
    let provider = index.provider();
    let min_fill = configuration.min_fill();

    match provider.resolve(reference)? {
        Page::Leaf(leaf) => {
            match *leaf_depth {
                Some(expected) => {
                    ensure!(expected == depth, "leaf {} at depth {}", reference, depth)
                }
                None => *leaf_depth = Some(depth),
            }
            ensure!(leaf.size() <= configuration.page_size(), "leaf {} overflows", reference);
            ensure!(
                is_root || leaf.size() >= min_fill,
                "leaf {} underfull: {}",
                reference,
                leaf.size()
            );

            let mut fresh = configuration.create_measure_set();
            fresh.recalculate(leaf.items());
            ensure!(
                fresh.results() == leaf.measures().results(),
                "leaf {} measures {:?}, expected {:?}",
                reference,
                leaf.measures().results(),
                fresh.results()
            );

            leaves.push(reference);
            Ok(leaf.items().first().map(|item| configuration.extract_key(item)))
        }
        Page::Inner(inner) => {
            ensure!(
                inner.keys().len() + 1 == inner.size(),
                "inner {} key/child mismatch",
                reference
            );
            ensure!(inner.size() <= configuration.page_size(), "inner {} overflows", reference);
            ensure!(
                if is_root { inner.size() >= 2 } else { inner.size() >= min_fill },
                "inner {} underfull: {}",
                reference,
                inner.size()
            );

            let mut subtree_min = None;
            let mut sets = Vec::with_capacity(inner.size());
            for (position, &child) in inner.children().iter().enumerate() {
                let child_min = check_subtree(index, child, false, depth + 1, leaf_depth, leaves)?;
                if position == 0 {
                    subtree_min = child_min;
                } else {
                    let separator = inner.keys()[position - 1];
                    ensure!(
                        child_min == Some(separator),
                        "inner {} separator {} but child {} starts at {:?}",
                        reference,
                        separator,
                        child,
                        child_min
                    );
                }
                sets.push(provider.resolve(child)?.measures());
            }

            let mut fresh = configuration.create_measure_set();
            fresh.aggregate(&sets);
            ensure!(
                fresh.results() == inner.measures().results(),
                "inner {} measures {:?}, expected {:?}",
                reference,
                inner.measures().results(),
                fresh.results()
            );
            Ok(subtree_min)
        }
        Page::Descriptor(_) => bail!("descriptor page {} inside the tree", reference),
    }
}
