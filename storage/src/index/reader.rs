use super::ItemPointer;
use crate::configuration::IndexConfiguration;
use crate::page::PageRef;
use crate::provider::PageProvider;
use crate::seek::{Direction, Entire};
use crate::Result;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

/// Walks the leaf chain from a starting item until the end boundary is passed.
pub struct IndexReader<'a, K, T, P> {
    provider: &'a P,
    configuration: Arc<IndexConfiguration<K, T>>,
    position: Option<(PageRef, usize)>,
    direction: Direction,
    end: Entire<K>,
    _marker: PhantomData<&'a (K, T)>,
}

impl<'a, K, T, P: PageProvider<K, T>> IndexReader<'a, K, T, P> {
    pub(super) fn new(
        provider: &'a P,
        configuration: Arc<IndexConfiguration<K, T>>,
        start: Option<ItemPointer>,
        direction: Direction,
        end: Entire<K>,
    ) -> Self {
        Self {
            provider,
            configuration,
            position: start.map(|pointer| (pointer.page, pointer.index)),
            direction,
            end,
            _marker: PhantomData,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn read_next(&mut self) -> Result<Option<&'a T>> {
        let Some((page, index)) = self.position else {
            return Ok(None);
        };
        let provider = self.provider;
        let leaf = provider.resolve(page)?.as_leaf()?;
        let Some(item) = leaf.item(index) else {
            self.position = None;
            return Ok(None);
        };

        let key = self.configuration.extract_key(item);
        let bound = self.configuration.asymmetric_compare(&self.end, &key);
        let passed = matches!(
            (self.direction, bound),
            (Direction::Positive, Ordering::Less) | (Direction::Negative, Ordering::Greater)
        );
        if passed {
            self.position = None;
            return Ok(None);
        }

        self.position = match self.direction {
            Direction::Positive if index + 1 < leaf.size() => Some((page, index + 1)),
            Direction::Positive => leaf.right().map(|right| (right, 0)),
            Direction::Negative if index > 0 => Some((page, index - 1)),
            Direction::Negative => match leaf.left() {
                Some(left) => {
                    let size = provider.resolve(left)?.size();
                    (size > 0).then(|| (left, size - 1))
                }
                None => None,
            },
        };
        Ok(Some(item))
    }
}

impl<'a, K, T, P: PageProvider<K, T>> Iterator for IndexReader<'a, K, T, P> {
    type Item = Result<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(item) => item.map(Ok),
            Err(err) => {
                self.position = None;
                Some(Err(err))
            }
        }
    }
}
