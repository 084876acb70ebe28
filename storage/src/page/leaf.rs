use super::{PageHeader, PageRef};
use crate::configuration::IndexConfiguration;
use crate::measure::MeasureSet;
use crate::seek::{seek_slots, Direction, Ray, SeekResult};
use crate::{Result, StorageError};

/// Sorted items of one key range, chained to the neighbouring leaves.
#[derive(Debug)]
pub struct LeafPage<T> {
    header: PageHeader,
    items: Vec<T>,
    capacity: usize,
    left: Option<PageRef>,
    right: Option<PageRef>,
    measures: MeasureSet<T>,
}

impl<T> LeafPage<T> {
    pub fn new<K>(configuration: &IndexConfiguration<K, T>) -> Self {
        Self {
            header: PageHeader::new(),
            items: Vec::with_capacity(configuration.page_size()),
            capacity: configuration.page_size(),
            left: None,
            right: None,
            measures: configuration.create_measure_set(),
        }
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut PageHeader {
        &mut self.header
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn left(&self) -> Option<PageRef> {
        self.left
    }

    pub fn right(&self) -> Option<PageRef> {
        self.right
    }

    pub fn set_left(&mut self, left: Option<PageRef>) {
        self.left = left;
        self.header.update_version();
    }

    pub fn set_right(&mut self, right: Option<PageRef>) {
        self.right = right;
        self.header.update_version();
    }

    pub fn measures(&self) -> &MeasureSet<T> {
        &self.measures
    }

    pub fn first_key<K>(&self, configuration: &IndexConfiguration<K, T>) -> Option<K> {
        self.items.first().map(|item| configuration.extract_key(item))
    }

    pub fn seek<K>(&self, key: &K, configuration: &IndexConfiguration<K, T>) -> SeekResult<usize> {
        seek_slots(self.items.len(), Direction::Positive, |index| {
            configuration.compare(key, &configuration.extract_key(&self.items[index]))
        })
    }

    pub fn seek_ray<K>(
        &self,
        ray: &Ray<K>,
        configuration: &IndexConfiguration<K, T>,
    ) -> SeekResult<usize> {
        seek_slots(self.items.len(), ray.direction, |index| {
            let key = configuration.extract_key(&self.items[index]);
            configuration.asymmetric_compare(&ray.point, &key)
        })
    }

    /// Inserts `item` at `index`, shifting later items right.
    pub fn insert(&mut self, index: usize, item: T) -> Result<()> {
        if index > self.items.len() {
            return Err(StorageError::InvalidIndex {
                index,
                size: self.items.len(),
            });
        }
        if self.is_full() {
            return Err(StorageError::PageFull {
                capacity: self.capacity,
            });
        }

        self.items.insert(index, item);
        Self::fold_in(&mut self.measures, &self.items, &self.items[index]);
        self.header.update_version();
        Ok(())
    }

    /// Removes and returns the item at `index`, shifting later items left.
    pub fn remove(&mut self, index: usize) -> Result<T> {
        if index >= self.items.len() {
            return Err(StorageError::InvalidIndex {
                index,
                size: self.items.len(),
            });
        }

        let item = self.items.remove(index);
        self.subtract_from_measures(&item);
        self.header.update_version();
        Ok(item)
    }

    /// Moves the upper half into a new page placed right after this one.
    ///
    /// The new page links back to this page and forward to this page's former
    /// right neighbour. The caller assigns it a reference, points this page's
    /// `right` (and the former neighbour's `left`) at it, and adds a separator
    /// to the parent.
    pub fn split(&mut self) -> LeafPage<T> {
        let at = (self.capacity / 2).min(self.items.len());
        let mut items = Vec::with_capacity(self.capacity);
        items.extend(self.items.drain(at..));

        let mut sibling = LeafPage {
            header: PageHeader::new(),
            items,
            capacity: self.capacity,
            left: self.header.reference(),
            right: self.right,
            measures: self.measures.clone(),
        };
        sibling.recalculate_measures();
        self.recalculate_measures();
        self.header.update_version();
        sibling
    }

    /// Merges `other`, the right neighbour of this page, into this page.
    ///
    /// Returns true when every item of `other` was absorbed; `other` is then
    /// empty and must be detached from its parent. Otherwise the pages are
    /// rebalanced and the parent separator must move to `other`'s first key.
    pub fn merge(&mut self, other: &mut LeafPage<T>) -> bool {
        let (own, theirs) = (self.items.len(), other.items.len());

        if own + theirs < self.capacity {
            self.items.append(&mut other.items);
            if !self.measures.add_set(&other.measures) {
                self.recalculate_measures();
            }
            other.measures.reset();
            self.right = other.right;
            other.left = None;
            other.right = None;
            self.header.update_version();
            other.header.update_version();
            return true;
        }

        let count = own.abs_diff(theirs) / 2;
        if count == 0 {
            return false;
        }

        let mut incremental = true;
        if own < theirs {
            let moved: Vec<T> = other.items.drain(..count).collect();
            for item in &moved {
                incremental =
                    incremental && self.measures.add(item) && other.measures.subtract(item);
            }
            self.items.extend(moved);
        } else {
            let moved = self.items.split_off(own - count);
            for item in &moved {
                incremental =
                    incremental && other.measures.add(item) && self.measures.subtract(item);
            }
            other.items.splice(0..0, moved);
        }

        if !incremental {
            self.recalculate_measures();
            other.recalculate_measures();
        }
        self.header.update_version();
        other.header.update_version();
        false
    }

    /// Folds an item that is already stored in this page into the measures.
    pub fn add_to_measures(&mut self, item: &T) {
        Self::fold_in(&mut self.measures, &self.items, item);
    }

    /// Removes an item that is no longer stored in this page from the measures.
    pub fn subtract_from_measures(&mut self, item: &T) {
        if !self.measures.subtract(item) {
            log::trace!(
                "leaf {:?}: subtract not decomposable, recalculating",
                self.header.reference()
            );
            self.measures.recalculate(&self.items);
        }
    }

    pub fn recalculate_measures(&mut self) {
        self.measures.recalculate(&self.items);
    }

    fn fold_in(measures: &mut MeasureSet<T>, items: &[T], item: &T) {
        if !measures.add(item) {
            log::trace!("leaf: add not decomposable, recalculating");
            measures.recalculate(items);
        }
    }
}
