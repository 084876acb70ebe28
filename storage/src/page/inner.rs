use super::{PageHeader, PageRef};
use crate::configuration::IndexConfiguration;
use crate::measure::{MeasureDelta, MeasureSet};
use crate::seek::{seek_slots, Direction, Ray, SeekResult};
use crate::{Result, StorageError};
use std::collections::HashMap;
use std::mem;

/// Snapshot of child subtree measures, taken from the provider before an
/// inner page is mutated.
pub type ChildMeasures<T> = HashMap<PageRef, MeasureSet<T>>;

/// Separator keys and child references of one tree level.
///
/// Child 0 is paired with the implicit lowest sentinel; `keys[i]` is paired with
/// `children[i + 1]` and equals the smallest key reachable under that child.
/// Seek positions therefore address keys, and a key position `i` leads to
/// child `i + 1`.
#[derive(Debug)]
pub struct InnerPage<K, T> {
    header: PageHeader,
    keys: Vec<K>,
    children: Vec<PageRef>,
    capacity: usize,
    measures: MeasureSet<T>,
}

fn measures_of<T>(children: &ChildMeasures<T>, child: PageRef) -> Result<&MeasureSet<T>> {
    children.get(&child).ok_or(StorageError::PageNotFound(child))
}

impl<K, T> InnerPage<K, T> {
    /// New page over two children, as created when the root splits.
    pub fn new(
        configuration: &IndexConfiguration<K, T>,
        first: PageRef,
        separator: K,
        second: PageRef,
    ) -> Self {
        let mut keys = Vec::with_capacity(configuration.page_size());
        keys.push(separator);
        let mut children = Vec::with_capacity(configuration.page_size());
        children.extend([first, second]);

        Self {
            header: PageHeader::new(),
            keys,
            children,
            capacity: configuration.page_size(),
            measures: configuration.create_measure_set(),
        }
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut PageHeader {
        &mut self.header
    }

    /// Number of children.
    pub fn size(&self) -> usize {
        self.children.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.children.len() >= self.capacity
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn key(&self, index: usize) -> Option<&K> {
        self.keys.get(index)
    }

    pub fn children(&self) -> &[PageRef] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<PageRef> {
        self.children.get(index).copied()
    }

    pub fn measures(&self) -> &MeasureSet<T> {
        &self.measures
    }

    pub fn seek(&self, key: &K, configuration: &IndexConfiguration<K, T>) -> SeekResult<usize> {
        seek_slots(self.keys.len(), Direction::Positive, |index| {
            configuration.compare(key, &self.keys[index])
        })
    }

    pub fn seek_ray(
        &self,
        ray: &Ray<K>,
        configuration: &IndexConfiguration<K, T>,
    ) -> SeekResult<usize> {
        seek_slots(self.keys.len(), ray.direction, |index| {
            configuration.asymmetric_compare(&ray.point, &self.keys[index])
        })
    }

    /// Child whose key range contains `key`.
    pub fn child_index(&self, key: &K, configuration: &IndexConfiguration<K, T>) -> usize {
        match self.seek(key, configuration) {
            SeekResult::Exact(index) => index + 1,
            SeekResult::Nearest(index) => index,
            SeekResult::None => self.keys.len(),
        }
    }

    /// Inserts `key` at key position `index` and `child` right after it.
    pub fn insert(&mut self, index: usize, key: K, child: PageRef) -> Result<()> {
        if index > self.keys.len() {
            return Err(StorageError::InvalidIndex {
                index,
                size: self.keys.len(),
            });
        }
        if self.is_full() {
            return Err(StorageError::PageFull {
                capacity: self.capacity,
            });
        }

        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
        self.header.update_version();
        Ok(())
    }

    /// Removes the key at position `index` together with the child it leads to.
    pub fn remove(&mut self, index: usize) -> Result<(K, PageRef)> {
        if index >= self.keys.len() {
            return Err(StorageError::InvalidIndex {
                index,
                size: self.keys.len(),
            });
        }

        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        self.header.update_version();
        Ok((key, child))
    }

    pub fn set_key(&mut self, index: usize, key: K) -> Result<()> {
        let size = self.keys.len();
        let slot = self
            .keys
            .get_mut(index)
            .ok_or(StorageError::InvalidIndex { index, size })?;
        *slot = key;
        self.header.update_version();
        Ok(())
    }

    /// Moves the upper half of the children into a new page.
    ///
    /// Returns the promoted key (smallest key under the new page) and the page.
    pub fn split(&mut self, children: &ChildMeasures<T>) -> Result<(K, InnerPage<K, T>)> {
        let count = self.children.len();
        if count < 2 {
            return Err(StorageError::InvalidIndex {
                index: 1,
                size: count,
            });
        }
        let at = (self.capacity / 2).clamp(1, count - 1);

        let mut upper_children = Vec::with_capacity(self.capacity);
        upper_children.extend(self.children.drain(at..));
        let mut upper_keys = Vec::with_capacity(self.capacity);
        upper_keys.extend(self.keys.drain(at - 1..));
        let promoted = upper_keys.remove(0);

        let mut sibling = InnerPage {
            header: PageHeader::new(),
            keys: upper_keys,
            children: upper_children,
            capacity: self.capacity,
            measures: self.measures.clone(),
        };
        sibling.recalculate_measures(children)?;
        self.recalculate_measures(children)?;
        self.header.update_version();
        Ok((promoted, sibling))
    }

    /// Incrementally adds a change from below. Returns false when the caller
    /// must call [`recalculate_measures`](Self::recalculate_measures).
    pub fn add_to_measures(&mut self, delta: MeasureDelta<'_, T>) -> bool {
        self.measures.apply_add(delta)
    }

    /// Incrementally subtracts a change from below. Returns false when the
    /// caller must call [`recalculate_measures`](Self::recalculate_measures).
    pub fn subtract_from_measures(&mut self, delta: MeasureDelta<'_, T>) -> bool {
        self.measures.apply_subtract(delta)
    }

    /// Recomputes this page's measures from the measures of every child.
    pub fn recalculate_measures(&mut self, children: &ChildMeasures<T>) -> Result<()> {
        let sets = self
            .children
            .iter()
            .map(|child| measures_of(children, *child))
            .collect::<Result<Vec<_>>>()?;
        self.measures.aggregate(&sets);
        Ok(())
    }
}

impl<K: Clone, T> InnerPage<K, T> {
    /// Child whose key range contains the ray's boundary point.
    pub fn child_index_for_ray(
        &self,
        ray: &Ray<K>,
        configuration: &IndexConfiguration<K, T>,
    ) -> usize {
        let at_or_below = Ray::new(ray.point.clone(), Direction::Negative);
        match self.seek_ray(&at_or_below, configuration) {
            SeekResult::Exact(index) | SeekResult::Nearest(index) => index + 1,
            SeekResult::None => 0,
        }
    }

    /// Merges `other`, the right neighbour of this page, into this page.
    ///
    /// `separator` is the parent's key between the two pages. Returns true when
    /// `other` was fully absorbed and must be detached from the parent;
    /// otherwise children were rebalanced and `separator` now holds the key the
    /// parent must store for `other`.
    pub fn merge(
        &mut self,
        other: &mut InnerPage<K, T>,
        separator: &mut K,
        children: &ChildMeasures<T>,
    ) -> Result<bool> {
        let (own, theirs) = (self.children.len(), other.children.len());

        if own + theirs < self.capacity {
            self.keys.push(separator.clone());
            self.keys.append(&mut other.keys);
            self.children.append(&mut other.children);
            if !self.measures.add_set(&other.measures) {
                self.recalculate_measures(children)?;
            }
            other.measures.reset();
            self.header.update_version();
            other.header.update_version();
            return Ok(true);
        }

        let count = own.abs_diff(theirs) / 2;
        if count == 0 {
            return Ok(false);
        }

        let mut incremental = true;
        if own < theirs {
            let moved: Vec<PageRef> = other.children.drain(..count).collect();
            let mut moved_keys: Vec<K> = other.keys.drain(..count).collect();
            let next = moved_keys.pop().ok_or(StorageError::InvalidIndex {
                index: count,
                size: theirs,
            })?;
            self.keys.push(mem::replace(separator, next));
            self.keys.append(&mut moved_keys);

            for child in &moved {
                let set = measures_of(children, *child)?;
                incremental =
                    incremental && self.measures.add_set(set) && other.measures.subtract_set(set);
            }
            self.children.extend(moved);
        } else {
            let moved = self.children.split_off(own - count);
            let mut moved_keys = self.keys.split_off(own - count - 1);
            let next = moved_keys.remove(0);
            moved_keys.push(mem::replace(separator, next));
            moved_keys.append(&mut other.keys);
            other.keys = moved_keys;

            for child in &moved {
                let set = measures_of(children, *child)?;
                incremental =
                    incremental && other.measures.add_set(set) && self.measures.subtract_set(set);
            }
            other.children.splice(0..0, moved);
        }

        if !incremental {
            self.recalculate_measures(children)?;
            other.recalculate_measures(children)?;
        }
        self.header.update_version();
        other.header.update_version();
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::IndexConfigurationBuilder;
    use crate::measure::{MeasureResult, MinMeasure};
    use crate::seek::Entire;
    use pretty_assertions::assert_eq;

    fn configuration(page_size: usize) -> IndexConfiguration<i64, i64> {
        IndexConfigurationBuilder::new(|item: &i64| *item)
            .page_size(page_size)
            .measure(MinMeasure::new("Min", |v: &i64| *v))
            .build()
            .unwrap()
    }

    /// Inner page over children `#0..#n`, child `i` holding keys `10*i .. 10*i+4`.
    fn inner_with(
        configuration: &IndexConfiguration<i64, i64>,
        first_child: u64,
        children: u64,
    ) -> (InnerPage<i64, i64>, ChildMeasures<i64>) {
        let key_of = |child: u64| child as i64 * 10;
        let mut page = InnerPage::new(
            configuration,
            PageRef::new(first_child),
            key_of(first_child + 1),
            PageRef::new(first_child + 1),
        );
        for child in first_child + 2..first_child + children {
            let index = page.keys().len();
            page.insert(index, key_of(child), PageRef::new(child)).unwrap();
        }

        let mut snapshot = ChildMeasures::new();
        for child in first_child..first_child + children {
            let mut set = configuration.create_measure_set();
            let base = key_of(child);
            set.recalculate(&[base, base + 1, base + 2, base + 3, base + 4]);
            snapshot.insert(PageRef::new(child), set);
        }
        page.recalculate_measures(&snapshot).unwrap();
        (page, snapshot)
    }

    fn assert_consistent(page: &InnerPage<i64, i64>, snapshot: &ChildMeasures<i64>) {
        let mut fresh = page.measures().clone();
        let sets: Vec<&MeasureSet<i64>> = page.children().iter().map(|c| &snapshot[c]).collect();
        fresh.aggregate(&sets);
        assert_eq!(page.measures(), &fresh);
    }

    #[test]
    fn test_child_index_routes_by_separator() {
        let configuration = configuration(8);
        let (page, _) = inner_with(&configuration, 0, 4); // keys 10, 20, 30

        assert_eq!(page.child_index(&3, &configuration), 0);
        assert_eq!(page.child_index(&10, &configuration), 1);
        assert_eq!(page.child_index(&29, &configuration), 2);
        assert_eq!(page.child_index(&30, &configuration), 3);
        assert_eq!(page.child_index(&99, &configuration), 3);
        assert_eq!(page.seek(&20, &configuration), SeekResult::Exact(1));
        assert_eq!(page.seek(&35, &configuration), SeekResult::None);
    }

    #[test]
    fn test_child_index_for_ray() {
        let configuration = configuration(8);
        let (page, _) = inner_with(&configuration, 0, 4);

        let route = |point, direction| {
            page.child_index_for_ray(&Ray::new(point, direction), &configuration)
        };
        assert_eq!(route(Entire::below(20), Direction::Positive), 1);
        assert_eq!(route(Entire::exact(20), Direction::Positive), 2);
        assert_eq!(route(Entire::NegativeInfinity, Direction::Positive), 0);
        assert_eq!(route(Entire::PositiveInfinity, Direction::Negative), 3);
    }

    #[test]
    fn test_insert_and_remove_pairs() {
        let configuration = configuration(8);
        let (mut page, _) = inner_with(&configuration, 0, 3);
        let version = page.header().version();

        page.insert(1, 15, PageRef::new(9)).unwrap();
        assert_eq!(page.keys(), &[10, 15, 20]);
        assert_eq!(
            page.children(),
            &[PageRef::new(0), PageRef::new(1), PageRef::new(9), PageRef::new(2)]
        );

        let (key, child) = page.remove(1).unwrap();
        assert_eq!((key, child), (15, PageRef::new(9)));
        assert!(page.header().version() > version);
        assert!(page.remove(2).is_err());
        assert!(page.insert(3, 1, PageRef::new(5)).is_err());
    }

    #[test]
    fn test_split_promotes_middle_key() {
        let configuration = configuration(6);
        let (mut page, snapshot) = inner_with(&configuration, 0, 6); // keys 10..50

        let (promoted, sibling) = page.split(&snapshot).unwrap();

        assert_eq!(promoted, 30);
        assert_eq!(page.keys(), &[10, 20]);
        assert_eq!(sibling.keys(), &[40, 50]);
        assert_eq!(sibling.children(), &[PageRef::new(3), PageRef::new(4), PageRef::new(5)]);
        assert_eq!(sibling.measures().get("Min"), Some(MeasureResult::Value(30)));
        assert_consistent(&page, &snapshot);
        assert_consistent(&sibling, &snapshot);
    }

    #[test]
    fn test_split_then_merge_restores_page() {
        let configuration = configuration(8);
        let (mut page, snapshot) = inner_with(&configuration, 0, 7);
        let keys = page.keys().to_vec();
        let children = page.children().to_vec();
        let measures = page.measures().clone();

        let (mut separator, mut sibling) = page.split(&snapshot).unwrap();
        assert!(page.merge(&mut sibling, &mut separator, &snapshot).unwrap());

        assert_eq!(page.size(), 7);
        assert_eq!(sibling.size(), 0);
        assert_eq!(page.keys(), keys.as_slice());
        assert_eq!(page.children(), children.as_slice());
        assert_eq!(page.measures(), &measures);
    }

    #[test]
    fn test_merge_absorbs_neighbour() {
        let configuration = configuration(8);
        let (mut left, mut snapshot) = inner_with(&configuration, 0, 3);
        let (mut right, right_snapshot) = inner_with(&configuration, 3, 3);
        snapshot.extend(right_snapshot);
        let mut separator = 30;

        assert!(left.merge(&mut right, &mut separator, &snapshot).unwrap());
        assert_eq!(left.keys(), &[10, 20, 30, 40, 50]);
        assert_eq!(left.size(), 6);
        assert_eq!(right.size(), 0);
        assert_consistent(&left, &snapshot);
    }

    #[test]
    fn test_merge_rebalances_into_left() {
        let configuration = configuration(8);
        let (mut left, mut snapshot) = inner_with(&configuration, 0, 2);
        let (mut right, right_snapshot) = inner_with(&configuration, 2, 8);
        snapshot.extend(right_snapshot);
        let mut separator = 20;

        assert!(!left.merge(&mut right, &mut separator, &snapshot).unwrap());
        assert_eq!(left.size(), 5);
        assert_eq!(right.size(), 5);
        assert_eq!(left.keys(), &[10, 20, 30, 40]);
        assert_eq!(separator, 50);
        assert_eq!(right.keys(), &[60, 70, 80, 90]);
        assert_eq!(right.measures().get("Min"), Some(MeasureResult::Value(50)));
        assert_consistent(&left, &snapshot);
        assert_consistent(&right, &snapshot);
    }

    #[test]
    fn test_merge_rebalances_into_right() {
        let configuration = configuration(8);
        let (mut left, mut snapshot) = inner_with(&configuration, 0, 8);
        let (mut right, right_snapshot) = inner_with(&configuration, 8, 2);
        snapshot.extend(right_snapshot);
        let mut separator = 80;

        assert!(!left.merge(&mut right, &mut separator, &snapshot).unwrap());
        assert_eq!(left.keys(), &[10, 20, 30, 40]);
        assert_eq!(separator, 50);
        assert_eq!(right.keys(), &[60, 70, 80, 90]);
        assert_eq!(right.children().first(), Some(&PageRef::new(5)));
        assert_consistent(&left, &snapshot);
        assert_consistent(&right, &snapshot);
    }
}
