//! The ordered index: a descriptor page plus the tree of inner and leaf pages
//! it roots, all resolved through one [`PageProvider`].
//!
//! Every mutation descends from the root to a leaf, updates the leaf, pushes
//! the measure delta up the descent path and finally rebalances. The
//! descriptor's measures are refreshed from the root after each mutation.

mod reader;
mod tree;

pub use reader::IndexReader;

use crate::configuration::IndexConfiguration;
use crate::measure::{CountMeasure, Measure, MeasureDelta, MeasureResult, MeasureSet};
use crate::page::{DescriptorPage, InnerPage, LeafPage, Page, PageRef};
use crate::provider::PageProvider;
use crate::seek::{Direction, KeyRange, Ray, SeekResult};
use crate::{Result, StorageError};
use std::marker::PhantomData;
use std::sync::Arc;

/// Position of an item as found by a seek.
///
/// `version` is the leaf's version at seek time; a pointer is stale once the
/// leaf's current version differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemPointer {
    pub page: PageRef,
    pub index: usize,
    pub version: u64,
}

pub struct Index<K, T, P> {
    provider: P,
    descriptor: PageRef,
    _marker: PhantomData<fn() -> (K, T)>,
}

impl<K: Clone, T, P: PageProvider<K, T>> Index<K, T, P> {
    /// Registers a descriptor for `configuration` with the provider. The index
    /// still has to be initialized.
    pub fn new(mut provider: P, configuration: IndexConfiguration<K, T>) -> Result<Self> {
        let descriptor =
            provider.assign_identifier(Page::Descriptor(DescriptorPage::new(configuration)))?;
        Ok(Self {
            provider,
            descriptor,
            _marker: PhantomData,
        })
    }

    /// Registers and initializes a new index.
    pub fn create(provider: P, configuration: IndexConfiguration<K, T>) -> Result<Self> {
        let mut index = Self::new(provider, configuration)?;
        index.initialize()?;
        Ok(index)
    }

    /// Attaches to an index whose descriptor already lives in `provider`.
    pub fn open(provider: P, descriptor: PageRef) -> Result<Self> {
        provider.resolve(descriptor)?.as_descriptor()?;
        Ok(Self {
            provider,
            descriptor,
            _marker: PhantomData,
        })
    }

    pub fn initialize(&mut self) -> Result<()> {
        DescriptorPage::initialize(&mut self.provider, self.descriptor)
    }

    pub fn is_initialized(&self) -> bool {
        self.provider.is_initialized()
    }

    /// Adds a measure to an index that has not been initialized yet.
    pub fn add_measure(&mut self, measure: impl Measure<T> + 'static) -> Result<()> {
        DescriptorPage::add_measure(&mut self.provider, self.descriptor, Arc::new(measure))
    }

    /// Drops every item, leaving a single empty leaf.
    pub fn clear(&mut self) -> Result<()> {
        DescriptorPage::clear(&mut self.provider, self.descriptor)
    }

    pub fn descriptor_ref(&self) -> PageRef {
        self.descriptor
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    pub fn configuration(&self) -> Result<Arc<IndexConfiguration<K, T>>> {
        Ok(Arc::clone(self.descriptor_page()?.configuration()))
    }

    pub fn root(&self) -> Result<PageRef> {
        self.descriptor_page()?
            .root()
            .ok_or(StorageError::NotInitialized)
    }

    pub fn leftmost(&self) -> Result<PageRef> {
        self.descriptor_page()?
            .leftmost()
            .ok_or(StorageError::NotInitialized)
    }

    pub fn rightmost(&self) -> Result<PageRef> {
        self.descriptor_page()?
            .rightmost()
            .ok_or(StorageError::NotInitialized)
    }

    pub fn measures(&self) -> Result<&MeasureSet<T>> {
        let descriptor = self.descriptor_page()?;
        if !descriptor.is_initialized() {
            return Err(StorageError::NotInitialized);
        }
        Ok(descriptor.measures())
    }

    pub fn measure(&self, name: &str) -> Result<MeasureResult> {
        self.measures()?
            .get(name)
            .ok_or_else(|| StorageError::UnknownMeasure(name.to_string()))
    }

    pub fn len(&self) -> Result<usize> {
        let count = self.measure(CountMeasure::NAME)?.value().unwrap_or(0);
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Inserts `item`. Fails with [`StorageError::DuplicateKey`] if its key is present.
    pub fn add(&mut self, item: T) -> Result<()> {
        self.check_writable()?;
        let configuration = self.configuration()?;
        let key = configuration.extract_key(&item);

        let (mut path, mut leaf) = self.descend(&configuration, &key)?;
        let page = self.provider.resolve(leaf)?.as_leaf()?;
        if page.seek(&key, &configuration).is_exact() {
            return Err(StorageError::DuplicateKey);
        }
        if page.is_full() {
            self.split_leaf(&configuration, &path, leaf)?;
            (path, leaf) = self.descend(&configuration, &key)?;
        }

        let delta = configuration.measure_set_for(&item);
        let page = self.leaf_mut(leaf)?;
        let index = match page.seek(&key, &configuration) {
            SeekResult::Exact(_) => return Err(StorageError::DuplicateKey),
            SeekResult::Nearest(index) => index,
            SeekResult::None => page.size(),
        };
        page.insert(index, item)?;

        self.propagate_add(&path, MeasureDelta::Set(&delta))?;
        if let Some(filter) = self.descriptor_mut()?.bloom_filter_mut() {
            filter.insert(&key);
        }
        self.sync_measures()
    }

    /// Removes and returns the item stored under `key`, if any.
    pub fn remove(&mut self, key: &K) -> Result<Option<T>> {
        self.check_writable()?;
        let configuration = self.configuration()?;

        let (path, leaf) = self.descend(&configuration, key)?;
        let page = self.leaf_mut(leaf)?;
        let index = match page.seek(key, &configuration) {
            SeekResult::Exact(index) => index,
            _ => return Ok(None),
        };
        let item = page.remove(index)?;

        self.propagate_subtract(&path, MeasureDelta::Item(&item))?;
        self.rebalance(&configuration, &path, leaf)?;
        self.sync_measures()?;
        Ok(Some(item))
    }

    /// Stores `item`, returning the item it replaced.
    pub fn replace(&mut self, item: T) -> Result<Option<T>> {
        let key = self.configuration()?.extract_key(&item);
        let previous = self.remove(&key)?;
        self.add(item)?;
        Ok(previous)
    }

    pub fn get(&self, key: &K) -> Result<Option<&T>> {
        match self.seek(key)? {
            SeekResult::Exact(pointer) => self.item(pointer),
            _ => Ok(None),
        }
    }

    /// Consults the Bloom filter, when configured, before searching the tree.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        if let Some(filter) = self.descriptor_page()?.bloom_filter() {
            if !filter.may_contain(key) {
                return Ok(false);
            }
        }
        Ok(self.get(key)?.is_some())
    }

    /// Exact match, or the first item above `key`.
    pub fn seek(&self, key: &K) -> Result<SeekResult<ItemPointer>> {
        let configuration = self.configuration()?;
        let (_, leaf) = self.descend(&configuration, key)?;
        let page = self.provider.resolve(leaf)?.as_leaf()?;
        match page.seek(key, &configuration) {
            SeekResult::None => self.neighbour(page, Direction::Positive),
            found => Ok(found.map(|index| pointer(leaf, page, index))),
        }
    }

    /// Positions on the item at the ray's point, or the nearest one in its direction.
    pub fn seek_ray(&self, ray: &Ray<K>) -> Result<SeekResult<ItemPointer>> {
        let configuration = self.configuration()?;
        let (_, leaf) = self.descend_ray(&configuration, ray)?;
        let page = self.provider.resolve(leaf)?.as_leaf()?;
        match page.seek_ray(ray, &configuration) {
            SeekResult::None => self.neighbour(page, ray.direction),
            found => Ok(found.map(|index| pointer(leaf, page, index))),
        }
    }

    pub fn item(&self, pointer: ItemPointer) -> Result<Option<&T>> {
        Ok(self.provider.resolve(pointer.page)?.as_leaf()?.item(pointer.index))
    }

    /// Reads every item between the range boundaries, in the range's direction.
    pub fn read(&self, range: KeyRange<K>) -> Result<IndexReader<'_, K, T, P>> {
        let configuration = self.configuration()?;
        let direction = range.direction(|a, b| configuration.compare(a, b));
        let start = self
            .seek_ray(&Ray::new(range.first, direction))?
            .position();
        Ok(IndexReader::new(
            &self.provider,
            configuration,
            start,
            direction,
            range.second,
        ))
    }

    /// All items in ascending key order.
    pub fn iter(&self) -> Result<IndexReader<'_, K, T, P>> {
        self.read(KeyRange::full())
    }

    /// Computes measure `name` over the items of `range` only.
    pub fn measure_range(&self, range: KeyRange<K>, name: &str) -> Result<MeasureResult> {
        let mut measure = self.configuration()?.measure(name)?.create_new();
        let items = self.read(range)?.collect::<Result<Vec<&T>>>()?;
        measure.recalculate(&mut items.into_iter());
        Ok(measure.result())
    }

    /// Replaces the Bloom filter with one built from the current keys.
    pub fn rebuild_bloom_filter(&mut self) -> Result<()> {
        let configuration = self.configuration()?;
        let Some(mut filter) = configuration.create_bloom_filter(self.len()?) else {
            return Ok(());
        };
        let mut keys = 0usize;
        for item in self.iter()? {
            filter.insert(&configuration.extract_key(item?));
            keys += 1;
        }
        self.descriptor_mut()?.set_bloom_filter(Some(filter));
        log::debug!("Rebuilt bloom filter of index {} over {} keys", self.descriptor, keys);
        Ok(())
    }

    fn neighbour(
        &self,
        page: &LeafPage<T>,
        direction: Direction,
    ) -> Result<SeekResult<ItemPointer>> {
        let next = match direction {
            Direction::Positive => page.right(),
            Direction::Negative => page.left(),
        };
        let Some(next) = next else {
            return Ok(SeekResult::None);
        };
        let leaf = self.provider.resolve(next)?.as_leaf()?;
        let index = match direction {
            Direction::Positive => 0,
            Direction::Negative => leaf.size().saturating_sub(1),
        };
        if leaf.is_empty() {
            return Ok(SeekResult::None);
        }
        Ok(SeekResult::Nearest(pointer(next, leaf, index)))
    }

    fn check_writable(&self) -> Result<()> {
        if !self.provider.is_initialized() {
            return Err(StorageError::NotInitialized);
        }
        if self.provider.is_read_only() {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }

    fn sync_measures(&mut self) -> Result<()> {
        let root = self.root()?;
        let measures = self.provider.resolve(root)?.measures().clone();
        self.descriptor_mut()?.set_measures(measures);
        Ok(())
    }

    fn descriptor_page(&self) -> Result<&DescriptorPage<K, T>> {
        self.provider.resolve(self.descriptor)?.as_descriptor()
    }

    fn descriptor_mut(&mut self) -> Result<&mut DescriptorPage<K, T>> {
        self.provider.resolve_mut(self.descriptor)?.as_descriptor_mut()
    }

    fn leaf_mut(&mut self, reference: PageRef) -> Result<&mut LeafPage<T>> {
        self.provider.resolve_mut(reference)?.as_leaf_mut()
    }

    fn inner_mut(&mut self, reference: PageRef) -> Result<&mut InnerPage<K, T>> {
        self.provider.resolve_mut(reference)?.as_inner_mut()
    }
}

fn pointer<T>(page: PageRef, leaf: &LeafPage<T>, index: usize) -> ItemPointer {
    ItemPointer {
        page,
        index,
        version: leaf.header().version(),
    }
}
