//! Index-wide configuration shared by every page of one index.

use crate::measure::{CountMeasure, Measure, MeasureSet};
use crate::seek::Entire;
use crate::settings::IndexSettings;
use crate::{Result, StorageError};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Smallest page size that still leaves room to split and merge.
pub const MIN_PAGE_SIZE: usize = 4;

pub const DEFAULT_PAGE_SIZE: usize = 64;

pub const DEFAULT_BLOOM_FILTER_CAPACITY: usize = 1024;

pub type KeyComparer<K> = Arc<dyn Fn(&K, &K) -> Ordering>;

pub type KeyExtractor<K, T> = Arc<dyn Fn(&T) -> K>;

/// Builds an empty filter sized for the expected number of keys.
pub type BloomFilterFactory<K> = Arc<dyn Fn(usize) -> Box<dyn BloomFilter<K>>>;

/// Probabilistic set of keys. A negative answer is definite, a positive one is a hint.
pub trait BloomFilter<K>: fmt::Debug {
    fn insert(&mut self, key: &K);

    fn may_contain(&self, key: &K) -> bool;
}

pub struct IndexConfiguration<K, T> {
    page_size: usize,
    comparer: KeyComparer<K>,
    key_extractor: KeyExtractor<K, T>,
    measures: Vec<Arc<dyn Measure<T>>>,
    bloom_filter_factory: Option<BloomFilterFactory<K>>,
    bloom_filter_capacity: usize,
}

impl<K, T> IndexConfiguration<K, T> {
    /// Maximum number of items in a leaf and of children in an inner page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages below this size are merged or rebalanced with a sibling.
    pub fn min_fill(&self) -> usize {
        self.page_size / 2
    }

    pub fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.comparer)(a, b)
    }

    pub fn asymmetric_compare(&self, boundary: &Entire<K>, key: &K) -> Ordering {
        boundary.compare_key(key, |a, b| self.compare(a, b))
    }

    pub fn extract_key(&self, item: &T) -> K {
        (self.key_extractor)(item)
    }

    pub fn comparer(&self) -> &KeyComparer<K> {
        &self.comparer
    }

    pub fn measures(&self) -> &[Arc<dyn Measure<T>>] {
        &self.measures
    }

    pub fn measure(&self, name: &str) -> Result<&Arc<dyn Measure<T>>> {
        self.measures
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| StorageError::UnknownMeasure(name.to_string()))
    }

    pub fn create_measure_set(&self) -> MeasureSet<T> {
        MeasureSet::from_prototypes(&self.measures)
    }

    /// Measure set holding exactly one item, used as an upward delta.
    pub fn measure_set_for(&self, item: &T) -> MeasureSet<T> {
        let mut set = self.create_measure_set();
        if !set.add(item) {
            set.recalculate(std::slice::from_ref(item));
        }
        set
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom_filter_factory.is_some()
    }

    pub fn bloom_filter_capacity(&self) -> usize {
        self.bloom_filter_capacity
    }

    pub fn create_bloom_filter(&self, expected_keys: usize) -> Option<Box<dyn BloomFilter<K>>> {
        self.bloom_filter_factory
            .as_ref()
            .map(|factory| factory(expected_keys.max(self.bloom_filter_capacity)))
    }

    pub(crate) fn add_measure(&mut self, measure: Arc<dyn Measure<T>>) -> Result<()> {
        if self.measures.iter().any(|m| m.name() == measure.name()) {
            return Err(StorageError::DuplicateMeasure(measure.name().to_string()));
        }
        self.measures.push(measure);
        Ok(())
    }
}

impl<K, T> Clone for IndexConfiguration<K, T> {
    fn clone(&self) -> Self {
        Self {
            page_size: self.page_size,
            comparer: Arc::clone(&self.comparer),
            key_extractor: Arc::clone(&self.key_extractor),
            measures: self.measures.clone(),
            bloom_filter_factory: self.bloom_filter_factory.clone(),
            bloom_filter_capacity: self.bloom_filter_capacity,
        }
    }
}

impl<K, T> fmt::Debug for IndexConfiguration<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.measures.iter().map(|m| m.name()).collect();
        f.debug_struct("IndexConfiguration")
            .field("page_size", &self.page_size)
            .field("measures", &names)
            .field("bloom_filter", &self.has_bloom_filter())
            .field("bloom_filter_capacity", &self.bloom_filter_capacity)
            .finish()
    }
}

pub struct IndexConfigurationBuilder<K, T> {
    page_size: usize,
    comparer: KeyComparer<K>,
    key_extractor: KeyExtractor<K, T>,
    measures: Vec<Arc<dyn Measure<T>>>,
    bloom_filter_factory: Option<BloomFilterFactory<K>>,
    bloom_filter_capacity: usize,
}

impl<K: Ord + 'static, T: 'static> IndexConfigurationBuilder<K, T> {
    /// Builder ordering keys by their `Ord` implementation.
    pub fn new(key_extractor: impl Fn(&T) -> K + 'static) -> Self {
        Self::with_comparer(key_extractor, |a: &K, b: &K| a.cmp(b))
    }
}

impl<K: 'static, T: 'static> IndexConfigurationBuilder<K, T> {
    pub fn with_comparer(
        key_extractor: impl Fn(&T) -> K + 'static,
        comparer: impl Fn(&K, &K) -> Ordering + 'static,
    ) -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            comparer: Arc::new(comparer),
            key_extractor: Arc::new(key_extractor),
            measures: Vec::new(),
            bloom_filter_factory: None,
            bloom_filter_capacity: DEFAULT_BLOOM_FILTER_CAPACITY,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn measure(mut self, measure: impl Measure<T> + 'static) -> Self {
        self.measures.push(Arc::new(measure));
        self
    }

    pub fn bloom_filter(
        mut self,
        factory: impl Fn(usize) -> Box<dyn BloomFilter<K>> + 'static,
    ) -> Self {
        self.bloom_filter_factory = Some(Arc::new(factory));
        self
    }

    /// Applies file/environment settings on top of the builder.
    pub fn settings(mut self, settings: &IndexSettings) -> Self {
        self.page_size = settings.page_size;
        self.bloom_filter_capacity = settings.bloom_filter_capacity;
        self
    }

    pub fn build(self) -> Result<IndexConfiguration<K, T>> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(StorageError::InvalidConfiguration(format!(
                "page size {} is below the minimum of {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }

        let mut configuration = IndexConfiguration {
            page_size: self.page_size,
            comparer: self.comparer,
            key_extractor: self.key_extractor,
            measures: Vec::with_capacity(self.measures.len() + 1),
            bloom_filter_factory: self.bloom_filter_factory,
            bloom_filter_capacity: self.bloom_filter_capacity,
        };

        if !self
            .measures
            .iter()
            .any(|m| m.name() == CountMeasure::NAME)
        {
            configuration.add_measure(Arc::new(CountMeasure::new()))?;
        }
        for measure in self.measures {
            configuration.add_measure(measure)?;
        }

        Ok(configuration)
    }
}
