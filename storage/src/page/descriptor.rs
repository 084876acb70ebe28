use super::{LeafPage, Page, PageHeader, PageRef};
use crate::configuration::{BloomFilter, IndexConfiguration};
use crate::measure::{Measure, MeasureSet};
use crate::provider::PageProvider;
use crate::{Result, StorageError};
use std::fmt;
use std::sync::Arc;

/// Entry point of one index: its configuration, the root and the two ends
/// of the leaf chain, the index-wide measures and the optional Bloom filter.
pub struct DescriptorPage<K, T> {
    header: PageHeader,
    configuration: Arc<IndexConfiguration<K, T>>,
    root: Option<PageRef>,
    leftmost: Option<PageRef>,
    rightmost: Option<PageRef>,
    measures: MeasureSet<T>,
    bloom_filter: Option<Box<dyn BloomFilter<K>>>,
}

impl<K, T> DescriptorPage<K, T> {
    pub fn new(configuration: IndexConfiguration<K, T>) -> Self {
        let measures = configuration.create_measure_set();
        Self {
            header: PageHeader::new(),
            configuration: Arc::new(configuration),
            root: None,
            leftmost: None,
            rightmost: None,
            measures,
            bloom_filter: None,
        }
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut PageHeader {
        &mut self.header
    }

    pub fn configuration(&self) -> &Arc<IndexConfiguration<K, T>> {
        &self.configuration
    }

    pub fn root(&self) -> Option<PageRef> {
        self.root
    }

    pub fn leftmost(&self) -> Option<PageRef> {
        self.leftmost
    }

    pub fn rightmost(&self) -> Option<PageRef> {
        self.rightmost
    }

    pub fn set_root(&mut self, root: PageRef) {
        self.root = Some(root);
        self.header.update_version();
    }

    pub fn set_leftmost(&mut self, leftmost: PageRef) {
        self.leftmost = Some(leftmost);
        self.header.update_version();
    }

    pub fn set_rightmost(&mut self, rightmost: PageRef) {
        self.rightmost = Some(rightmost);
        self.header.update_version();
    }

    /// Index-wide aggregate; mirrors the root's measures.
    pub fn measures(&self) -> &MeasureSet<T> {
        &self.measures
    }

    pub fn set_measures(&mut self, measures: MeasureSet<T>) {
        self.measures = measures;
        self.header.update_version();
    }

    pub fn bloom_filter(&self) -> Option<&dyn BloomFilter<K>> {
        self.bloom_filter.as_deref()
    }

    pub fn bloom_filter_mut(&mut self) -> Option<&mut (dyn BloomFilter<K> + 'static)> {
        self.bloom_filter.as_deref_mut()
    }

    pub fn set_bloom_filter(&mut self, bloom_filter: Option<Box<dyn BloomFilter<K>>>) {
        self.bloom_filter = bloom_filter;
        self.header.update_version();
    }

    pub fn is_initialized(&self) -> bool {
        self.root.is_some()
    }

    /// Creates the single empty leaf of a fresh index and marks the provider initialized.
    pub fn initialize<P: PageProvider<K, T>>(provider: &mut P, descriptor: PageRef) -> Result<()> {
        if provider.is_initialized() {
            return Err(StorageError::AlreadyInitialized);
        }

        let configuration =
            Arc::clone(provider.resolve(descriptor)?.as_descriptor()?.configuration());
        let leaf = provider.assign_identifier(Page::Leaf(LeafPage::new(&configuration)))?;

        let page = provider.resolve_mut(descriptor)?.as_descriptor_mut()?;
        page.root = Some(leaf);
        page.leftmost = Some(leaf);
        page.rightmost = Some(leaf);
        page.measures = configuration.create_measure_set();
        page.bloom_filter = configuration.create_bloom_filter(0);
        page.header.update_version();
        provider.set_initialized(true);

        log::debug!("Initialized index {} with root leaf {}", descriptor, leaf);
        Ok(())
    }

    /// Releases every page of the tree and starts over with a single empty leaf.
    pub fn clear<P: PageProvider<K, T>>(provider: &mut P, descriptor: PageRef) -> Result<()> {
        if provider.is_read_only() {
            return Err(StorageError::ReadOnly);
        }

        let root = provider.resolve(descriptor)?.as_descriptor()?.root();
        let mut pending: Vec<PageRef> = root.into_iter().collect();
        let mut released = 0usize;
        while let Some(reference) = pending.pop() {
            if let Page::Inner(inner) = provider.release(reference)? {
                pending.extend_from_slice(inner.children());
            }
            released += 1;
        }

        let page = provider.resolve_mut(descriptor)?.as_descriptor_mut()?;
        page.root = None;
        page.leftmost = None;
        page.rightmost = None;
        page.header.update_version();
        provider.set_initialized(false);

        log::debug!("Cleared index {}, released {} pages", descriptor, released);
        Self::initialize(provider, descriptor)
    }

    /// Registers another measure. Only allowed before the index is initialized.
    pub fn add_measure<P: PageProvider<K, T>>(
        provider: &mut P,
        descriptor: PageRef,
        measure: Arc<dyn Measure<T>>,
    ) -> Result<()> {
        if provider.is_initialized() {
            return Err(StorageError::AlreadyInitialized);
        }

        let page = provider.resolve_mut(descriptor)?.as_descriptor_mut()?;
        Arc::make_mut(&mut page.configuration).add_measure(measure)?;
        page.measures = page.configuration.create_measure_set();
        page.header.update_version();
        Ok(())
    }
}

impl<K, T> fmt::Debug for DescriptorPage<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorPage")
            .field("header", &self.header)
            .field("configuration", &self.configuration)
            .field("root", &self.root)
            .field("leftmost", &self.leftmost)
            .field("rightmost", &self.rightmost)
            .field("measures", &self.measures.results())
            .field("bloom_filter", &self.bloom_filter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::IndexConfigurationBuilder;
    use crate::measure::{MeasureResult, SumMeasure};
    use crate::provider::MemoryPageProvider;

    fn provider_with_descriptor() -> (MemoryPageProvider<i64, i64>, PageRef) {
        let configuration = IndexConfigurationBuilder::new(|item: &i64| *item)
            .page_size(4)
            .build()
            .unwrap();
        let mut provider = MemoryPageProvider::new();
        let descriptor = provider
            .assign_identifier(Page::Descriptor(DescriptorPage::new(configuration)))
            .unwrap();
        (provider, descriptor)
    }

    fn descriptor(
        provider: &MemoryPageProvider<i64, i64>,
        reference: PageRef,
    ) -> &DescriptorPage<i64, i64> {
        provider.resolve(reference).unwrap().as_descriptor().unwrap()
    }

    #[test]
    fn test_initialize_creates_single_leaf() {
        let (mut provider, reference) = provider_with_descriptor();

        DescriptorPage::initialize(&mut provider, reference).unwrap();

        let page = descriptor(&provider, reference);
        assert!(page.is_initialized());
        assert_eq!(page.root(), page.leftmost());
        assert_eq!(page.root(), page.rightmost());
        let leaf = provider.resolve(page.root().unwrap()).unwrap().as_leaf().unwrap();
        assert!(leaf.is_empty());
        assert!(provider.is_initialized());
    }

    #[test]
    fn test_initialize_twice_fails() {
        let (mut provider, reference) = provider_with_descriptor();
        DescriptorPage::initialize(&mut provider, reference).unwrap();

        let err = DescriptorPage::initialize(&mut provider, reference).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyInitialized));
    }

    #[test]
    fn test_add_measure_only_before_initialize() {
        let (mut provider, reference) = provider_with_descriptor();
        let sum: Arc<dyn Measure<i64>> = Arc::new(SumMeasure::new("Sum", |v: &i64| *v));

        DescriptorPage::add_measure(&mut provider, reference, Arc::clone(&sum)).unwrap();
        let duplicate = DescriptorPage::add_measure(&mut provider, reference, Arc::clone(&sum));
        assert!(matches!(duplicate, Err(StorageError::DuplicateMeasure(_))));

        DescriptorPage::initialize(&mut provider, reference).unwrap();
        let late = DescriptorPage::add_measure(&mut provider, reference, sum);
        assert!(matches!(late, Err(StorageError::AlreadyInitialized)));

        let page = descriptor(&provider, reference);
        assert_eq!(page.configuration().measures().len(), 2);
        assert_eq!(page.measures().get("Sum"), Some(MeasureResult::Value(0)));
    }

    #[test]
    fn test_clear_replaces_root() {
        let (mut provider, reference) = provider_with_descriptor();
        DescriptorPage::initialize(&mut provider, reference).unwrap();
        let old_root = descriptor(&provider, reference).root().unwrap();

        DescriptorPage::clear(&mut provider, reference).unwrap();

        let new_root = descriptor(&provider, reference).root().unwrap();
        assert_ne!(old_root, new_root);
        assert!(matches!(provider.resolve(old_root), Err(StorageError::PageNotFound(_))));
    }

    #[test]
    fn test_setters_bump_version() {
        let (mut provider, reference) = provider_with_descriptor();
        let page = provider.resolve_mut(reference).unwrap().as_descriptor_mut().unwrap();

        let version = page.header().version();
        let measures = page.measures().clone();
        page.set_measures(measures);
        assert!(page.header().version() > version);

        let version = page.header().version();
        page.set_bloom_filter(None);
        assert!(page.header().version() > version);
    }

    #[test]
    fn test_clear_rejected_when_read_only() {
        let (mut provider, reference) = provider_with_descriptor();
        DescriptorPage::initialize(&mut provider, reference).unwrap();
        provider.set_read_only(true);

        let err = DescriptorPage::clear(&mut provider, reference).unwrap_err();
        assert!(matches!(err, StorageError::ReadOnly));
    }
}
