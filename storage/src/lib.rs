//! Storage engine for Ordex
//!
//! This crate provides the page-management core of an ordered index:
//! descriptor, inner and leaf pages, their split/merge rebalancing,
//! incrementally maintained measures, and the provider indirection that
//! resolves page references to page instances.

pub mod configuration;
pub mod index;
pub mod measure;
pub mod page;
pub mod provider;
pub mod seek;
pub mod settings;

pub use configuration::{
    BloomFilter, BloomFilterFactory, IndexConfiguration, IndexConfigurationBuilder, KeyComparer,
    KeyExtractor,
};
pub use index::{Index, IndexReader, ItemPointer};
pub use measure::{
    CountMeasure, MaxMeasure, Measure, MeasureDelta, MeasureResult, MeasureSet, MinMeasure,
    SumMeasure,
};
pub use page::{DescriptorPage, InnerPage, LeafPage, Page, PageHeader, PageKind, PageRef};
pub use provider::{MemoryPageProvider, PageProvider};
pub use seek::{Direction, Entire, KeyRange, Ray, SeekResult, Shift};
pub use settings::IndexSettings;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Page {0} not found")]
    PageNotFound(PageRef),

    #[error("Page {page:?} is a {actual:?} page, expected {expected:?}")]
    UnexpectedPageKind {
        page: Option<PageRef>,
        expected: PageKind,
        actual: PageKind,
    },

    #[error("Page is full (capacity {capacity})")]
    PageFull { capacity: usize },

    #[error("Invalid index {index} for page of size {size}")]
    InvalidIndex { index: usize, size: usize },

    #[error("Page already has reference {0}")]
    ReferenceAlreadyAssigned(PageRef),

    #[error("Page {0} requested twice for a paired mutation")]
    SamePage(PageRef),

    #[error("Index is already initialized")]
    AlreadyInitialized,

    #[error("Index is not initialized")]
    NotInitialized,

    #[error("Page provider is read-only")]
    ReadOnly,

    #[error("An item with the same key already exists")]
    DuplicateKey,

    #[error("Measure {0:?} is already registered")]
    DuplicateMeasure(String),

    #[error("Measure {0:?} is not registered")]
    UnknownMeasure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, StorageError>;
