//! Page kinds of the index and the bookkeeping they share.
//!
//! Pages never point at each other directly: children, siblings and the
//! descriptor's root/leftmost/rightmost links are all [`PageRef`]s that a
//! [`PageProvider`](crate::PageProvider) resolves on demand.

mod descriptor;
mod inner;
mod leaf;

pub use descriptor::DescriptorPage;
pub use inner::{ChildMeasures, InnerPage};
pub use leaf::LeafPage;

use crate::measure::MeasureSet;
use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a page within a provider's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRef(u64);

impl PageRef {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageKind {
    Descriptor,
    Inner,
    Leaf,
}

/// Identity and version bookkeeping composed into every page kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageHeader {
    reference: Option<PageRef>, // assigned once by the provider
    version: u64,
    persisted: bool,
}

impl PageHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(&self) -> Option<PageRef> {
        self.reference
    }

    pub fn assign_reference(&mut self, reference: PageRef) -> Result<()> {
        if let Some(existing) = self.reference {
            return Err(StorageError::ReferenceAlreadyAssigned(existing));
        }
        self.reference = Some(reference);
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn update_version(&mut self) {
        self.version += 1;
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }
}

#[derive(Debug)]
pub enum Page<K, T> {
    Descriptor(DescriptorPage<K, T>),
    Inner(InnerPage<K, T>),
    Leaf(LeafPage<T>),
}

impl<K, T> Page<K, T> {
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Descriptor(_) => PageKind::Descriptor,
            Page::Inner(_) => PageKind::Inner,
            Page::Leaf(_) => PageKind::Leaf,
        }
    }

    pub fn header(&self) -> &PageHeader {
        match self {
            Page::Descriptor(page) => page.header(),
            Page::Inner(page) => page.header(),
            Page::Leaf(page) => page.header(),
        }
    }

    pub fn header_mut(&mut self) -> &mut PageHeader {
        match self {
            Page::Descriptor(page) => page.header_mut(),
            Page::Inner(page) => page.header_mut(),
            Page::Leaf(page) => page.header_mut(),
        }
    }

    pub fn reference(&self) -> Option<PageRef> {
        self.header().reference()
    }

    pub fn version(&self) -> u64 {
        self.header().version()
    }

    /// Aggregate of everything under this page (the whole index for a descriptor).
    pub fn measures(&self) -> &MeasureSet<T> {
        match self {
            Page::Descriptor(page) => page.measures(),
            Page::Inner(page) => page.measures(),
            Page::Leaf(page) => page.measures(),
        }
    }

    /// Occupancy: items of a leaf, children of an inner page, zero for a descriptor.
    pub fn size(&self) -> usize {
        match self {
            Page::Descriptor(_) => 0,
            Page::Inner(page) => page.size(),
            Page::Leaf(page) => page.size(),
        }
    }

    fn mismatch(&self, expected: PageKind) -> StorageError {
        StorageError::UnexpectedPageKind {
            page: self.reference(),
            expected,
            actual: self.kind(),
        }
    }

    pub fn as_leaf(&self) -> Result<&LeafPage<T>> {
        match self {
            Page::Leaf(page) => Ok(page),
            _ => Err(self.mismatch(PageKind::Leaf)),
        }
    }

    pub fn as_leaf_mut(&mut self) -> Result<&mut LeafPage<T>> {
        match self {
            Page::Leaf(page) => Ok(page),
            other => Err(other.mismatch(PageKind::Leaf)),
        }
    }

    pub fn as_inner(&self) -> Result<&InnerPage<K, T>> {
        match self {
            Page::Inner(page) => Ok(page),
            _ => Err(self.mismatch(PageKind::Inner)),
        }
    }

    pub fn as_inner_mut(&mut self) -> Result<&mut InnerPage<K, T>> {
        match self {
            Page::Inner(page) => Ok(page),
            other => Err(other.mismatch(PageKind::Inner)),
        }
    }

    pub fn as_descriptor(&self) -> Result<&DescriptorPage<K, T>> {
        match self {
            Page::Descriptor(page) => Ok(page),
            _ => Err(self.mismatch(PageKind::Descriptor)),
        }
    }

    pub fn as_descriptor_mut(&mut self) -> Result<&mut DescriptorPage<K, T>> {
        match self {
            Page::Descriptor(page) => Ok(page),
            other => Err(other.mismatch(PageKind::Descriptor)),
        }
    }
}
