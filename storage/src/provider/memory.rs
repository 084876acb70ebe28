use super::PageProvider;
use crate::page::{Page, PageRef};
use crate::{Result, StorageError};

/// Arena provider keeping every page in memory.
///
/// References are slot numbers and are never reused. Evicted pages leave an
/// empty slot until restored.
#[derive(Debug)]
pub struct MemoryPageProvider<K, T> {
    pages: Vec<Option<Page<K, T>>>,
    initialized: bool,
    read_only: bool,
}

impl<K, T> MemoryPageProvider<K, T> {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            initialized: false,
            read_only: false,
        }
    }

    /// Number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Takes a page out of the arena as if it had been written out and dropped.
    pub fn evict(&mut self, reference: PageRef) -> Result<Page<K, T>> {
        self.slot_mut(reference)?
            .take()
            .ok_or(StorageError::PageNotFound(reference))
    }

    /// Puts an evicted page back under its reference and marks it persisted.
    pub fn restore(&mut self, reference: PageRef, mut page: Page<K, T>) -> Result<()> {
        if page.reference() != Some(reference) {
            return Err(StorageError::PageNotFound(reference));
        }
        let slot = self.slot_mut(reference)?;
        if slot.is_some() {
            return Err(StorageError::ReferenceAlreadyAssigned(reference));
        }

        page.header_mut().mark_persisted();
        *slot = Some(page);
        log::trace!("Restored page {}", reference);
        Ok(())
    }

    fn slot_mut(&mut self, reference: PageRef) -> Result<&mut Option<Page<K, T>>> {
        usize::try_from(reference.id())
            .ok()
            .and_then(|index| self.pages.get_mut(index))
            .ok_or(StorageError::PageNotFound(reference))
    }
}

impl<K, T> Default for MemoryPageProvider<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> PageProvider<K, T> for MemoryPageProvider<K, T> {
    fn resolve(&self, reference: PageRef) -> Result<&Page<K, T>> {
        usize::try_from(reference.id())
            .ok()
            .and_then(|index| self.pages.get(index))
            .and_then(Option::as_ref)
            .ok_or(StorageError::PageNotFound(reference))
    }

    fn resolve_mut(&mut self, reference: PageRef) -> Result<&mut Page<K, T>> {
        self.slot_mut(reference)?
            .as_mut()
            .ok_or(StorageError::PageNotFound(reference))
    }

    fn resolve_pair_mut(
        &mut self,
        first: PageRef,
        second: PageRef,
    ) -> Result<(&mut Page<K, T>, &mut Page<K, T>)> {
        if first == second {
            return Err(StorageError::SamePage(first));
        }
        // Existence is checked before splitting the arena.
        self.resolve(first)?;
        self.resolve(second)?;

        let a = usize::try_from(first.id()).map_err(|_| StorageError::PageNotFound(first))?;
        let b = usize::try_from(second.id()).map_err(|_| StorageError::PageNotFound(second))?;
        let (low, high) = (a.min(b), a.max(b));
        let (head, tail) = self.pages.split_at_mut(high);
        let (low_page, high_page) = match (head[low].as_mut(), tail[0].as_mut()) {
            (Some(low_page), Some(high_page)) => (low_page, high_page),
            _ => return Err(StorageError::PageNotFound(if a < b { second } else { first })),
        };

        if a < b {
            Ok((low_page, high_page))
        } else {
            Ok((high_page, low_page))
        }
    }

    fn assign_identifier(&mut self, mut page: Page<K, T>) -> Result<PageRef> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let reference = PageRef::new(self.pages.len() as u64);
        page.header_mut().assign_reference(reference)?;
        self.pages.push(Some(page));
        Ok(reference)
    }

    fn release(&mut self, reference: PageRef) -> Result<Page<K, T>> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.evict(reference)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
