//! Resolution of page references to page instances.
//!
//! The tree only ever stores [`PageRef`]s; every access goes through a
//! [`PageProvider`], which owns the pages and is free to evict and rehydrate
//! them between calls as long as references and versions are preserved.

mod memory;

pub use memory::MemoryPageProvider;

use crate::page::{Page, PageRef};
use crate::Result;

pub trait PageProvider<K, T> {
    fn resolve(&self, reference: PageRef) -> Result<&Page<K, T>>;

    fn resolve_mut(&mut self, reference: PageRef) -> Result<&mut Page<K, T>>;

    /// Two distinct pages mutably at once, for split and merge.
    fn resolve_pair_mut(
        &mut self,
        first: PageRef,
        second: PageRef,
    ) -> Result<(&mut Page<K, T>, &mut Page<K, T>)>;

    /// Takes ownership of a new page and assigns its reference.
    fn assign_identifier(&mut self, page: Page<K, T>) -> Result<PageRef>;

    /// Removes a page that is no longer part of the index.
    fn release(&mut self, reference: PageRef) -> Result<Page<K, T>>;

    fn is_initialized(&self) -> bool;

    fn set_initialized(&mut self, initialized: bool);

    fn is_read_only(&self) -> bool {
        false
    }
}
