//! Structural maintenance: descent, split cascades, rebalancing and measure
//! propagation along a descent path.

use super::Index;
use crate::configuration::IndexConfiguration;
use crate::measure::MeasureDelta;
use crate::page::{ChildMeasures, InnerPage, Page, PageKind, PageRef};
use crate::provider::PageProvider;
use crate::seek::Ray;
use crate::{Result, StorageError};
use std::cmp::Ordering;

/// One inner page on the way down and the child index that was followed.
#[derive(Debug, Clone, Copy)]
pub(super) struct PathEntry {
    pub(super) page: PageRef,
    pub(super) child: usize,
}

type Descent = (Vec<PathEntry>, PageRef);

impl<K: Clone, T, P: PageProvider<K, T>> Index<K, T, P> {
    pub(super) fn descend(
        &self,
        configuration: &IndexConfiguration<K, T>,
        key: &K,
    ) -> Result<Descent> {
        self.descend_by(|inner| inner.child_index(key, configuration))
    }

    pub(super) fn descend_ray(
        &self,
        configuration: &IndexConfiguration<K, T>,
        ray: &Ray<K>,
    ) -> Result<Descent> {
        self.descend_by(|inner| inner.child_index_for_ray(ray, configuration))
    }

    fn descend_by(&self, route: impl Fn(&InnerPage<K, T>) -> usize) -> Result<Descent> {
        let mut path = Vec::new();
        let mut current = self.root()?;
        loop {
            match self.provider.resolve(current)? {
                Page::Leaf(_) => return Ok((path, current)),
                Page::Inner(inner) => {
                    let child = route(inner);
                    let next = inner.child(child).ok_or(StorageError::InvalidIndex {
                        index: child,
                        size: inner.size(),
                    })?;
                    path.push(PathEntry {
                        page: current,
                        child,
                    });
                    current = next;
                }
                page => {
                    return Err(StorageError::UnexpectedPageKind {
                        page: Some(current),
                        expected: PageKind::Inner,
                        actual: page.kind(),
                    })
                }
            }
        }
    }

    /// Clones the measure sets of every child of `inner`.
    fn child_measures(&self, inner: PageRef) -> Result<ChildMeasures<T>> {
        let page = self.provider.resolve(inner)?.as_inner()?;
        let mut snapshot = ChildMeasures::with_capacity(page.size());
        for &child in page.children() {
            snapshot.insert(child, self.provider.resolve(child)?.measures().clone());
        }
        Ok(snapshot)
    }

    fn recalculate_inner(&mut self, inner: PageRef) -> Result<()> {
        log::trace!("inner {}: delta not decomposable, recalculating", inner);
        let snapshot = self.child_measures(inner)?;
        self.inner_mut(inner)?.recalculate_measures(&snapshot)
    }

    pub(super) fn propagate_add(
        &mut self,
        path: &[PathEntry],
        delta: MeasureDelta<'_, T>,
    ) -> Result<()> {
        for entry in path.iter().rev() {
            if !self.inner_mut(entry.page)?.add_to_measures(delta) {
                self.recalculate_inner(entry.page)?;
            }
        }
        Ok(())
    }

    pub(super) fn propagate_subtract(
        &mut self,
        path: &[PathEntry],
        delta: MeasureDelta<'_, T>,
    ) -> Result<()> {
        for entry in path.iter().rev() {
            if !self.inner_mut(entry.page)?.subtract_from_measures(delta) {
                self.recalculate_inner(entry.page)?;
            }
        }
        Ok(())
    }

    /// Splits a full leaf and links the new sibling into the chain and the parent.
    pub(super) fn split_leaf(
        &mut self,
        configuration: &IndexConfiguration<K, T>,
        path: &[PathEntry],
        leaf: PageRef,
    ) -> Result<()> {
        let sibling = self.leaf_mut(leaf)?.split();
        let former_right = sibling.right();
        let separator = sibling
            .first_key(configuration)
            .ok_or(StorageError::InvalidIndex { index: 0, size: 0 })?;
        let sibling_ref = self.provider.assign_identifier(Page::Leaf(sibling))?;

        self.leaf_mut(leaf)?.set_right(Some(sibling_ref));
        match former_right {
            Some(right) => self.leaf_mut(right)?.set_left(Some(sibling_ref)),
            None => self.descriptor_mut()?.set_rightmost(sibling_ref),
        }

        log::debug!("Split leaf {} into {}", leaf, sibling_ref);
        self.insert_separator(configuration, path, leaf, separator, sibling_ref)
    }

    /// Adds `right` after `left` in their parent, splitting ancestors as needed.
    fn insert_separator(
        &mut self,
        configuration: &IndexConfiguration<K, T>,
        path: &[PathEntry],
        left: PageRef,
        separator: K,
        right: PageRef,
    ) -> Result<()> {
        let Some((entry, ancestors)) = path.split_last() else {
            return self.grow_root(configuration, left, separator, right);
        };
        if !self.provider.resolve(entry.page)?.as_inner()?.is_full() {
            return self.inner_mut(entry.page)?.insert(entry.child, separator, right);
        }

        let mut snapshot = self.child_measures(entry.page)?;
        snapshot.insert(right, self.provider.resolve(right)?.measures().clone());

        let parent = self.inner_mut(entry.page)?;
        let (promoted, mut upper) = parent.split(&snapshot)?;
        let lower_size = parent.size();
        if entry.child < lower_size {
            parent.insert(entry.child, separator, right)?;
            parent.recalculate_measures(&snapshot)?;
        } else {
            upper.insert(entry.child - lower_size, separator, right)?;
            upper.recalculate_measures(&snapshot)?;
        }
        let upper_ref = self.provider.assign_identifier(Page::Inner(upper))?;

        log::debug!("Split inner page {} into {}", entry.page, upper_ref);
        self.insert_separator(configuration, ancestors, entry.page, promoted, upper_ref)
    }

    fn grow_root(
        &mut self,
        configuration: &IndexConfiguration<K, T>,
        left: PageRef,
        separator: K,
        right: PageRef,
    ) -> Result<()> {
        let mut root = InnerPage::new(configuration, left, separator, right);
        let mut snapshot = ChildMeasures::with_capacity(2);
        for child in [left, right] {
            snapshot.insert(child, self.provider.resolve(child)?.measures().clone());
        }
        root.recalculate_measures(&snapshot)?;

        let root_ref = self.provider.assign_identifier(Page::Inner(root))?;
        self.descriptor_mut()?.set_root(root_ref);
        log::debug!("Grew new root {} over {} and {}", root_ref, left, right);
        Ok(())
    }

    /// Restores minimum fill after a removal from `leaf`, bottom-up along `path`.
    pub(super) fn rebalance(
        &mut self,
        configuration: &IndexConfiguration<K, T>,
        path: &[PathEntry],
        leaf: PageRef,
    ) -> Result<()> {
        let Some(parent) = path.last() else {
            return Ok(());
        };
        let min_fill = configuration.min_fill();

        let mut survives = true;
        if self.provider.resolve(leaf)?.size() < min_fill {
            survives = self.rebalance_leaf(configuration, parent, leaf)?;
        }
        if survives {
            self.refresh_separator(configuration, path, leaf)?;
        }

        for level in (1..path.len()).rev() {
            let node = path[level].page;
            if self.provider.resolve(node)?.size() >= min_fill {
                break;
            }
            self.rebalance_inner(&path[level - 1], node)?;
        }
        self.collapse_root()
    }

    /// Picks the left sibling when there is one, otherwise the right one.
    /// Returns `(left, right, separator index in parent)`.
    fn sibling_pair(
        &self,
        parent: &PathEntry,
        node: PageRef,
    ) -> Result<Option<(PageRef, PageRef, usize)>> {
        let page = self.provider.resolve(parent.page)?.as_inner()?;
        Ok(if parent.child > 0 {
            page.child(parent.child - 1)
                .map(|left| (left, node, parent.child - 1))
        } else {
            page.child(1).map(|right| (node, right, 0))
        })
    }

    /// Returns false when `leaf` was merged away into its left sibling.
    fn rebalance_leaf(
        &mut self,
        configuration: &IndexConfiguration<K, T>,
        parent: &PathEntry,
        leaf: PageRef,
    ) -> Result<bool> {
        let Some((left, right, key_index)) = self.sibling_pair(parent, leaf)? else {
            return Ok(true);
        };

        let (merged, third, separator) = {
            let (left_page, right_page) = self.provider.resolve_pair_mut(left, right)?;
            let (left_page, right_page) = (left_page.as_leaf_mut()?, right_page.as_leaf_mut()?);
            let merged = left_page.merge(right_page);
            (merged, left_page.right(), right_page.first_key(configuration))
        };

        if merged {
            match third {
                Some(third) => self.leaf_mut(third)?.set_left(Some(left)),
                None => self.descriptor_mut()?.set_rightmost(left),
            }
            self.inner_mut(parent.page)?.remove(key_index)?;
            self.provider.release(right)?;
            log::debug!("Merged leaf {} into {}", right, left);
            return Ok(right != leaf);
        }

        let separator = separator.ok_or(StorageError::InvalidIndex { index: 0, size: 0 })?;
        self.inner_mut(parent.page)?.set_key(key_index, separator)?;
        Ok(true)
    }

    /// Points the closest ancestor separator above `leaf` at its current first key.
    fn refresh_separator(
        &mut self,
        configuration: &IndexConfiguration<K, T>,
        path: &[PathEntry],
        leaf: PageRef,
    ) -> Result<()> {
        let Some(first) = self.provider.resolve(leaf)?.as_leaf()?.first_key(configuration) else {
            return Ok(());
        };
        let Some(entry) = path.iter().rev().find(|entry| entry.child > 0) else {
            return Ok(());
        };

        let inner = self.inner_mut(entry.page)?;
        let index = entry.child - 1;
        let stale = inner
            .key(index)
            .is_some_and(|key| configuration.compare(key, &first) != Ordering::Equal);
        if stale {
            inner.set_key(index, first)?;
        }
        Ok(())
    }

    fn rebalance_inner(&mut self, parent: &PathEntry, node: PageRef) -> Result<()> {
        let Some((left, right, key_index)) = self.sibling_pair(parent, node)? else {
            return Ok(());
        };

        let mut snapshot = self.child_measures(left)?;
        snapshot.extend(self.child_measures(right)?);
        let mut separator = self
            .provider
            .resolve(parent.page)?
            .as_inner()?
            .key(key_index)
            .cloned()
            .ok_or(StorageError::InvalidIndex {
                index: key_index,
                size: 0,
            })?;

        let merged = {
            let (left_page, right_page) = self.provider.resolve_pair_mut(left, right)?;
            left_page
                .as_inner_mut()?
                .merge(right_page.as_inner_mut()?, &mut separator, &snapshot)?
        };

        let parent_page = self.inner_mut(parent.page)?;
        if merged {
            parent_page.remove(key_index)?;
            self.provider.release(right)?;
            log::debug!("Merged inner page {} into {}", right, left);
        } else {
            parent_page.set_key(key_index, separator)?;
        }
        Ok(())
    }

    /// Replaces an inner root that has a single child by that child.
    fn collapse_root(&mut self) -> Result<()> {
        loop {
            let root = self.root()?;
            let only_child = match self.provider.resolve(root)? {
                Page::Inner(inner) if inner.size() == 1 => inner.child(0),
                _ => None,
            };
            let Some(child) = only_child else {
                return Ok(());
            };

            self.provider.release(root)?;
            self.descriptor_mut()?.set_root(child);
            log::debug!("Collapsed root {} into {}", root, child);
        }
    }
}
