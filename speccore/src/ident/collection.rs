use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::CollectionError;
use crate::ident::identifier::Identifier;

/// Capability the selector parser resolves identifiers against.
///
/// Anything owning a set of addressable objects implements this; the
/// parser holds no storage of its own. `next_id`/`prev_id` are relative to
/// the active identifier.
pub trait IdManager {
    /// All live identifiers, in order.
    fn ids(&self) -> Vec<Identifier>;
    fn active_id(&self) -> Option<Identifier>;
    fn next_id(&self) -> Option<Identifier>;
    fn prev_id(&self) -> Option<Identifier>;
    fn first_id(&self) -> Option<Identifier>;
    fn last_id(&self) -> Option<Identifier>;
    /// The currently visible subset, in order.
    fn visible(&self) -> Vec<Identifier>;

    fn contains(&self, id: &Identifier) -> bool {
        self.ids().contains(id)
    }
}

/// Ordered set of objects keyed by [`Identifier`], with an active object
/// and a visible subset.
///
/// Callers sharing one collection between threads must hold a single lock
/// around any "resolve ids, then mutate" sequence.
#[derive(Clone, Debug)]
pub struct Collection<T> {
    objects: BTreeMap<Identifier, T>,
    active: Option<Identifier>,
    visible: BTreeSet<Identifier>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection {
            objects: BTreeMap::new(),
            active: None,
            visible: BTreeSet::new(),
        }
    }
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: &Identifier) -> Option<&T> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: &Identifier) -> Option<&mut T> {
        self.objects.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &T)> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Identifier, &mut T)> {
        self.objects.iter_mut()
    }

    /// Lowest major id not taken by a top-level object.
    pub fn free_id(&self) -> Identifier {
        let taken: BTreeSet<u32> = self
            .objects
            .keys()
            .filter(|id| id.minor.is_none())
            .filter_map(|id| id.major)
            .collect();
        let major = (0..).find(|m| !taken.contains(m)).unwrap_or(0);
        Identifier::major(major)
    }

    /// Lowest minor id not taken below `major`.
    pub fn free_child_id(&self, major: u32) -> Identifier {
        let taken: BTreeSet<u32> = self
            .objects
            .keys()
            .filter(|id| id.major == Some(major))
            .filter_map(|id| id.minor)
            .collect();
        let minor = (0..).find(|m| !taken.contains(m)).unwrap_or(0);
        Identifier::child(major, minor)
    }

    /// Stores `obj` under the lowest free major id and returns that id.
    pub fn add(&mut self, obj: T) -> Identifier {
        let id = self.free_id();
        self.objects.insert(id, obj);
        debug!(%id, "added object");
        id
    }

    /// Stores `obj` below `major` under the lowest free minor id.
    pub fn add_child(&mut self, major: u32, obj: T) -> Identifier {
        let id = self.free_child_id(major);
        self.objects.insert(id, obj);
        debug!(%id, "added child object");
        id
    }

    /// Stores `obj` under `id`, returning the object it replaced.
    pub fn insert(&mut self, id: Identifier, obj: T) -> Option<T> {
        self.objects.insert(id, obj)
    }

    pub fn remove(&mut self, id: &Identifier) -> Result<T, CollectionError> {
        let obj = self.objects.remove(id).ok_or(CollectionError::NoSuchId(*id))?;
        self.visible.remove(id);
        if self.active == Some(*id) {
            self.active = None;
        }
        debug!(%id, "removed object");
        Ok(obj)
    }

    /// Removes every id in `ids` that is live and returns the removed objects.
    /// Unknown ids are skipped.
    pub fn remove_all(&mut self, ids: &[Identifier]) -> Vec<(Identifier, T)> {
        ids.iter()
            .filter_map(|id| self.remove(id).ok().map(|obj| (*id, obj)))
            .collect()
    }

    pub fn activate(&mut self, id: &Identifier) -> Result<(), CollectionError> {
        if !self.objects.contains_key(id) {
            return Err(CollectionError::NoSuchId(*id));
        }
        self.active = Some(*id);
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&T> {
        self.active.as_ref().and_then(|id| self.objects.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut T> {
        match self.active {
            Some(id) => self.objects.get_mut(&id),
            None => None,
        }
    }

    pub fn is_visible(&self, id: &Identifier) -> bool {
        self.visible.contains(id)
    }

    /// Marks the live ids among `ids` visible.
    pub fn show(&mut self, ids: &[Identifier]) {
        for id in ids {
            if self.objects.contains_key(id) {
                self.visible.insert(*id);
            }
        }
    }

    pub fn hide(&mut self, ids: &[Identifier]) {
        for id in ids {
            self.visible.remove(id);
        }
    }

    pub fn show_all(&mut self) {
        self.visible = self.objects.keys().copied().collect();
    }

    pub fn hide_all(&mut self) {
        self.visible.clear();
    }

    /// Makes `id` the only visible object and activates it.
    pub fn show_only(&mut self, id: &Identifier) -> Result<(), CollectionError> {
        self.activate(id)?;
        self.visible.clear();
        self.visible.insert(*id);
        Ok(())
    }

    pub fn show_next(&mut self) -> Option<Identifier> {
        let id = self.next_id()?;
        self.show_only(&id).ok().map(|_| id)
    }

    pub fn show_prev(&mut self) -> Option<Identifier> {
        let id = self.prev_id()?;
        self.show_only(&id).ok().map(|_| id)
    }

    pub fn show_first(&mut self) -> Option<Identifier> {
        let id = self.first_id()?;
        self.show_only(&id).ok().map(|_| id)
    }

    pub fn show_last(&mut self) -> Option<Identifier> {
        let id = self.last_id()?;
        self.show_only(&id).ok().map(|_| id)
    }
}

impl<T> IdManager for Collection<T> {
    fn ids(&self) -> Vec<Identifier> {
        self.objects.keys().copied().collect()
    }

    fn active_id(&self) -> Option<Identifier> {
        self.active
    }

    /// Smallest id after the active one, wrapping around to the first.
    fn next_id(&self) -> Option<Identifier> {
        match self.active {
            Some(active) => self
                .objects
                .range((std::ops::Bound::Excluded(active), std::ops::Bound::Unbounded))
                .next()
                .map(|(id, _)| *id)
                .or_else(|| self.first_id()),
            None => self.first_id(),
        }
    }

    /// Largest id before the active one, wrapping around to the last.
    fn prev_id(&self) -> Option<Identifier> {
        match self.active {
            Some(active) => self
                .objects
                .range(..active)
                .next_back()
                .map(|(id, _)| *id)
                .or_else(|| self.last_id()),
            None => self.last_id(),
        }
    }

    fn first_id(&self) -> Option<Identifier> {
        self.objects.keys().next().copied()
    }

    fn last_id(&self) -> Option<Identifier> {
        self.objects.keys().next_back().copied()
    }

    fn visible(&self) -> Vec<Identifier> {
        self.visible.iter().copied().collect()
    }

    fn contains(&self, id: &Identifier) -> bool {
        self.objects.contains_key(id)
    }
}
