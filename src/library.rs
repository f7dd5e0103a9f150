//! In-memory library: rasters, pending placeholders, collections and failure records.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::model::{FailureRecord, ImportJob, LibrarySnapshot, Raster, Visualisation};
use crate::projector::StateChange;

/// Library shared by the tracker, the worker and the UI.
pub type SharedLibrary = Arc<Mutex<Library>>;

/// A library row: either a finished raster or the placeholder of a pending import.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Placeholder(ImportJob),
    Raster(Raster),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Placeholder(job) => &job.import_id,
            Entity::Raster(r) => &r.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Placeholder(job) => &job.name,
            Entity::Raster(r) => &r.name,
        }
    }

    /// Modification time in epoch millis, used for ordering.
    pub fn modified_ms(&self) -> i64 {
        match self {
            Entity::Placeholder(job) => job.modified_at.timestamp_millis(),
            Entity::Raster(r) => r.modified.or(r.created).unwrap_or(0),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Entity::Placeholder(_))
    }
}

/// A collection with its permanent members and the placeholders provisionally in it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub title: String,
    pub entities: BTreeSet<String>,
    pub temporary: BTreeSet<String>,
}

impl Collection {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Library {
    entities: BTreeMap<String, Entity>,
    collections: BTreeMap<String, Collection>,
    visualisations: BTreeMap<String, Visualisation>,
    failures: BTreeMap<String, FailureRecord>,
    /// Bumped on every local materialisation or permanent membership.
    generation: u64,
    /// Raster ids materialised locally, with the generation they appeared at.
    local_rasters: BTreeMap<String, u64>,
    /// `(collection_id, entity_id)` memberships added locally.
    local_members: BTreeMap<(String, String), u64>,
}

impl Library {
    pub fn shared() -> SharedLibrary {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn placeholder(&self, import_id: &str) -> Option<&ImportJob> {
        match self.entities.get(import_id) {
            Some(Entity::Placeholder(job)) => Some(job),
            _ => None,
        }
    }

    pub fn raster(&self, id: &str) -> Option<&Raster> {
        match self.entities.get(id) {
            Some(Entity::Raster(r)) => Some(r),
            _ => None,
        }
    }

    /// Entities ordered newest first.
    pub fn entities(&self) -> Vec<&Entity> {
        let mut v: Vec<&Entity> = self.entities.values().collect();
        v.sort_by(|a, b| {
            b.modified_ms()
                .cmp(&a.modified_ms())
                .then_with(|| a.id().cmp(b.id()))
        });
        v
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.get(id)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn visualisations(&self) -> impl Iterator<Item = &Visualisation> {
        self.visualisations.values()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.failures.values()
    }

    pub fn failure(&self, import_id: &str) -> Option<&FailureRecord> {
        self.failures.get(import_id)
    }

    pub fn is_member(&self, collection_id: &str, entity_id: &str) -> bool {
        self.collections
            .get(collection_id)
            .is_some_and(|c| c.entities.contains(entity_id))
    }

    pub fn is_temporary_member(&self, collection_id: &str, entity_id: &str) -> bool {
        self.collections
            .get(collection_id)
            .is_some_and(|c| c.temporary.contains(entity_id))
    }

    /// Titles (or ids) of every collection holding the entity, temporary ones suffixed with `*`.
    pub fn memberships(&self, entity_id: &str) -> Vec<String> {
        self.collections
            .values()
            .filter_map(|c| {
                let label = if c.title.is_empty() { &c.id } else { &c.title };
                if c.entities.contains(entity_id) {
                    Some(label.clone())
                } else if c.temporary.contains(entity_id) {
                    Some(format!("{label}*"))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Current local generation, captured before fetching a snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply one projected change. Applying the same change twice is a no-op.
    pub fn apply(&mut self, change: &StateChange) {
        match change {
            StateChange::UpsertPlaceholder(job) => {
                self.entities
                    .insert(job.import_id.clone(), Entity::Placeholder(job.clone()));
            }
            StateChange::AddTemporaryMember {
                collection_id,
                entity_id,
            } => {
                self.collections
                    .entry(collection_id.clone())
                    .or_insert_with(|| Collection::new(collection_id))
                    .temporary
                    .insert(entity_id.clone());
            }
            StateChange::RemoveTemporaryMember {
                collection_id,
                entity_id,
            } => {
                if let Some(c) = self.collections.get_mut(collection_id) {
                    c.temporary.remove(entity_id);
                }
            }
            StateChange::AddPermanentMember {
                collection_id,
                entity_id,
            } => {
                let added = self
                    .collections
                    .entry(collection_id.clone())
                    .or_insert_with(|| Collection::new(collection_id))
                    .entities
                    .insert(entity_id.clone());
                if added {
                    self.generation += 1;
                    self.local_members
                        .insert((collection_id.clone(), entity_id.clone()), self.generation);
                }
            }
            StateChange::RemovePlaceholder(import_id) => {
                if self.placeholder(import_id).is_some() {
                    self.entities.remove(import_id);
                }
                // A placeholder never outlives its temporary memberships.
                for c in self.collections.values_mut() {
                    c.temporary.remove(import_id);
                }
            }
            StateChange::MaterializeRaster(raster) => {
                if self.raster(&raster.id) != Some(raster) {
                    self.entities
                        .insert(raster.id.clone(), Entity::Raster(raster.clone()));
                    self.generation += 1;
                    self.local_rasters.insert(raster.id.clone(), self.generation);
                }
            }
            StateChange::RecordFailure(record) => {
                self.failures
                    .insert(record.import_id.clone(), record.clone());
            }
        }
    }

    /// Replace remote-owned state with a fresh snapshot, keeping pending imports.
    ///
    /// `since` is the [`Library::generation`] observed before the snapshot was
    /// requested. Rasters and memberships added locally after it are kept even
    /// when the snapshot does not know them yet.
    pub fn merge_remote(&mut self, snapshot: LibrarySnapshot, since: u64) {
        self.local_rasters.retain(|_, g| *g > since);
        self.local_members.retain(|_, g| *g > since);

        let fresh: Vec<Raster> = self
            .local_rasters
            .keys()
            .filter_map(|id| self.raster(id).cloned())
            .collect();
        self.entities.retain(|_, e| e.is_placeholder());
        for r in snapshot.rasters {
            self.entities.insert(r.id.clone(), Entity::Raster(r));
        }
        for r in fresh {
            self.entities.entry(r.id.clone()).or_insert(Entity::Raster(r));
        }

        let mut collections = BTreeMap::new();
        for rc in snapshot.collections {
            // Temporary members belong to in-flight imports and survive the refresh.
            let temporary = self
                .collections
                .get(&rc.id)
                .map(|c| c.temporary.clone())
                .unwrap_or_default();
            collections.insert(
                rc.id.clone(),
                Collection {
                    id: rc.id,
                    title: rc.title,
                    entities: rc.entities.into_iter().collect(),
                    temporary,
                },
            );
        }
        for (id, c) in std::mem::take(&mut self.collections) {
            if !c.temporary.is_empty() && !collections.contains_key(&id) {
                collections.insert(
                    id.clone(),
                    Collection {
                        entities: BTreeSet::new(),
                        ..c
                    },
                );
            }
        }
        for (collection_id, entity_id) in self.local_members.keys() {
            collections
                .entry(collection_id.clone())
                .or_insert_with(|| Collection::new(collection_id))
                .entities
                .insert(entity_id.clone());
        }
        self.collections = collections;

        self.visualisations = snapshot
            .visualisations
            .into_iter()
            .map(|v| (v.id.clone(), v))
            .collect();
    }

    /// Remove a raster and everything derived from it. Returns the removed visualisation ids.
    pub fn remove_raster(&mut self, raster_id: &str) -> Vec<String> {
        if self.raster(raster_id).is_some() {
            self.entities.remove(raster_id);
        }
        self.local_rasters.remove(raster_id);
        self.local_members.retain(|(_, e), _| e != raster_id);
        for c in self.collections.values_mut() {
            c.entities.remove(raster_id);
        }
        let dependent: Vec<String> = self
            .visualisations
            .values()
            .filter(|v| v.raster_id.as_deref() == Some(raster_id))
            .map(|v| v.id.clone())
            .collect();
        for id in &dependent {
            self.visualisations.remove(id);
        }
        dependent
    }

    /// Drop a failure record once the user has seen it.
    pub fn dismiss_failure(&mut self, import_id: &str) -> bool {
        self.failures.remove(import_id).is_some()
    }
}
