//! Identity-keyed store of revisions.
//!
//! Every hash maps to exactly one shared [`Revision`] for the lifetime of the
//! graph. Entities are created lazily as placeholders the first time anything
//! refers to them (a log row, a parent link, a diff header) and are filled in
//! when a load for that hash is merged.

use crate::domain::models::{Hash, ReferenceName, RevisionRecord, Signature};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RevisionData {
    pub loaded: bool,
    pub tree: Option<Hash>,
    pub parents: Vec<Hash>,
    pub author: Option<Signature>,
    pub committer: Option<Signature>,
    pub subject: String,
    pub body: String,
    /// Revisions listing this one as a parent.
    pub children: BTreeSet<Hash>,
    /// References currently pointing here.
    pub references: BTreeSet<ReferenceName>,
}

#[derive(Debug)]
pub struct Revision {
    hash: Hash,
    data: RwLock<RevisionData>,
}

impl Revision {
    fn placeholder(hash: Hash) -> Self {
        Self {
            hash,
            data: RwLock::new(RevisionData::default()),
        }
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn is_loaded(&self) -> bool {
        self.data.read().loaded
    }

    pub fn subject(&self) -> String {
        self.data.read().subject.clone()
    }

    pub fn parents(&self) -> Vec<Hash> {
        self.data.read().parents.clone()
    }

    pub fn children(&self) -> Vec<Hash> {
        self.data.read().children.iter().cloned().collect()
    }

    pub fn references(&self) -> Vec<ReferenceName> {
        self.data.read().references.iter().cloned().collect()
    }

    /// Consistent copy of every field, taken under one lock.
    pub fn snapshot(&self) -> RevisionData {
        self.data.read().clone()
    }
}

#[derive(Debug, Clone)]
pub struct Applied {
    pub revision: Arc<Revision>,
    /// False when the record matched what the entity already held.
    pub changed: bool,
}

#[derive(Debug, Default)]
pub struct RevisionGraph {
    revisions: Mutex<HashMap<Hash, Arc<Revision>>>,
    references: Mutex<HashMap<ReferenceName, Hash>>,
    // Held for a whole merge so child links and the reference index
    // always agree with the parents and references they were derived from.
    merge: Mutex<()>,
}

impl RevisionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, hash: &Hash) -> Arc<Revision> {
        let mut revisions = self.revisions.lock();
        revisions
            .entry(hash.clone())
            .or_insert_with(|| Arc::new(Revision::placeholder(hash.clone())))
            .clone()
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Revision>> {
        self.revisions.lock().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.revisions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolve_reference(&self, name: &ReferenceName) -> Option<Arc<Revision>> {
        let hash = self.references.lock().get(name).cloned()?;
        self.get(&hash)
    }

    pub fn parents_of(&self, revision: &Revision) -> Vec<Arc<Revision>> {
        revision
            .parents()
            .iter()
            .map(|hash| self.get_or_create(hash))
            .collect()
    }

    pub fn children_of(&self, revision: &Revision) -> Vec<Arc<Revision>> {
        revision
            .children()
            .iter()
            .map(|hash| self.get_or_create(hash))
            .collect()
    }

    /// Merges a freshly loaded record into the entity for `record.hash`.
    ///
    /// Fields are last-write-wins; applying the same record twice leaves the
    /// entity unchanged and reports `changed == false` the second time.
    pub fn apply_loaded_data(&self, record: &RevisionRecord) -> Applied {
        let _merge = self.merge.lock();
        let revision = self.get_or_create(&record.hash);
        let new_refs: BTreeSet<ReferenceName> = record.references.iter().cloned().collect();

        let (changed, old_parents, old_refs) = {
            let mut data = revision.data.write();
            let old_parents = std::mem::take(&mut data.parents);
            let old_refs = data.references.clone();
            let mut changed = !data.loaded;

            changed |= replace_if_different(&mut data.tree, Some(record.tree.clone()));
            changed |= replace_if_different(&mut data.author, Some(record.author.clone()));
            changed |= replace_if_different(&mut data.committer, Some(record.committer.clone()));
            changed |= replace_if_different(&mut data.subject, record.subject.clone());
            changed |= replace_if_different(&mut data.body, record.body.clone());
            changed |= old_parents != record.parents;
            data.parents = record.parents.clone();
            changed |= replace_if_different(&mut data.references, new_refs.clone());
            data.loaded = true;
            (changed, old_parents, old_refs)
        };

        if old_parents != record.parents {
            if !old_parents.is_empty() {
                tracing::warn!(
                    revision = %record.hash,
                    "parent list changed between loads; relinking"
                );
            }
            self.relink_parents(&record.hash, &old_parents, &record.parents);
        }
        if old_refs != new_refs {
            self.move_references(&record.hash, &old_refs, &new_refs);
        }

        if changed {
            tracing::trace!(revision = %record.hash, "revision updated");
        }
        Applied { revision, changed }
    }

    // Runs under `merge`; only one entity lock is held at a time here.
    fn relink_parents(&self, child: &Hash, old: &[Hash], new: &[Hash]) {
        for parent in old.iter().filter(|p| !new.contains(p)) {
            if let Some(parent) = self.get(parent) {
                parent.data.write().children.remove(child);
            }
        }
        for parent in new {
            let parent = self.get_or_create(parent);
            parent.data.write().children.insert(child.clone());
        }
    }

    fn move_references(
        &self,
        target: &Hash,
        old: &BTreeSet<ReferenceName>,
        new: &BTreeSet<ReferenceName>,
    ) {
        let mut index = self.references.lock();
        for name in old.difference(new) {
            if index.get(name) == Some(target) {
                index.remove(name);
            }
        }
        for name in new {
            let previous = index.insert(name.clone(), target.clone());
            let Some(previous) = previous.filter(|p| p != target) else {
                continue;
            };
            tracing::debug!(reference = %name, from = %previous, to = %target, "reference moved");
            if let Some(prev) = self.revisions.lock().get(&previous).cloned() {
                prev.data.write().references.remove(name);
            }
        }
    }
}

fn replace_if_different<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hash(n: u8) -> Hash {
        Hash::parse(&format!("{n:02x}").repeat(20)).unwrap()
    }

    fn sig(name: &str) -> Signature {
        Signature {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            when: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn record(n: u8, parents: &[u8]) -> RevisionRecord {
        RevisionRecord {
            hash: hash(n),
            tree: hash(200 + n),
            parents: parents.iter().map(|p| hash(*p)).collect(),
            author: sig("alice"),
            committer: sig("bob"),
            subject: format!("commit {n}"),
            body: String::new(),
            references: vec![],
        }
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let graph = RevisionGraph::new();
        let a = graph.get_or_create(&hash(1));
        let b = graph.get_or_create(&hash(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.is_loaded());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let graph = RevisionGraph::new();
        let rec = record(1, &[2]);

        let first = graph.apply_loaded_data(&rec);
        assert!(first.changed);
        let after_first = first.revision.snapshot();

        let second = graph.apply_loaded_data(&rec);
        assert!(!second.changed);
        assert!(Arc::ptr_eq(&first.revision, &second.revision));
        assert_eq!(second.revision.snapshot(), after_first);
    }

    #[test]
    fn test_apply_reuses_placeholder() {
        let graph = RevisionGraph::new();
        let placeholder = graph.get_or_create(&hash(1));
        let applied = graph.apply_loaded_data(&record(1, &[]));
        assert!(Arc::ptr_eq(&placeholder, &applied.revision));
        assert!(placeholder.is_loaded());
        assert_eq!(placeholder.subject(), "commit 1");
    }

    #[test]
    fn test_updated_field_is_detected() {
        let graph = RevisionGraph::new();
        graph.apply_loaded_data(&record(1, &[]));
        let mut updated = record(1, &[]);
        updated.subject = "reworded".to_string();
        let applied = graph.apply_loaded_data(&updated);
        assert!(applied.changed);
        assert_eq!(applied.revision.subject(), "reworded");
    }

    #[test]
    fn test_parent_links_are_bidirectional() {
        let graph = RevisionGraph::new();
        graph.apply_loaded_data(&record(3, &[1, 2]));

        let parent = graph.get(&hash(1)).unwrap();
        assert!(!parent.is_loaded());
        assert_eq!(parent.children(), vec![hash(3)]);

        let child = graph.get(&hash(3)).unwrap();
        let parents = graph.parents_of(&child);
        assert_eq!(parents.len(), 2);
        assert!(Arc::ptr_eq(&parents[0], &parent));
        assert_eq!(graph.children_of(&parent)[0].hash(), &hash(3));
    }

    #[test]
    fn test_relink_removes_stale_child_link() {
        let graph = RevisionGraph::new();
        graph.apply_loaded_data(&record(3, &[1]));
        graph.apply_loaded_data(&record(3, &[2]));

        assert!(graph.get(&hash(1)).unwrap().children().is_empty());
        assert_eq!(graph.get(&hash(2)).unwrap().children(), vec![hash(3)]);
    }

    #[test]
    fn test_reference_moves_between_revisions() {
        let graph = RevisionGraph::new();
        let main = ReferenceName::Branch("main".to_string());

        let mut first = record(1, &[]);
        first.references = vec![main.clone()];
        graph.apply_loaded_data(&first);
        assert_eq!(graph.resolve_reference(&main).unwrap().hash(), &hash(1));

        let mut second = record(2, &[1]);
        second.references = vec![main.clone()];
        graph.apply_loaded_data(&second);

        assert_eq!(graph.resolve_reference(&main).unwrap().hash(), &hash(2));
        assert!(graph.get(&hash(1)).unwrap().references().is_empty());
        assert_eq!(graph.get(&hash(2)).unwrap().references(), vec![main]);
    }

    #[test]
    fn test_concurrent_loads_share_entities() {
        let graph = Arc::new(RevisionGraph::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let graph = graph.clone();
                std::thread::spawn(move || {
                    (1..=20u8)
                        .map(|n| graph.apply_loaded_data(&record(n, &[n - 1])).revision)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<Arc<Revision>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for row in &results[1..] {
            for (a, b) in row.iter().zip(&results[0]) {
                assert!(Arc::ptr_eq(a, b));
            }
        }
        // 20 loaded revisions plus the unloaded root parent
        assert_eq!(graph.len(), 21);
        assert_eq!(graph.get(&hash(5)).unwrap().children(), vec![hash(6)]);
    }

    fn assert_links_consistent(graph: &RevisionGraph) {
        let all: Vec<Arc<Revision>> = graph.revisions.lock().values().cloned().collect();
        for revision in &all {
            for parent in graph.parents_of(revision) {
                assert!(
                    parent.children().contains(revision.hash()),
                    "{} missing child {}",
                    parent.hash(),
                    revision.hash()
                );
            }
            for child in graph.children_of(revision) {
                assert!(
                    child.parents().contains(revision.hash()),
                    "{} lists {} as child but not as parent",
                    revision.hash(),
                    child.hash()
                );
            }
            for name in revision.references() {
                let owner = graph.resolve_reference(&name).unwrap();
                assert!(Arc::ptr_eq(&owner, revision));
            }
        }
    }

    #[test]
    fn test_conflicting_concurrent_loads_keep_links_consistent() {
        let main = ReferenceName::Branch("main".to_string());
        for _ in 0..50 {
            let graph = Arc::new(RevisionGraph::new());
            let barrier = Arc::new(std::sync::Barrier::new(4));
            let handles: Vec<_> = (0..4u8)
                .map(|t| {
                    let graph = graph.clone();
                    let barrier = barrier.clone();
                    let main = main.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        for i in 0..25u8 {
                            let mut rec = record(30, &[1 + (t + i) % 5]);
                            if i % 3 == 0 {
                                rec.references = vec![main.clone()];
                            }
                            graph.apply_loaded_data(&rec);
                            let mut other = record(31 + t, &[30]);
                            if i % 2 == 0 {
                                other.references = vec![main.clone()];
                            }
                            graph.apply_loaded_data(&other);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert_links_consistent(&graph);
        }
    }
}
