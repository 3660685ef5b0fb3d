use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

/// Groups of cached reads. A mutation invalidates every read carrying one of
/// the tags it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Projects,
    Assignments,
    History,
    Tasks,
    Interns,
}

/// Tags invalidated by each mutation the client exposes.
pub mod invalidates {
    use super::Tag::{self, *};

    pub const CREATE_PROJECT: &[Tag] = &[Projects];
    pub const SET_STATUS: &[Tag] = &[Projects, History];
    pub const ASSIGN: &[Tag] = &[Assignments, History];
    pub const UNASSIGN: &[Tag] = &[Assignments, History];
    pub const APPEND_NOTE: &[Tag] = &[History];
    pub const CREATE_INTERN: &[Tag] = &[Interns];
    pub const CREATE_TASK: &[Tag] = &[Tasks];
    /// A task change may complete a project and release its interns.
    pub const UPDATE_TASK_STATUS: &[Tag] = &[Tasks, Projects, Assignments, History];
    pub const RECONCILE: &[Tag] = UPDATE_TASK_STATUS;
}

impl Tag {
    pub const ALL: [Tag; 5] = [
        Tag::Projects,
        Tag::Assignments,
        Tag::History,
        Tag::Tasks,
        Tag::Interns,
    ];
}

/// Response cache keyed by request path.
///
/// Each tag carries a generation that every invalidation bumps. A read takes
/// the generation before it goes to the server and stores its response with
/// [`TagCache::insert_if_current`], so a response fetched before a mutation
/// landed is never cached after that mutation's invalidation.
#[derive(Debug, Clone, Default)]
pub struct TagCache {
    state: Arc<Mutex<CacheState>>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, (Tag, Value)>,
    generations: HashMap<Tag, u64>,
}

impl CacheState {
    fn generation(&self, tag: Tag) -> u64 {
        self.generations.get(&tag).copied().unwrap_or(0)
    }

    fn bump(&mut self, tag: Tag) {
        *self.generations.entry(tag).or_default() += 1;
    }
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.lock().entries.get(path).map(|(_, v)| v.clone())
    }

    /// Current generation of `tag`.
    pub fn generation(&self, tag: Tag) -> u64 {
        self.lock().generation(tag)
    }

    pub fn insert(&self, tag: Tag, path: impl Into<String>, value: Value) {
        self.lock().entries.insert(path.into(), (tag, value));
    }

    /// Store `value` only if `tag` has not been invalidated since
    /// `generation` was read. Returns whether it was stored.
    pub fn insert_if_current(
        &self,
        tag: Tag,
        path: impl Into<String>,
        value: Value,
        generation: u64,
    ) -> bool {
        let mut state = self.lock();
        if state.generation(tag) != generation {
            return false;
        }
        state.entries.insert(path.into(), (tag, value));
        true
    }

    pub fn invalidate(&self, tags: &[Tag]) {
        let mut state = self.lock();
        for &tag in tags {
            state.bump(tag);
        }
        let before = state.entries.len();
        state.entries.retain(|_, (tag, _)| !tags.contains(tag));
        tracing::debug!(
            tags = ?tags,
            evicted = before - state.entries.len(),
            "Client cache invalidated"
        );
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        for tag in Tag::ALL {
            state.bump(tag);
        }
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalidation_only_evicts_matching_tags() {
        let cache = TagCache::new();
        cache.insert(Tag::Projects, "/projects", json!([]));
        cache.insert(Tag::History, "/projects/1/history", json!([]));
        cache.insert(Tag::Interns, "/interns", json!([]));

        cache.invalidate(invalidates::SET_STATUS);

        assert!(cache.get("/projects").is_none());
        assert!(cache.get("/projects/1/history").is_none());
        assert_eq!(cache.get("/interns"), Some(json!([])));
    }

    #[test]
    fn responses_read_before_an_invalidation_are_not_stored() {
        let cache = TagCache::new();
        let seen = cache.generation(Tag::Projects);

        // A mutation lands while the read is in flight
        cache.invalidate(invalidates::CREATE_PROJECT);

        assert!(!cache.insert_if_current(Tag::Projects, "/projects", json!([]), seen));
        assert!(cache.get("/projects").is_none());

        let fresh = cache.generation(Tag::Projects);
        assert!(cache.insert_if_current(Tag::Projects, "/projects", json!([1]), fresh));
        assert_eq!(cache.get("/projects"), Some(json!([1])));
    }

    #[test]
    fn invalidating_one_tag_leaves_other_reads_current() {
        let cache = TagCache::new();
        let seen = cache.generation(Tag::Interns);

        cache.invalidate(invalidates::ASSIGN);
        assert!(cache.insert_if_current(Tag::Interns, "/interns", json!([]), seen));

        cache.clear();
        assert!(!cache.insert_if_current(Tag::Interns, "/interns", json!([]), seen));
    }

    #[test]
    fn task_updates_invalidate_everything_the_cascade_touches() {
        for tag in [Tag::Tasks, Tag::Projects, Tag::Assignments, Tag::History] {
            assert!(invalidates::UPDATE_TASK_STATUS.contains(&tag));
        }
        assert!(!invalidates::UPDATE_TASK_STATUS.contains(&Tag::Interns));
    }
}
