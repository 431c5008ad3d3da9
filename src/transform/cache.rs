//! Load-once grammar cache.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::errors::{GrammarError, GrammarErrorKind};
use crate::grammar::Grammar;

type Slot = Arc<OnceCell<Result<Arc<Grammar>, GrammarError>>>;

/// Loaded grammars by reference.
///
/// The map lock is only held to find or create a reference's slot; loading happens inside the
/// slot's `OnceCell`, so concurrent first requests for one reference wait for a single load while
/// other references proceed. Grammar errors are remembered until [`evict`](Self::evict) or
/// [`clear`](Self::clear); an unavailable source is not, and the next request tries again.
#[derive(Debug, Default)]
pub struct GrammarCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl GrammarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached grammar for `reference`, running `load` on first use.
    pub fn get_or_load(
        &self,
        reference: &str,
        load: impl FnOnce() -> Result<Grammar, GrammarError>,
    ) -> Result<Arc<Grammar>, GrammarError> {
        let slot = self
            .slots
            .lock()
            .entry(reference.to_string())
            .or_default()
            .clone();

        if let Some(cached) = slot.get() {
            trace!(reference, "grammar cache hit");
            return cached.clone();
        }

        let cached = slot
            .get_or_try_init(|| {
                debug!(reference, "grammar cache miss");
                match load() {
                    Err(error)
                        if matches!(error.kind, GrammarErrorKind::SourceUnavailable { .. }) =>
                    {
                        Err(error)
                    }
                    loaded => Ok(loaded.map(Arc::new)),
                }
            })
            .map_err(|error| {
                self.release_empty(reference, &slot);
                error
            })?;
        cached.clone()
    }

    /// Drops `slot` from the map if it is still the entry for `reference` and never got filled.
    fn release_empty(&self, reference: &str, slot: &Slot) {
        let mut slots = self.slots.lock();
        let unfilled = slots
            .get(reference)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && current.get().is_none());
        if unfilled {
            slots.remove(reference);
        }
    }

    /// Forgets one reference. Returns whether anything was cached for it.
    pub fn evict(&self, reference: &str) -> bool {
        self.slots.lock().remove(reference).is_some()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Number of references with a finished load, successful or not.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
