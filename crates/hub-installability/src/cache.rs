use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use hub_resolver::{ResolutionOptions, ResolutionResult};

/// Resolution outcomes keyed by target.
///
/// Targets are compared by [`ResolutionOptions`] equality, i.e. by python version and platform
/// tags. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct ResolutionCache(Mutex<FxHashMap<ResolutionOptions, Arc<ResolutionResult>>>);

impl ResolutionCache {
    pub fn get(&self, options: &ResolutionOptions) -> Option<Arc<ResolutionResult>> {
        self.lock().get(options).cloned()
    }

    /// Store the outcome for a target and return the cached entry.
    ///
    /// If another resolution for the same target finished first, its entry is kept and
    /// returned.
    pub fn insert(
        &self,
        options: ResolutionOptions,
        result: ResolutionResult,
    ) -> Arc<ResolutionResult> {
        self.lock()
            .entry(options)
            .or_insert_with(|| Arc::new(result))
            .clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<ResolutionOptions, Arc<ResolutionResult>>> {
        // The map is valid after any panic in a critical section.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
