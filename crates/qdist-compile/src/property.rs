//! `PropertySet`: shared state between compilation passes.
//!
//! Analysis passes publish their findings here and later passes read them.
//! The cross-node run table has a dedicated slot; anything else can be
//! stored by type.
//!
//! ```
//! use qdist_compile::PropertySet;
//!
//! #[derive(Debug, PartialEq)]
//! struct Note(&'static str);
//!
//! let mut props = PropertySet::new();
//! props.insert(Note("hello"));
//! assert_eq!(props.get::<Note>(), Some(&Note("hello")));
//! assert!(props.runs.is_none());
//! ```

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};

use crate::passes::RunTable;

/// Properties shared by the passes of one compilation.
#[derive(Default)]
pub struct PropertySet {
    /// Cross-node runs found by the run analysis.
    pub runs: Option<RunTable>,

    /// Custom properties storage (type-erased).
    custom: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl PropertySet {
    /// Create a new empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the run table, e.g. to rewrite with a precomputed grouping.
    #[must_use]
    pub fn with_runs(mut self, runs: RunTable) -> Self {
        self.runs = Some(runs);
        self
    }

    /// Insert a custom property.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.custom.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a custom property.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.custom
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Get a mutable custom property.
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.custom
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Remove a custom property.
    pub fn remove<T: Any>(&mut self) -> Option<T> {
        self.custom
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for PropertySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySet")
            .field("runs", &self.runs)
            .field("custom", &self.custom.len())
            .finish()
    }
}
