//! Pass manager for orchestrating compilation.

use tracing::{debug, info, instrument};

use qdist_ir::Circuit;

use crate::error::CompileResult;
use crate::pass::Pass;
use crate::passes::{CrossNodeRuns, LocalityVerification, OwnershipCheck, TeleportationRewrite};
use crate::property::PropertySet;

/// Manages and executes a sequence of compilation passes.
pub struct PassManager {
    /// The passes to execute, in order.
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// Create a new empty pass manager.
    pub fn new() -> Self {
        Self { passes: vec![] }
    }

    /// Add a pass to the manager.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Run all passes on `circuit` and return the final circuit.
    ///
    /// Transformation passes hand back a replacement circuit that the
    /// following passes see; the input is never modified.
    #[instrument(skip(self, circuit, properties))]
    pub fn run(&self, circuit: &Circuit, properties: &mut PropertySet) -> CompileResult<Circuit> {
        info!(
            "Running pass manager with {} passes on circuit with {} nodes, {} layers",
            self.passes.len(),
            circuit.nodes().count(),
            circuit.depth()
        );

        let mut current: Option<Circuit> = None;
        for pass in &self.passes {
            let input = current.as_ref().unwrap_or(circuit);
            if pass.should_run(input, properties) {
                debug!("Running pass: {}", pass.name());
                if let Some(next) = pass.run(input, properties)? {
                    current = Some(next);
                }
                debug!(
                    "Pass {} completed, ops: {}",
                    pass.name(),
                    current.as_ref().unwrap_or(circuit).num_operations()
                );
            } else {
                debug!("Skipping pass: {}", pass.name());
            }
        }

        let result = current.unwrap_or_else(|| circuit.clone());
        info!(
            "Pass manager completed, final depth: {}, ops: {}",
            result.depth(),
            result.num_operations()
        );
        Ok(result)
    }

    /// Get the number of passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if the manager has no passes.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the distributed compilation pipeline.
///
/// The pipeline is ownership check, run analysis, teleportation rewrite and
/// (optionally) locality verification of the result.
pub struct PassManagerBuilder {
    merge_runs: bool,
    pooled: bool,
    verify: bool,
    properties: PropertySet,
}

impl PassManagerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            merge_runs: true,
            pooled: true,
            verify: true,
            properties: PropertySet::new(),
        }
    }

    /// Share one entangled pair across consecutive gates on the same
    /// control qubit (default on).
    #[must_use]
    pub fn with_run_merging(mut self, enabled: bool) -> Self {
        self.merge_runs = enabled;
        self
    }

    /// Draw pair halves from the entanglement pool (default on).
    #[must_use]
    pub fn with_pooled_pairs(mut self, pooled: bool) -> Self {
        self.pooled = pooled;
        self
    }

    /// Verify the rewritten circuit (default on).
    #[must_use]
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    /// Start from the given properties.
    #[must_use]
    pub fn with_properties(mut self, properties: PropertySet) -> Self {
        self.properties = properties;
        self
    }

    /// Build the pass manager and return it with the properties.
    pub fn build(self) -> (PassManager, PropertySet) {
        let mut pm = PassManager::new();

        pm.add_pass(OwnershipCheck);

        // A seeded run table is used as is.
        if self.properties.runs.is_none() {
            if self.merge_runs {
                pm.add_pass(CrossNodeRuns::new());
            } else {
                pm.add_pass(CrossNodeRuns::unmerged());
            }
        }

        pm.add_pass(TeleportationRewrite {
            pooled: self.pooled,
        });

        if self.verify {
            pm.add_pass(LocalityVerification);
        }

        (pm, self.properties)
    }
}

impl Default for PassManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
