//! Dependency resolution for provisioning units
//!
//! Expands requested units into a dependency-first execution list using
//! iterative DFS with state tracking, like a package manager would.
//! Dependencies are instantiated lazily through the [`UnitFactory`] and
//! deduplicated by name; a dependency that leads back to a unit still being
//! expanded is a cycle and fails resolution.

use crate::core::error::Error;
use crate::core::unit::{DependencySpec, Unit, UnitFactory, expect_one};
use anyhow::Result;
use std::collections::HashMap;

/// Node state for DFS traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    /// On the DFS stack, dependencies not yet all placed
    Processing,
    /// Placed in the execution list
    Processed,
}

/// One entry of the explicit DFS stack.
struct Frame {
    name: String,
    /// `None` for a requested root, which the caller still owns.
    unit: Option<Box<dyn Unit>>,
    deps: Vec<DependencySpec>,
    next: usize,
}

/// Computes execution order for a set of requested units.
pub struct Resolver<'f> {
    factory: &'f dyn UnitFactory,
}

impl<'f> Resolver<'f> {
    pub fn new(factory: &'f dyn UnitFactory) -> Self {
        Self { factory }
    }

    /// Instantiate the requested specs and resolve them.
    pub fn resolve_specs(
        &self,
        specs: &[DependencySpec],
        only: Option<&str>,
    ) -> Result<Vec<Box<dyn Unit>>> {
        let roots = specs
            .iter()
            .map(|spec| self.instantiate(spec))
            .collect::<Result<Vec<_>>>()?;
        self.resolve(roots, only)
    }

    /// Order `roots` and their transitive dependencies, dependencies first.
    ///
    /// With `only`, the combined list is narrowed to the single unit of that
    /// name and dependencies are recomputed for it alone, so the result is
    /// exactly that unit's closure.
    pub fn resolve(
        &self,
        roots: Vec<Box<dyn Unit>>,
        only: Option<&str>,
    ) -> Result<Vec<Box<dyn Unit>>> {
        let mut seen = HashMap::new();
        for root in &roots {
            if seen.insert(root.name().to_string(), ()).is_some() {
                return Err(Error::DuplicateUnit {
                    name: root.name().to_string(),
                }
                .into());
            }
        }

        let mut order = self.dependencies(&roots)?;
        tracing::debug!(deps = ?order, "resolved dependencies");
        append_missing(&mut order, roots);

        let Some(name) = only else {
            return Ok(order);
        };

        let found = order.iter().filter(|u| u.name() == name).count();
        expect_one(name, found)?;
        let target: Vec<Box<dyn Unit>> = order.into_iter().filter(|u| u.name() == name).collect();
        tracing::info!(unit = name, "filtered units to load");

        let mut narrowed = self.dependencies(&target)?;
        tracing::info!(deps = ?narrowed, "recomputed dependencies");
        append_missing(&mut narrowed, target);
        Ok(narrowed)
    }

    /// Dependencies of `roots` in execution order, excluding the roots
    /// themselves unless one root depends on another.
    pub fn dependencies(&self, roots: &[Box<dyn Unit>]) -> Result<Vec<Box<dyn Unit>>> {
        let mut state: HashMap<String, NodeState> = HashMap::new();
        let mut result: Vec<Box<dyn Unit>> = Vec::new();

        for root in roots {
            self.dfs_visit(root.as_ref(), &mut state, &mut result)?;
        }

        Ok(result)
    }

    /// Iterative DFS with explicit stack to avoid recursion limits
    fn dfs_visit(
        &self,
        root: &dyn Unit,
        state: &mut HashMap<String, NodeState>,
        result: &mut Vec<Box<dyn Unit>>,
    ) -> Result<()> {
        if state.get(root.name()) == Some(&NodeState::Processed) {
            return Ok(());
        }
        state.insert(root.name().to_string(), NodeState::Processing);
        let mut stack = vec![Frame {
            name: root.name().to_string(),
            unit: None,
            deps: root.dependencies(),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.deps.len() {
                // All children placed - finalize this node
                let Some(done) = stack.pop() else { break };
                match done.unit {
                    Some(unit) => {
                        state.insert(done.name, NodeState::Processed);
                        result.push(unit);
                    }
                    None => {
                        // Roots are placed by the caller
                        state.remove(&done.name);
                    }
                }
                continue;
            }

            let spec = frame.deps[frame.next].clone();
            frame.next += 1;
            let dep_name = spec.unit_name();

            match state.get(&dep_name).copied() {
                Some(NodeState::Processed) => {}
                Some(NodeState::Processing) => {
                    let start = stack.iter().position(|f| f.name == dep_name).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|f| f.name.clone()).collect();
                    path.push(dep_name);
                    return Err(Error::DependencyCycle { path }.into());
                }
                None => {
                    let unit = self.instantiate(&spec)?;
                    state.insert(dep_name.clone(), NodeState::Processing);
                    stack.push(Frame {
                        name: dep_name,
                        deps: unit.dependencies(),
                        unit: Some(unit),
                        next: 0,
                    });
                }
            }
        }

        Ok(())
    }

    fn instantiate(&self, spec: &DependencySpec) -> Result<Box<dyn Unit>> {
        let unit = self.factory.create(spec)?;
        let expected = spec.unit_name();
        if unit.name() != expected {
            return Err(Error::UnitNameMismatch {
                expected,
                actual: unit.name().to_string(),
            }
            .into());
        }
        Ok(unit)
    }
}

/// Append units whose name is not already in `order`.
fn append_missing(order: &mut Vec<Box<dyn Unit>>, units: Vec<Box<dyn Unit>>) {
    for unit in units {
        if !order.iter().any(|u| u.name() == unit.name()) {
            order.push(unit);
        }
    }
}

/// Names of a unit list, in order.
pub fn names(units: &[Box<dyn Unit>]) -> Vec<String> {
    units.iter().map(|u| u.name().to_string()).collect()
}
