//! Provisioning units and the seams the resolver and executor use
//!
//! A unit is identified by its name alone. Names are derived from a kind
//! string plus an optional instance qualifier (`mapnikconfig_custom`), and
//! the same kind string keys the [`UnitFactory`], so resolving a
//! dependency never needs type reflection.

use crate::core::context::RunEnv;
use crate::core::error::Error;
use crate::core::phase::Phase;
use crate::fetch::{Fetcher, Resource};
use crate::helpers::cmd::CommandRunner;
use anyhow::Result;
use std::any::Any;
use std::fmt;

/// Kind of the unit every run starts with.
pub const CORE_KIND: &str = "core";

/// A declared dependency: one instance of a kind, optionally qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencySpec {
    pub kind: String,
    pub instance: Option<String>,
}

impl DependencySpec {
    pub fn of(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            instance: None,
        }
    }

    pub fn instance(kind: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            instance: Some(instance.into()),
        }
    }

    pub fn core() -> Self {
        Self::of(CORE_KIND)
    }

    /// Name the resolved unit will carry.
    pub fn unit_name(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}_{}", self.kind, instance),
            None => self.kind.clone(),
        }
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unit_name())
    }
}

/// Upcast helper so sibling units can be downcast to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A named provisioning entity.
pub trait Unit: AsAny {
    /// Stable, run-unique name. Must equal the `unit_name()` of the
    /// [`DependencySpec`] the unit was built from.
    fn name(&self) -> &str;

    /// Direct dependencies, in the order they should be set up.
    fn dependencies(&self) -> Vec<DependencySpec> {
        Vec::new()
    }

    /// Whether this unit implements `phase`.
    fn supports(&self, phase: Phase) -> bool;

    /// Run one phase. Only called when `supports(phase)` is true.
    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()>;
}

impl fmt::Debug for dyn Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Unit:{}>", self.name())
    }
}

/// Builds units from dependency specs and names the roots of a run.
pub trait UnitFactory {
    fn create(&self, spec: &DependencySpec) -> Result<Box<dyn Unit>>;

    /// Units the configuration asks for, before dependency expansion.
    fn requested(&self) -> Vec<DependencySpec>;
}

/// Fail unless exactly one unit matched `name`.
pub(crate) fn expect_one(name: &str, found: usize) -> Result<(), Error> {
    match found {
        0 => Err(Error::UnitNotFound {
            name: name.to_string(),
        }),
        1 => Ok(()),
        n => Err(Error::AmbiguousUnit {
            name: name.to_string(),
            found: n,
        }),
    }
}

/// Everything a unit can reach while one of its phases runs.
pub struct PhaseContext<'a> {
    pub env: &'a RunEnv,
    pub fetcher: &'a mut Fetcher,
    pub runner: &'a dyn CommandRunner,
    siblings: [&'a [Box<dyn Unit>]; 2],
}

impl<'a> PhaseContext<'a> {
    /// `before` and `after` are the other units of the run, excluding the
    /// one currently executing.
    pub fn new(
        env: &'a RunEnv,
        fetcher: &'a mut Fetcher,
        runner: &'a dyn CommandRunner,
        before: &'a [Box<dyn Unit>],
        after: &'a [Box<dyn Unit>],
    ) -> Self {
        Self {
            env,
            fetcher,
            runner,
            siblings: [before, after],
        }
    }

    /// Look up another unit of this run by name and concrete type.
    pub fn unit<T: Unit + 'static>(&self, name: &str) -> Result<&'a T> {
        let [before, after] = self.siblings;
        let matches: Vec<&'a Box<dyn Unit>> = before
            .iter()
            .chain(after)
            .filter(|unit| unit.name() == name)
            .collect();
        expect_one(name, matches.len())?;
        let unit: &'a dyn Unit = &**matches[0];
        unit.as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| anyhow::anyhow!("unit {} has an unexpected type", name))
    }

    /// Fetch every resource, stopping at the first failure.
    pub fn fetch_all(&mut self, resources: &[Resource]) -> Result<()> {
        for resource in resources {
            self.fetcher.fetch(resource)?;
        }
        Ok(())
    }

    /// Remove every resource from the download cache.
    pub fn clean_all(&mut self, resources: &[Resource]) -> Result<()> {
        for resource in resources {
            self.fetcher.clean(resource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_name_without_instance() {
        assert_eq!(DependencySpec::of("setupdatabase").unit_name(), "setupdatabase");
    }

    #[test]
    fn test_unit_name_with_instance() {
        let spec = DependencySpec::instance("osmdata", "osm_mapnik");
        assert_eq!(spec.unit_name(), "osmdata_osm_mapnik");
        assert_eq!(spec.to_string(), "osmdata_osm_mapnik");
    }

    #[test]
    fn test_expect_one() {
        assert!(matches!(expect_one("x", 0), Err(Error::UnitNotFound { .. })));
        assert!(expect_one("x", 1).is_ok());
        assert!(matches!(
            expect_one("x", 2),
            Err(Error::AmbiguousUnit { found: 2, .. })
        ));
    }
}
