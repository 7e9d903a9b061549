//! Migration registry
//!
//! Collects units from code and from migration files and hands them to the
//! runner in discovery order: ascending by name, with every name carrying a
//! unique numeric ordering prefix.

use std::collections::HashMap;

use super::unit::Migration;
use crate::error::{OrmError, OrmResult};

/// Source of migration units
#[derive(Default)]
pub struct MigrationRegistry {
    units: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit
    pub fn register<M>(&mut self, unit: M) -> &mut Self
    where
        M: Migration + 'static,
    {
        self.units.push(Box::new(unit));
        self
    }

    /// Add already boxed units
    pub fn extend<I>(&mut self, units: I) -> &mut Self
    where
        I: IntoIterator<Item = Box<dyn Migration>>,
    {
        self.units.extend(units);
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units sorted ascending by name, after validating names and prefixes
    pub fn discover(&self) -> OrmResult<Vec<&dyn Migration>> {
        let mut units: Vec<&dyn Migration> = self.units.iter().map(|unit| unit.as_ref()).collect();
        units.sort_by(|a, b| a.name().cmp(b.name()));

        let mut prefixes: HashMap<&str, &str> = HashMap::new();
        for unit in &units {
            let name = unit.name();
            let prefix = ordering_prefix(name).ok_or_else(|| {
                OrmError::Migration(format!(
                    "Migration name '{}' must start with a numeric ordering prefix",
                    name
                ))
            })?;

            if let Some(previous) = prefixes.insert(prefix, name) {
                return Err(if previous == name {
                    OrmError::Migration(format!("Duplicate migration name '{}'", name))
                } else {
                    OrmError::Migration(format!(
                        "Migrations '{}' and '{}' share the ordering prefix '{}'",
                        previous, name, prefix
                    ))
                });
            }
        }

        Ok(units)
    }
}

/// Leading run of all-digit `_`-separated segments, e.g. `2024_01_15_000001`
/// for `2024_01_15_000001_create_artes_table`. The name must continue after it.
pub fn ordering_prefix(name: &str) -> Option<&str> {
    let mut end = 0;
    for segment in name.split('_') {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        end += segment.len() + 1;
    }

    if end == 0 || end >= name.len() {
        return None;
    }
    Some(&name[..end - 1])
}
