//! Materialized-view rebuild policy.
//!
//! Decides whether an mview must be (re)built from SQL-text change and
//! upstream freshness. This is a declared-order policy: freshness propagates
//! one hop per digestion pass, so it only converges when the manifest lists
//! dependencies before dependents. That ordering is an author contract, not
//! something the engine enforces.

use tracing::debug;

use crate::registry::{RegistryResult, SchemaRegistry};

/// Rebuild decisions for views and materialized views.
pub struct RebuildPolicy<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> RebuildPolicy<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Whether the object named `name` must be rebuilt for `new_sql`.
    ///
    /// True when the object was never built, its SQL text changed, its build
    /// stamp is missing, or any table/view its body references was updated
    /// more recently than the object itself.
    pub fn needs_rebuild(&self, name: &str, new_sql: &str) -> RegistryResult<bool> {
        let Some(table) = self.registry.find_table_by_name(name)? else {
            debug!(name, "rebuild: no prior record");
            return Ok(true);
        };

        if table.data.sql.as_deref() != Some(new_sql) {
            debug!(name, "rebuild: SQL text changed");
            return Ok(true);
        }

        let Some(updated) = table.data.updated else {
            debug!(name, "rebuild: no build stamp");
            return Ok(true);
        };

        for dep_name in &table.data.tc_names {
            if let Some(dep) = self.registry.find_table_by_name(dep_name)? {
                if let Some(dep_updated) = dep.data.updated {
                    if dep_updated > updated {
                        debug!(name, dependency = dep_name.as_str(), "rebuild: stale upstream");
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }
}
