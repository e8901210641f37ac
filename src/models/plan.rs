//! Dependency graph validation and start-order computation.

use std::collections::HashMap;

use crate::models::service::ServiceSpec;
use crate::{AppError, Result};

/// Validated launch plan for a service stack.
///
/// Built once per session from the configured specs; owns a copy of those
/// specs in topological start order, so the launch walk consumes them
/// directly. Shutdown order is always the exact reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyPlan {
    ordered: Vec<ServiceSpec>,
}

impl DependencyPlan {
    /// Validate the dependency graph and compute the start order.
    ///
    /// Rejects duplicate names, references to unknown services,
    /// self-dependencies, and cycles. Ties between services whose
    /// dependencies are all satisfied resolve to declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidPlan`] naming the offending service when
    /// the graph is malformed.
    pub fn build(specs: &[ServiceSpec]) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name.as_str(), i).is_some() {
                return Err(AppError::InvalidPlan(format!(
                    "duplicate service name '{}'",
                    spec.name
                )));
            }
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        let mut in_degree: Vec<usize> = vec![0; specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            for dep in &spec.depends_on {
                if *dep == spec.name {
                    return Err(AppError::InvalidPlan(format!(
                        "service '{}' depends on itself",
                        spec.name
                    )));
                }
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(AppError::InvalidPlan(format!(
                        "service '{}' depends on unknown service '{dep}'",
                        spec.name
                    )));
                };
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }

        // Kahn's algorithm; scanning from index zero each round keeps ties
        // in declaration order.
        let mut placed = vec![false; specs.len()];
        let mut ordered = Vec::with_capacity(specs.len());
        while ordered.len() < specs.len() {
            let Some(next) = (0..specs.len()).find(|&i| !placed[i] && in_degree[i] == 0) else {
                let mut stuck: Vec<&str> = (0..specs.len())
                    .filter(|&i| !placed[i])
                    .map(|i| specs[i].name.as_str())
                    .collect();
                stuck.sort_unstable();
                return Err(AppError::InvalidPlan(format!(
                    "dependency cycle involving: {}",
                    stuck.join(", ")
                )));
            };
            placed[next] = true;
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
            }
            ordered.push(specs[next].clone());
        }

        Ok(Self { ordered })
    }

    /// Validated specs in launch order.
    #[must_use]
    pub fn services(&self) -> &[ServiceSpec] {
        &self.ordered
    }

    /// Service names in launch order.
    #[must_use]
    pub fn start_order(&self) -> Vec<&str> {
        self.ordered.iter().map(|spec| spec.name.as_str()).collect()
    }

    /// Service names in teardown order (reverse of launch).
    #[must_use]
    pub fn teardown_order(&self) -> Vec<&str> {
        self.ordered.iter().rev().map(|spec| spec.name.as_str()).collect()
    }

    /// Number of services in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the plan contains no services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
