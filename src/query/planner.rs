//! Composite query planning
//!
//! Planning validates a [`CompositeQuery`] and turns it into a [`QueryPlan`]:
//!
//! 1. Check names, builder queries and the query type
//! 2. Parse every formula expression and resolve its references
//! 3. Build an index-based dependency graph and order it topologically,
//!    rejecting cycles
//! 4. Select the builder queries to dispatch: those surfaced directly or
//!    reachable from a surfaced formula
//!
//! Nothing here touches the store, so every validation failure is raised
//! before any evaluation starts.

use std::collections::BTreeMap;

use super::builder::{BuilderQuery, ReduceTo};
use super::composite::{CompositeQuery, QueryEntry, QueryType};
use super::expression::{is_valid_name, parse_expression, Expr};
use crate::error::ValidationError;

/// A formula ready to evaluate
#[derive(Debug, Clone)]
pub struct PlannedFormula {
    /// Formula name
    pub name: String,
    /// Parsed expression
    pub expr: Expr,
}

/// Validated evaluation plan for a composite query
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Builder queries to dispatch to the store, by name
    builders: Vec<BuilderQuery>,
    /// Formulas to evaluate, dependencies first
    formulas: Vec<PlannedFormula>,
    /// Non-disabled entries in name order
    surfaced: Vec<String>,
    /// Effective table reduction per entry
    reduce_to: BTreeMap<String, ReduceTo>,
}

/// Visit state for the depth-first topological sort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl QueryPlan {
    /// Validate `composite` and build its plan
    pub fn build(composite: &CompositeQuery) -> Result<Self, ValidationError> {
        if composite.query_type != QueryType::Builder {
            return Err(ValidationError::UnsupportedQueryType(
                composite.query_type.to_string(),
            ));
        }
        if composite.is_empty() {
            return Err(ValidationError::EmptyComposite);
        }

        // Index entries in name order
        let names: Vec<&str> = composite.queries.keys().map(String::as_str).collect();
        let index: BTreeMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let entries: Vec<&QueryEntry> = composite.queries.values().collect();

        for (key, entry) in &composite.queries {
            if entry.name() != key {
                return Err(ValidationError::NameMismatch {
                    key: key.clone(),
                    name: entry.name().to_string(),
                });
            }
            if !is_valid_name(key) {
                return Err(ValidationError::InvalidName(key.clone()));
            }
            if let QueryEntry::Builder(query) = entry {
                query.validate()?;
            }
        }

        // Parse formulas and build adjacency
        let mut exprs: Vec<Option<Expr>> = vec![None; entries.len()];
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
        for (i, entry) in entries.iter().enumerate() {
            let QueryEntry::Formula(formula) = entry else {
                continue;
            };
            let expr = parse_expression(&formula.name, &formula.expression)?;
            let references = expr.references();
            if references.is_empty() {
                return Err(ValidationError::NoReferences(formula.name.clone()));
            }
            for reference in references {
                if reference == formula.name {
                    return Err(ValidationError::SelfReference(formula.name.clone()));
                }
                let Some(&target) = index.get(reference) else {
                    return Err(ValidationError::UnknownReference {
                        formula: formula.name.clone(),
                        reference: reference.to_string(),
                    });
                };
                deps[i].push(target);
            }
            exprs[i] = Some(expr);
        }

        let order = topological_order(&names, &deps)?;

        // Everything reachable from a surfaced entry must be computed
        let mut needed = vec![false; entries.len()];
        let mut stack: Vec<usize> = (0..entries.len())
            .filter(|&i| !entries[i].is_disabled())
            .collect();
        while let Some(i) = stack.pop() {
            if needed[i] {
                continue;
            }
            needed[i] = true;
            stack.extend(deps[i].iter().copied());
        }

        let builders = entries
            .iter()
            .enumerate()
            .filter(|(i, _)| needed[*i])
            .filter_map(|(_, entry)| entry.as_builder().cloned())
            .collect();

        let formulas = order
            .iter()
            .filter(|&&i| needed[i])
            .filter_map(|&i| {
                exprs[i].take().map(|expr| PlannedFormula {
                    name: names[i].to_string(),
                    expr,
                })
            })
            .collect();

        let surfaced = names
            .iter()
            .zip(&entries)
            .filter(|(_, entry)| !entry.is_disabled())
            .map(|(name, _)| name.to_string())
            .collect();

        let reduce_to = names
            .iter()
            .map(|name| (name.to_string(), composite.effective_reduce_to(name)))
            .collect();

        Ok(Self {
            builders,
            formulas,
            surfaced,
            reduce_to,
        })
    }

    /// Builder queries to dispatch, in name order
    pub fn builders(&self) -> &[BuilderQuery] {
        &self.builders
    }

    /// Formulas to evaluate, each after everything it references
    pub fn formulas(&self) -> &[PlannedFormula] {
        &self.formulas
    }

    /// Names whose results appear in the output, in name order
    pub fn surfaced(&self) -> &[String] {
        &self.surfaced
    }

    /// Effective table reduction of an entry
    pub fn reduce_to(&self, name: &str) -> ReduceTo {
        self.reduce_to.get(name).copied().unwrap_or_default()
    }
}

/// Depth-first topological sort over index adjacency
///
/// Returns indices with every node after the nodes it depends on. A back edge
/// yields [`ValidationError::Cycle`] with the offending path, first node repeated.
fn topological_order(names: &[&str], deps: &[Vec<usize>]) -> Result<Vec<usize>, ValidationError> {
    let mut marks = vec![Mark::Unvisited; names.len()];
    let mut order = Vec::with_capacity(names.len());
    let mut path: Vec<usize> = Vec::new();

    for root in 0..names.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // Explicit stack of (node, next dependency to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::InProgress;
        path.push(root);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let next = deps[node].get(frame.1).copied();
            frame.1 += 1;

            if let Some(dep) = next {
                match marks[dep] {
                    Mark::Done => {}
                    Mark::InProgress => {
                        let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|&n| names[n].to_string()).collect();
                        cycle.push(names[dep].to_string());
                        return Err(ValidationError::Cycle(cycle));
                    }
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        path.push(dep);
                        stack.push((dep, 0));
                    }
                }
            } else {
                marks[node] = Mark::Done;
                order.push(node);
                path.pop();
                stack.pop();
            }
        }
    }

    Ok(order)
}
