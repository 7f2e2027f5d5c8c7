//! Reconciliation of a recipe's persisted children against an edited set.
//!
//! Ingredients are diffed by primary key. Steps have no identity worth
//! keeping across edits and are replaced wholesale.

use std::collections::{HashMap, HashSet};

use crate::models::IngredientInput;

/// Mutations that bring a recipe's ingredient rows in line with an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngredientPlan {
    pub to_insert: Vec<IngredientInput>,
    /// `(id, payload)` for every id-bearing incoming row, changed or not.
    pub to_update: Vec<(i64, IngredientInput)>,
    pub to_delete: Vec<i64>,
    /// Incoming ids that do not belong to the recipe.
    pub unknown_ids: Vec<i64>,
}

impl IngredientPlan {
    #[must_use]
    pub fn is_applicable(&self) -> bool {
        self.unknown_ids.is_empty()
    }
}

/// A step ready to be written, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStep {
    pub step_number: i64,
    pub description: String,
}

/// Partition `incoming` against the ids currently stored for the recipe.
///
/// Rows without an id are inserts. Every row with an id is an update; when
/// the same id appears more than once the last payload wins and the first
/// position is kept. Existing ids missing from `incoming` are deletes, in
/// their stored order.
#[must_use]
pub fn reconcile(existing_ids: &[i64], incoming: &[IngredientInput]) -> IngredientPlan {
    let existing: HashSet<i64> = existing_ids.iter().copied().collect();

    let mut plan = IngredientPlan::default();
    let mut update_pos: HashMap<i64, usize> = HashMap::new();

    for row in incoming {
        let Some(id) = row.id else {
            plan.to_insert.push(row.clone());
            continue;
        };
        if !existing.contains(&id) {
            if !plan.unknown_ids.contains(&id) {
                plan.unknown_ids.push(id);
            }
            continue;
        }
        match update_pos.get(&id) {
            Some(&pos) => plan.to_update[pos].1 = row.clone(),
            None => {
                update_pos.insert(id, plan.to_update.len());
                plan.to_update.push((id, row.clone()));
            }
        }
    }

    plan.to_delete = existing_ids
        .iter()
        .copied()
        .filter(|id| !update_pos.contains_key(id))
        .collect();

    plan
}

/// Number descriptions 1..N in the order given.
#[must_use]
pub fn number_steps(descriptions: &[String]) -> Vec<NewStep> {
    descriptions
        .iter()
        .zip(1..)
        .map(|(description, step_number)| NewStep {
            step_number,
            description: description.clone(),
        })
        .collect()
}
