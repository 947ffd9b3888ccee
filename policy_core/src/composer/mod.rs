//! Response composer - packages a selection into a token-budgeted composition.
//!
//! The selector already honors continuity and slot limits; the composer
//! re-checks them so a composition that reaches the generator is always
//! well formed, whatever produced the selection.

use serde::Serialize;
use tracing::warn;

use crate::catalog::ActionRole;
use crate::config::BudgetConfig;
use crate::selector::{SelectedAction, Selection};

/// Maximum number of proactive entries in one composition.
pub const MAX_PROACTIVE: usize = 2;

/// One reactive entry, up to two proactive entries, and their budgets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition<'a> {
    reactive: SelectedAction<'a>,
    proactive: Vec<SelectedAction<'a>>,
    ceiling: u32,
}

impl<'a> Composition<'a> {
    pub fn reactive(&self) -> &SelectedAction<'a> {
        &self.reactive
    }

    pub fn proactive(&self) -> &[SelectedAction<'a>] {
        &self.proactive
    }

    /// All entries, reactive first.
    pub fn entries(&self) -> impl Iterator<Item = &SelectedAction<'a>> {
        std::iter::once(&self.reactive).chain(self.proactive.iter())
    }

    pub fn action_ids(&self) -> Vec<&str> {
        self.entries().map(|e| e.id()).collect()
    }

    /// Sum of all slot budgets; never above [`Composition::ceiling`].
    pub fn total_budget(&self) -> u32 {
        self.entries().map(|e| e.budget).sum()
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

/// Builds compositions under a fixed budget table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseComposer {
    budget: BudgetConfig,
}

impl ResponseComposer {
    pub fn new(budget: BudgetConfig) -> Self {
        Self { budget }
    }

    pub fn compose<'a>(&self, selection: Selection<'a>) -> Composition<'a> {
        let mut reactive = selection.reactive;
        reactive.role = ActionRole::Reactive;
        reactive.budget = self.budget.reactive.min(self.budget.ceiling);

        let mut proactive: Vec<SelectedAction<'a>> = Vec::with_capacity(MAX_PROACTIVE);
        for entry in selection.proactive {
            if entry.id() == reactive.id() || proactive.iter().any(|p| p.id() == entry.id()) {
                warn!(action = %entry.id(), "dropping duplicate entry from composition");
                continue;
            }
            if entry.category() == reactive.category() && !entry.action.shares_context(reactive.action) {
                warn!(
                    action = %entry.id(),
                    category = %entry.category(),
                    "dropping proactive entry that jumps context"
                );
                continue;
            }
            if proactive.len() == MAX_PROACTIVE {
                warn!(action = %entry.id(), "dropping proactive entry past the slot limit");
                continue;
            }
            proactive.push(entry);
        }

        let mut remaining = self.budget.ceiling - reactive.budget;
        for (position, entry) in proactive.iter_mut().enumerate() {
            entry.role = ActionRole::Proactive;
            entry.budget = self.budget.proactive_slot(position).min(remaining);
            remaining -= entry.budget;
        }
        // An entry the ceiling left no tokens for cannot be generated.
        proactive.retain(|entry| {
            if entry.budget == 0 {
                warn!(action = %entry.id(), "dropping proactive entry with no budget left");
            }
            entry.budget > 0
        });

        Composition {
            reactive,
            proactive,
            ceiling: self.budget.ceiling,
        }
    }
}
