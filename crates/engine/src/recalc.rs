#![forbid(unsafe_code)]

use crate::{Engine, EngineError};
use tm_core::facts::{Ledger, propagate_item};
use tm_core::ids::ProjectId;
use tm_storage::PropagationUpdate;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropagationOutcome {
    pub filled: usize,
    pub descriptions_updated: usize,
}

impl Engine {
    pub fn ledger_get(&self, project: &ProjectId) -> Result<String, EngineError> {
        Ok(self.store().ledger_get(project)?)
    }

    // Merges confirmed-fact lines into the project ledger and returns the
    // rendered result.
    pub fn ledger_append(
        &mut self,
        project: &ProjectId,
        text: &str,
    ) -> Result<String, EngineError> {
        Ok(self.store_mut().ledger_merge(project, text)?)
    }

    // The "recalculate" pass: back-fills unanswered clarification questions
    // across the whole backlog from the confirmed-facts ledger. Persisting
    // is one atomic unit; re-running with the same ledger is a no-op.
    pub fn recalculate(&mut self, project: &ProjectId) -> Result<PropagationOutcome, EngineError> {
        let ledger = Ledger::parse(&self.store().ledger_get(project)?);
        if ledger.is_empty() {
            return Ok(PropagationOutcome::default());
        }

        let items = self.store().items_list(project)?;
        let mut updates: Vec<PropagationUpdate> = Vec::new();
        let mut outcome = PropagationOutcome::default();

        for item in items {
            let mut questions = item.questions.clone();
            let mut description = item.description.clone();
            let result = propagate_item(&ledger, &mut questions, &mut description);
            if result.filled == 0 && !result.description_updated {
                continue;
            }
            outcome.filled += result.filled;
            if result.description_updated {
                outcome.descriptions_updated += 1;
            }
            updates.push(PropagationUpdate {
                external_id: item.external_id,
                description,
                questions,
            });
        }

        self.store_mut()
            .apply_propagation(project, &updates, outcome.filled)?;
        Ok(outcome)
    }
}
