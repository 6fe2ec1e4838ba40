//! # Rollback Log
//!
//! Each side effect of a write registers its undo action before it happens.
//! If the write fails, the actions run in registration order; if it
//! succeeds, they are dropped unrun. Running is best effort: a failing
//! action is logged and the remaining ones still run.

use std::path::PathBuf;

use crate::dirs;
use crate::staging::StagingFile;

/// One undo step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    /// Close and delete the staging file, if one was opened.
    DiscardStaging,
    /// Remove empty directories from `start` up to, not including, `root`.
    PruneEmptyDirs { root: PathBuf, start: PathBuf },
}

#[derive(Debug, Default)]
pub struct RollbackSet {
    actions: Vec<RollbackAction>,
}

impl RollbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: RollbackAction) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[RollbackAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in order. Returns the number of actions that failed.
    pub fn run(self, mut staging: Option<&mut StagingFile>) -> usize {
        let mut failures = 0;
        for action in self.actions {
            match action {
                RollbackAction::DiscardStaging => {
                    let Some(file) = staging.as_deref_mut() else {
                        continue;
                    };
                    if let Err(e) = file.rollback() {
                        tracing::error!(
                            path = %file.target().display(),
                            error = %e,
                            "failed to discard staging file"
                        );
                        failures += 1;
                    }
                }
                RollbackAction::PruneEmptyDirs { root, start } => {
                    if let Err(e) = dirs::prune_empty_ancestors(&root, &start) {
                        tracing::error!(
                            path = %start.display(),
                            error = %e,
                            "failed to clean empty directories"
                        );
                        failures += 1;
                    }
                }
            }
        }
        failures
    }
}
