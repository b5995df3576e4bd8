use shared::domain::ActionInstance;

use crate::registry::RunContext;

/// Catalog of actions handled inside the process rather than by a live
/// connector (surface page navigation and the like). Execution is
/// synchronous.
pub trait InternalCatalog: Send + Sync {
    /// `None` means the action kind is unknown to the catalog;
    /// `Some(false)` means it was recognized but failed.
    fn execute_action(&self, action: &ActionInstance, ctx: &RunContext) -> Option<bool>;
}

/// Catalog that recognizes nothing.
pub struct EmptyInternalCatalog;

impl InternalCatalog for EmptyInternalCatalog {
    fn execute_action(&self, _action: &ActionInstance, _ctx: &RunContext) -> Option<bool> {
        None
    }
}
