//! Action trait.

use async_trait::async_trait;
use registrar_common::{AppResult, Grants};
use std::sync::Arc;

use crate::context::RuleContext;

static NO_GRANTS: Grants = Grants::new();

/// Something a rule does once its conditions pass.
///
/// Operation-grant actions report the operations they grant and do nothing
/// when executed. Side-effect actions grant nothing.
#[async_trait]
pub trait Action: Send + Sync {
    fn plugin_id(&self) -> &str;

    fn granted_operations(&self) -> &Grants {
        &NO_GRANTS
    }

    async fn execute(&self, ctx: &RuleContext) -> AppResult<()>;
}

/// A shared action for dynamic dispatch.
pub type BoxedAction = Arc<dyn Action>;
