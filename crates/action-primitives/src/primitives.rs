//! The page driver contract.

use async_trait::async_trait;
use webpilot_core_types::{TabId, TabInfo};

use crate::errors::ActionError;
use crate::types::{ActionReport, ElementTarget, ExecCtx, ScrollRequest, WaitTier};

/// Live interactions with the page a loop currently drives.
///
/// Implementations check `ctx` before touching the page and return
/// [`ActionError::Interrupted`] or [`ActionError::WaitTimeout`] when it is
/// cancelled or past its deadline. Element targets are addressed through
/// their frame tag and locator, never by index.
#[async_trait]
pub trait ActionPrimitives: Send + Sync {
    async fn navigate(
        &self,
        ctx: &ExecCtx,
        url: &str,
        wait: WaitTier,
    ) -> Result<ActionReport, ActionError>;

    async fn go_back(&self, ctx: &ExecCtx) -> Result<ActionReport, ActionError>;

    async fn click(&self, ctx: &ExecCtx, target: &ElementTarget)
        -> Result<ActionReport, ActionError>;

    async fn type_text(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
        text: &str,
        clear: bool,
    ) -> Result<ActionReport, ActionError>;

    async fn select_option(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
        value: &str,
    ) -> Result<ActionReport, ActionError>;

    async fn scroll(&self, ctx: &ExecCtx, request: &ScrollRequest)
        -> Result<ActionReport, ActionError>;

    /// Keyboard input to the focused element, e.g. `Enter` or `Control+a`.
    async fn send_keys(&self, ctx: &ExecCtx, keys: &str) -> Result<ActionReport, ActionError>;

    async fn switch_tab(&self, ctx: &ExecCtx, tab: &TabId) -> Result<ActionReport, ActionError>;

    async fn open_tab(&self, ctx: &ExecCtx, url: &str) -> Result<ActionReport, ActionError>;

    async fn close_tab(&self, ctx: &ExecCtx, tab: &TabId) -> Result<ActionReport, ActionError>;

    /// Visible text of the active page.
    async fn extract_text(&self, ctx: &ExecCtx) -> Result<String, ActionError>;

    async fn tabs(&self) -> Result<Vec<TabInfo>, ActionError>;
}
