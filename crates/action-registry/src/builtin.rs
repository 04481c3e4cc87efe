//! Built-in browser actions.

use std::time::Duration;

use action_primitives::{ActionError, ElementTarget, ScrollDirection, ScrollRequest, WaitTier};
use async_trait::async_trait;
use serde_json::json;
use webpilot_core_types::TabId;

use crate::errors::RegistryError;
use crate::registry::ActionRegistry;
use crate::schema::{ParamField, ParamKind, ParamSchema, ValidatedParams};
use crate::spec::{ActionCall, ActionHandler, ActionOutcome, ActionSpec};

/// Longest pause the `wait` action honours.
pub const MAX_WAIT_MS: u64 = 60_000;

/// Headroom left before the action deadline so a capped wait still returns.
const WAIT_DEADLINE_SLACK: Duration = Duration::from_millis(250);

/// Register the default action set in prompt order.
pub fn register_defaults(registry: &ActionRegistry) -> Result<(), RegistryError> {
    for spec in default_specs() {
        registry.register(spec)?;
    }
    Ok(())
}

pub fn default_specs() -> Vec<ActionSpec> {
    vec![
        ActionSpec::new("navigate", "Open a URL in the current tab.", Navigate)
            .with_params(
                ParamSchema::new().field(ParamField::required(
                    "url",
                    ParamKind::Url,
                    "Absolute URL to load",
                )),
            )
            .changes_page(),
        ActionSpec::new("go_back", "Go back to the previous page in history.", GoBack)
            .changes_page(),
        ActionSpec::new("click", "Click an interactive element by index.", Click).with_params(
            ParamSchema::new().field(ParamField::required(
                "index",
                ParamKind::ElementIndex,
                "Index of the element to click",
            )),
        ),
        ActionSpec::new(
            "input_text",
            "Type text into an input, textarea or editable element.",
            InputText,
        )
        .with_params(
            ParamSchema::new()
                .field(ParamField::required(
                    "index",
                    ParamKind::ElementIndex,
                    "Index of the field",
                ))
                .field(ParamField::required("text", ParamKind::String, "Text to type"))
                .field(ParamField::optional(
                    "clear",
                    ParamKind::Boolean,
                    "Clear existing content first (default true)",
                )),
        ),
        ActionSpec::new(
            "select_option",
            "Choose an option of a dropdown by its value or visible text.",
            SelectOption,
        )
        .with_params(
            ParamSchema::new()
                .field(ParamField::required(
                    "index",
                    ParamKind::ElementIndex,
                    "Index of the select element",
                ))
                .field(ParamField::required(
                    "value",
                    ParamKind::String,
                    "Option value or visible text",
                )),
        ),
        ActionSpec::new(
            "scroll",
            "Scroll the page, or a scrollable element when an index is given.",
            Scroll,
        )
        .with_params(
            ParamSchema::new()
                .field(ParamField::required(
                    "direction",
                    ParamKind::Enum(vec!["up".into(), "down".into()]),
                    "Scroll direction",
                ))
                .field(ParamField::optional(
                    "amount",
                    ParamKind::Integer,
                    "Pixels to scroll; defaults to one viewport",
                ))
                .field(ParamField::optional(
                    "index",
                    ParamKind::ElementIndex,
                    "Scrollable element to scroll instead of the page",
                )),
        ),
        ActionSpec::new(
            "send_keys",
            "Send keyboard keys to the focused element, e.g. Enter or Control+a.",
            SendKeys,
        )
        .with_params(ParamSchema::new().field(ParamField::required(
            "keys",
            ParamKind::String,
            "Key combination",
        ))),
        ActionSpec::new("switch_tab", "Make another open tab the active one.", SwitchTab)
            .with_params(tab_param("Tab to activate"))
            .changes_page(),
        ActionSpec::new("open_tab", "Open a URL in a new tab and switch to it.", OpenTab)
            .with_params(ParamSchema::new().field(ParamField::required(
                "url",
                ParamKind::Url,
                "Absolute URL to load",
            )))
            .changes_page(),
        ActionSpec::new("close_tab", "Close an open tab.", CloseTab)
            .with_params(tab_param("Tab to close"))
            .changes_page(),
        ActionSpec::new(
            "extract_content",
            "Return the visible text of the current page.",
            ExtractContent,
        ),
        ActionSpec::new("wait", "Pause before the next action.", Wait).with_params(
            ParamSchema::new().field(ParamField::required(
                "ms",
                ParamKind::Integer,
                "Milliseconds to wait, at most 60000; capped to the action timeout",
            )),
        ),
        ActionSpec::new(
            "done",
            "Finish the task and report whether it succeeded.",
            Done,
        )
        .with_params(
            ParamSchema::new()
                .field(ParamField::required(
                    "success",
                    ParamKind::Boolean,
                    "Whether the task was accomplished",
                ))
                .field(ParamField::required(
                    "text",
                    ParamKind::String,
                    "Final answer or summary for the user",
                )),
        ),
    ]
}

fn tab_param(description: &str) -> ParamSchema {
    ParamSchema::new().field(ParamField::required(
        "tab_id",
        ParamKind::String,
        description,
    ))
}

fn required_str<'a>(params: &'a ValidatedParams, name: &str) -> Result<&'a str, ActionError> {
    params
        .str(name)
        .ok_or_else(|| ActionError::Internal(format!("validated parameter `{}` missing", name)))
}

fn required_element<'a>(call: &ActionCall<'a>) -> Result<&'a ElementTarget, ActionError> {
    call.element
        .ok_or_else(|| ActionError::Internal("element target missing".to_string()))
}

struct Navigate;

#[async_trait]
impl ActionHandler for Navigate {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let url = required_str(call.params, "url")?;
        let report = call.page.navigate(call.ctx, url, WaitTier::DomReady).await?;
        Ok(ActionOutcome::from_report(report, format!("navigated to {}", url)))
    }
}

struct GoBack;

#[async_trait]
impl ActionHandler for GoBack {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let report = call.page.go_back(call.ctx).await?;
        Ok(ActionOutcome::from_report(report, "navigated back"))
    }
}

struct Click;

#[async_trait]
impl ActionHandler for Click {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let target = required_element(&call)?;
        let report = call.page.click(call.ctx, target).await?;
        Ok(ActionOutcome::from_report(
            report,
            format!("clicked element [{}]", target.index),
        ))
    }
}

struct InputText;

#[async_trait]
impl ActionHandler for InputText {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let target = required_element(&call)?;
        let text = required_str(call.params, "text")?;
        let clear = call.params.bool("clear").unwrap_or(true);
        let report = call.page.type_text(call.ctx, target, text, clear).await?;
        Ok(ActionOutcome::from_report(
            report,
            format!("typed {:?} into element [{}]", text, target.index),
        ))
    }
}

struct SelectOption;

#[async_trait]
impl ActionHandler for SelectOption {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let target = required_element(&call)?;
        let value = required_str(call.params, "value")?;
        let report = call.page.select_option(call.ctx, target, value).await?;
        Ok(ActionOutcome::from_report(
            report,
            format!("selected {:?} in element [{}]", value, target.index),
        ))
    }
}

struct Scroll;

#[async_trait]
impl ActionHandler for Scroll {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let direction = match required_str(call.params, "direction")? {
            "up" => ScrollDirection::Up,
            _ => ScrollDirection::Down,
        };
        let amount = match call.params.i64("amount") {
            Some(pixels) if pixels <= 0 => {
                return Err(ActionError::ScrollTargetInvalid(format!(
                    "scroll amount must be positive, got {}",
                    pixels
                )))
            }
            Some(pixels) => Some(u32::try_from(pixels).unwrap_or(u32::MAX)),
            None => None,
        };
        let request = ScrollRequest {
            direction,
            amount,
            target: call.element.cloned(),
        };
        let report = call.page.scroll(call.ctx, &request).await?;
        let what = match call.element {
            Some(target) => format!("element [{}]", target.index),
            None => "page".to_string(),
        };
        let distance = match amount {
            Some(pixels) => format!("{} px", pixels),
            None => "one viewport".to_string(),
        };
        let way = match direction {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        };
        Ok(ActionOutcome::from_report(
            report,
            format!("scrolled {} {} by {}", what, way, distance),
        ))
    }
}

struct SendKeys;

#[async_trait]
impl ActionHandler for SendKeys {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let keys = required_str(call.params, "keys")?;
        let report = call.page.send_keys(call.ctx, keys).await?;
        Ok(ActionOutcome::from_report(report, format!("sent keys {}", keys)))
    }
}

struct SwitchTab;

#[async_trait]
impl ActionHandler for SwitchTab {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let tab = TabId::new(required_str(call.params, "tab_id")?);
        if !call.observation.tabs.iter().any(|t| t.id == tab) {
            return Err(ActionError::TabNotFound(tab.to_string()));
        }
        let report = call.page.switch_tab(call.ctx, &tab).await?;
        Ok(ActionOutcome::from_report(report, format!("switched to tab {}", tab)))
    }
}

struct OpenTab;

#[async_trait]
impl ActionHandler for OpenTab {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let url = required_str(call.params, "url")?;
        let report = call.page.open_tab(call.ctx, url).await?;
        Ok(ActionOutcome::from_report(report, format!("opened {} in a new tab", url)))
    }
}

struct CloseTab;

#[async_trait]
impl ActionHandler for CloseTab {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let tab = TabId::new(required_str(call.params, "tab_id")?);
        let report = call.page.close_tab(call.ctx, &tab).await?;
        Ok(ActionOutcome::from_report(report, format!("closed tab {}", tab)))
    }
}

struct ExtractContent;

#[async_trait]
impl ActionHandler for ExtractContent {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let text = call.page.extract_text(call.ctx).await?;
        let message = format!(
            "extracted {} characters from {}",
            text.chars().count(),
            call.observation.url
        );
        Ok(ActionOutcome::message(message).with_extracted(json!({
            "url": call.observation.url,
            "text": text,
        })))
    }
}

struct Wait;

#[async_trait]
impl ActionHandler for Wait {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let requested = call.params.i64("ms").unwrap_or(0).clamp(0, MAX_WAIT_MS as i64) as u64;
        let budget = call
            .ctx
            .remaining_time()
            .saturating_sub(WAIT_DEADLINE_SLACK)
            .as_millis() as u64;
        let ms = requested.min(budget);
        let message = if ms < requested {
            format!("waited {ms} ms (requested {requested} ms, capped by the action timeout)")
        } else {
            format!("waited {ms} ms")
        };
        tokio::select! {
            _ = call.ctx.cancel_token.cancelled() => {
                Err(ActionError::Interrupted("wait cancelled".to_string()))
            }
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                Ok(ActionOutcome::message(message))
            }
        }
    }
}

struct Done;

#[async_trait]
impl ActionHandler for Done {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError> {
        let success = call.params.bool("success").unwrap_or(false);
        let text = required_str(call.params, "text")?;
        Ok(ActionOutcome::finished(success, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_register_cleanly_in_order() {
        let registry = ActionRegistry::with_builtin_actions().unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "navigate",
                "go_back",
                "click",
                "input_text",
                "select_option",
                "scroll",
                "send_keys",
                "switch_tab",
                "open_tab",
                "close_tab",
                "extract_content",
                "wait",
                "done",
            ]
        );
    }

    #[test]
    fn page_changing_actions_are_declared() {
        let changing: Vec<String> = default_specs()
            .iter()
            .filter(|spec| spec.is_page_changing())
            .map(|spec| spec.name().to_string())
            .collect();
        assert_eq!(
            changing,
            vec!["navigate", "go_back", "switch_tab", "open_tab", "close_tab"]
        );
    }

    #[test]
    fn registering_defaults_twice_fails() {
        let registry = ActionRegistry::with_builtin_actions().unwrap();
        assert_eq!(
            register_defaults(&registry),
            Err(RegistryError::DuplicateAction("navigate".into()))
        );
    }
}
