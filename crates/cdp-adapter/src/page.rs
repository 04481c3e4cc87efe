//! A Chromium tab driven through DevTools: observation source and action
//! primitives in one handle.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use action_primitives::{
    ActionError, ActionPrimitives, ActionReport, ElementTarget, ExecCtx, ScrollDirection,
    ScrollRequest, WaitTier,
};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, GetNavigationHistoryParams, NavigateParams,
    NavigateToHistoryEntryParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use perceiver_structural::{ObservationError, PageObserver, RawPageSnapshot};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use webpilot_core_types::{TabId, TabInfo};

use crate::config::CdpConfig;
use crate::errors::{AdapterError, AdapterErrorKind};
use crate::keys::{parse_keys, KeyChord};
use crate::snapshot::{build_tree, SnapshotPayload, SNAPSHOT_JS};

const DOM_OPS_JS: &str = include_str!("js/dom_ops.js");

/// Quiet period after the load event for [`WaitTier::Idle`].
const IDLE_QUIET: Duration = Duration::from_millis(500);
const READY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct DomOpResult {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
}

impl DomOpResult {
    fn into_result(self) -> Result<Self, AdapterError> {
        if self.ok {
            return Ok(self);
        }
        let kind = match self.error.as_deref() {
            Some("not_found") => AdapterErrorKind::TargetNotFound,
            Some("frame_detached") => AdapterErrorKind::FrameDetached,
            Some("disabled") => AdapterErrorKind::Disabled,
            Some("not_interactable") => AdapterErrorKind::NotInteractable,
            Some("option_not_found") => AdapterErrorKind::OptionNotFound,
            Some("not_scrollable") => AdapterErrorKind::NotScrollable,
            _ => AdapterErrorKind::Internal,
        };
        let mut err = AdapterError::new(kind);
        if let Some(detail) = self.detail {
            err = err.with_hint(detail);
        }
        Err(err)
    }
}

/// The tab a loop drives, plus the browser it lives in for tab operations.
pub struct ChromiumPage {
    browser: Arc<Browser>,
    active: RwLock<Page>,
    config: CdpConfig,
}

impl ChromiumPage {
    pub(crate) fn new(browser: Arc<Browser>, page: Page, config: CdpConfig) -> Self {
        Self {
            browser,
            active: RwLock::new(page),
            config,
        }
    }

    pub async fn active_tab(&self) -> TabId {
        TabId::new(self.active.read().await.target_id().inner().clone())
    }

    async fn page(&self) -> Page {
        self.active.read().await.clone()
    }

    async fn current_url(&self, page: &Page) -> Option<String> {
        page.url().await.ok().flatten()
    }

    async fn find_tab(&self, tab: &TabId) -> Result<Page, AdapterError> {
        let pages = self.browser.pages().await?;
        pages
            .into_iter()
            .find(|page| page.target_id().inner() == tab.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::TabNotFound).with_hint(tab.to_string())
            })
    }

    async fn tab_infos(&self) -> Result<Vec<TabInfo>, AdapterError> {
        let active = self.active_tab().await;
        let mut tabs = Vec::new();
        for page in self.browser.pages().await? {
            let id = TabId::new(page.target_id().inner().clone());
            tabs.push(TabInfo {
                active: id == active,
                url: page.url().await.ok().flatten().unwrap_or_default(),
                title: page.get_title().await.ok().flatten().unwrap_or_default(),
                id,
            });
        }
        Ok(tabs)
    }

    async fn dom_op(
        &self,
        page: &Page,
        op: &str,
        target: &ElementTarget,
        arg: Value,
    ) -> Result<DomOpResult, AdapterError> {
        let script = format!(
            "({})({}, {}, {}, {}, {})",
            DOM_OPS_JS,
            json!(op),
            json!(target.locator.frame_xpaths),
            json!(target.locator.xpath),
            json!(target.locator.css_selector),
            arg
        );
        let result: DomOpResult = evaluate(page, script).await?;
        result.into_result()
    }

    async fn click_at(&self, page: &Page, x: f64, y: f64) -> Result<(), AdapterError> {
        for kind in [
            DispatchMouseEventType::MouseMoved,
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let mut builder = DispatchMouseEventParams::builder().r#type(kind.clone()).x(x).y(y);
            if kind != DispatchMouseEventType::MouseMoved {
                builder = builder.button(MouseButton::Left).click_count(1);
            }
            let params = builder.build().map_err(internal)?;
            page.execute(params).await?;
        }
        Ok(())
    }

    async fn press(&self, page: &Page, chord: &KeyChord) -> Result<(), AdapterError> {
        let down_type = if chord.text.is_some() {
            DispatchKeyEventType::KeyDown
        } else {
            DispatchKeyEventType::RawKeyDown
        };
        let mut down = DispatchKeyEventParams::builder()
            .r#type(down_type)
            .key(chord.key.clone())
            .code(chord.code.clone())
            .windows_virtual_key_code(chord.virtual_key)
            .modifiers(chord.modifiers);
        if let Some(text) = &chord.text {
            down = down.text(text.clone());
        }
        page.execute(down.build().map_err(internal)?).await?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(chord.key.clone())
            .code(chord.code.clone())
            .windows_virtual_key_code(chord.virtual_key)
            .modifiers(chord.modifiers)
            .build()
            .map_err(internal)?;
        page.execute(up).await?;
        Ok(())
    }

    async fn wait_ready(&self, page: &Page, budget: Duration) -> Result<(), AdapterError> {
        let deadline = Instant::now() + budget;
        loop {
            let state: String = evaluate(page, "document.readyState".to_string()).await?;
            if state == "complete" || Instant::now() >= deadline {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn finish(
        &self,
        page: &Page,
        report: ActionReport,
        started: Instant,
        url_before: Option<String>,
        navigated: bool,
    ) -> ActionReport {
        let url_after = self.current_url(page).await;
        let navigated = navigated || (url_before.is_some() && url_after != url_before);
        report.finish(started, url_after, navigated)
    }
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: String) -> Result<T, AdapterError> {
    page.evaluate(script)
        .await?
        .into_value::<T>()
        .map_err(|err| {
            AdapterError::new(AdapterErrorKind::Malformed)
                .with_hint(format!("failed to decode script result: {err}"))
        })
}

fn internal(message: String) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Internal).with_hint(message)
}

/// Run one page interaction under the action's deadline and cancellation.
async fn bounded<T, F>(ctx: &ExecCtx, fut: F) -> Result<T, ActionError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    ctx.ensure_live()?;
    tokio::select! {
        _ = ctx.cancel_token.cancelled() => {
            Err(ActionError::Interrupted("cancelled while driving the page".to_string()))
        }
        outcome = tokio::time::timeout(ctx.remaining_time(), fut) => match outcome {
            Ok(result) => result.map_err(ActionError::from),
            Err(_) => Err(ActionError::WaitTimeout("action deadline exceeded".to_string())),
        },
    }
}

fn nav_timeout(err: ActionError, url: &str) -> ActionError {
    match err {
        ActionError::WaitTimeout(_) => ActionError::NavTimeout(format!("loading {url}")),
        other => other,
    }
}

#[async_trait]
impl PageObserver for ChromiumPage {
    async fn capture(&self) -> Result<RawPageSnapshot, ObservationError> {
        let page = self.page().await;
        let script = format!("({})({})", SNAPSHOT_JS, self.config.snapshot_node_limit);
        let payload: SnapshotPayload = evaluate(&page, script).await?;
        if payload.truncated {
            warn!(
                url = %payload.url,
                limit = self.config.snapshot_node_limit,
                "snapshot script hit its node limit"
            );
        }
        let node_count = payload.nodes.len();
        let root = build_tree(payload.nodes)?;
        let tabs = self.tab_infos().await?;

        let mut snapshot = RawPageSnapshot::new(payload.url, payload.title, root)
            .with_tabs(tabs)
            .with_viewport(payload.viewport.into());

        if self.config.capture_screenshots {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            match page.screenshot(params).await {
                Ok(bytes) => {
                    snapshot = snapshot
                        .with_screenshot(base64::engine::general_purpose::STANDARD.encode(bytes));
                }
                Err(err) => warn!(error = %err, "screenshot failed; continuing without it"),
            }
        }

        debug!(url = %snapshot.url, nodes = node_count, "captured page");
        Ok(snapshot)
    }

    async fn settle(&self, budget: Duration) -> Result<(), ObservationError> {
        let page = self.page().await;
        self.wait_ready(&page, budget).await?;
        Ok(())
    }
}

#[async_trait]
impl ActionPrimitives for ChromiumPage {
    async fn navigate(
        &self,
        ctx: &ExecCtx,
        url: &str,
        wait: WaitTier,
    ) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "navigate");
        let page = self.page().await;
        bounded(ctx, async {
            match wait {
                WaitTier::None => {
                    page.execute(NavigateParams::new(url)).await?;
                }
                WaitTier::DomReady => {
                    page.goto(url).await?;
                }
                WaitTier::Idle => {
                    page.goto(url).await?;
                    tokio::time::sleep(IDLE_QUIET).await;
                }
            }
            Ok::<_, AdapterError>(())
        })
        .await
        .map_err(|err| nav_timeout(err, url))?;
        Ok(self.finish(&page, report, started, None, true).await)
    }

    async fn go_back(&self, ctx: &ExecCtx) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "go_back");
        let page = self.page().await;
        bounded(ctx, async {
            let history = page.execute(GetNavigationHistoryParams::default()).await?;
            let current = history.result.current_index;
            if current <= 0 {
                return Err(AdapterError::new(AdapterErrorKind::NotInteractable)
                    .with_hint("no previous page in history"));
            }
            let entry = history
                .result
                .entries
                .get((current - 1) as usize)
                .ok_or_else(|| internal("history index out of range".to_string()))?;
            page.execute(NavigateToHistoryEntryParams::new(entry.id))
                .await?;
            page.wait_for_navigation().await?;
            Ok::<_, AdapterError>(())
        })
        .await?;
        Ok(self.finish(&page, report, started, None, true).await)
    }

    async fn click(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
    ) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "click");
        let page = self.page().await;
        let before = self.current_url(&page).await;
        bounded(ctx, async {
            let point = self.dom_op(&page, "point", target, Value::Null).await?;
            let (x, y) = point
                .x
                .zip(point.y)
                .ok_or_else(|| internal("point op returned no coordinates".to_string()))?;
            self.click_at(&page, x, y).await
        })
        .await?;
        debug!(index = target.index, frame = %target.frame, "clicked element");
        Ok(self.finish(&page, report, started, before, false).await)
    }

    async fn type_text(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
        text: &str,
        clear: bool,
    ) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "type_text");
        let page = self.page().await;
        let before = self.current_url(&page).await;
        bounded(ctx, async {
            self.dom_op(&page, "focus", target, json!(clear)).await?;
            page.execute(InsertTextParams::new(text)).await?;
            Ok::<_, AdapterError>(())
        })
        .await?;
        Ok(self.finish(&page, report, started, before, false).await)
    }

    async fn select_option(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
        value: &str,
    ) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "select_option");
        let page = self.page().await;
        let before = self.current_url(&page).await;
        bounded(ctx, self.dom_op(&page, "select", target, json!(value))).await?;
        Ok(self.finish(&page, report, started, before, false).await)
    }

    async fn scroll(
        &self,
        ctx: &ExecCtx,
        request: &ScrollRequest,
    ) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "scroll");
        let page = self.page().await;
        let sign = match request.direction {
            ScrollDirection::Up => -1.0,
            ScrollDirection::Down => 1.0,
        };
        bounded(ctx, async {
            match &request.target {
                Some(target) => {
                    let pixels = request.amount.unwrap_or(self.config.viewport_height) as f64;
                    self.dom_op(&page, "scroll", target, json!(sign * pixels))
                        .await?;
                }
                None => {
                    let script = format!(
                        "(function(dir, amount) {{ const px = amount === null ? window.innerHeight : amount; window.scrollBy(0, dir * px); return window.scrollY; }})({}, {})",
                        sign,
                        json!(request.amount)
                    );
                    let _: f64 = evaluate(&page, script).await?;
                }
            }
            Ok::<_, AdapterError>(())
        })
        .await?;
        Ok(self.finish(&page, report, started, None, false).await)
    }

    async fn send_keys(&self, ctx: &ExecCtx, keys: &str) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "send_keys");
        let chords = parse_keys(keys)?;
        let page = self.page().await;
        let before = self.current_url(&page).await;
        bounded(ctx, async {
            for chord in &chords {
                self.press(&page, chord).await?;
            }
            Ok::<_, AdapterError>(())
        })
        .await?;
        Ok(self.finish(&page, report, started, before, false).await)
    }

    async fn switch_tab(&self, ctx: &ExecCtx, tab: &TabId) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "switch_tab");
        let page = bounded(ctx, async {
            let page = self.find_tab(tab).await?;
            page.bring_to_front().await?;
            Ok::<_, AdapterError>(page)
        })
        .await?;
        *self.active.write().await = page.clone();
        Ok(self.finish(&page, report, started, None, true).await)
    }

    async fn open_tab(&self, ctx: &ExecCtx, url: &str) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "open_tab");
        let page = bounded(ctx, async { Ok::<_, AdapterError>(self.browser.new_page(url).await?) })
            .await
            .map_err(|err| nav_timeout(err, url))?;
        *self.active.write().await = page.clone();
        Ok(self.finish(&page, report, started, None, true).await)
    }

    async fn close_tab(&self, ctx: &ExecCtx, tab: &TabId) -> Result<ActionReport, ActionError> {
        let (report, started) = ActionReport::begin(ctx, "close_tab");
        let closing_active = self.active_tab().await == *tab;
        let next = bounded(ctx, async {
            let page = self.find_tab(tab).await?;
            let remaining: Vec<Page> = self
                .browser
                .pages()
                .await?
                .into_iter()
                .filter(|p| p.target_id().inner() != tab.as_str())
                .collect();
            let Some(fallback) = remaining.into_iter().next() else {
                return Err(AdapterError::new(AdapterErrorKind::NotInteractable)
                    .with_hint("refusing to close the last tab"));
            };
            page.close().await?;
            if closing_active {
                fallback.bring_to_front().await?;
            }
            Ok::<_, AdapterError>(fallback)
        })
        .await?;
        if closing_active {
            *self.active.write().await = next;
        }
        let page = self.page().await;
        Ok(self.finish(&page, report, started, None, closing_active).await)
    }

    async fn extract_text(&self, ctx: &ExecCtx) -> Result<String, ActionError> {
        let page = self.page().await;
        bounded(
            ctx,
            evaluate::<String>(
                &page,
                "document.body ? document.body.innerText : ''".to_string(),
            ),
        )
        .await
    }

    async fn tabs(&self) -> Result<Vec<TabInfo>, ActionError> {
        Ok(self.tab_infos().await?)
    }
}
