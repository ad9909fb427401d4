//! Chrome DevTools Protocol backend.
//!
//! Elements are resolved by a small script injected into the page: every
//! resolved element is stored in a per-document registry and addressed by id
//! afterwards. A scope that is an `<iframe>` searches the frame's document,
//! which is how the profile panel is reached.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::UiDriver;
use crate::config::BrowserOptions;
use crate::element::{ElementHandle, WaitState};
use crate::errors::AutomationError;
use crate::selector::Selector;
use crate::signal::{SignalHub, SignalKind, SignalSubscription, UiSignal};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolver installed on first use in every document the driver touches.
const RUNTIME_JS: &str = r#"
(() => {
  if (window.__autocounsel) return window.__autocounsel;
  const R = { seq: 0, els: new Map() };

  const implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || 'text').toLowerCase();
    if (tag === 'input') {
      if (type === 'checkbox') return 'checkbox';
      if (type === 'radio') return 'radio';
      if (type === 'button' || type === 'submit') return 'button';
      return 'textbox';
    }
    if (tag === 'textarea') return 'textbox';
    if (tag === 'select') return 'combobox';
    if (tag === 'button') return 'button';
    if (tag === 'li') return 'listitem';
    if (tag === 'ul' || tag === 'ol') return 'list';
    if (tag === 'a' && el.hasAttribute('href')) return 'link';
    return null;
  };
  const roleOf = (el) => el.getAttribute('role') || implicitRole(el);
  const textOf = (el) => (el.innerText || el.textContent || '').trim();
  const nameOf = (el) => {
    const parts = [el.getAttribute('aria-label'), el.getAttribute('placeholder'), el.getAttribute('title')];
    if (el.labels) for (const l of el.labels) parts.push(textOf(l));
    parts.push(textOf(el));
    return parts.filter(Boolean).join(' ');
  };
  const visible = (el) => {
    const view = el.ownerDocument.defaultView;
    const style = view ? view.getComputedStyle(el) : null;
    const rect = el.getBoundingClientRect();
    return !!style && style.visibility !== 'hidden' && style.display !== 'none'
      && rect.width > 0 && rect.height > 0;
  };
  const descendants = (root) => Array.from(root.querySelectorAll('*'));
  const textMatches = (el, text, exact) => {
    const t = textOf(el);
    return exact ? t === text : t.includes(text);
  };

  const search = (sel, root) => {
    const v = sel.value;
    switch (sel.kind) {
      case 'role':
        return descendants(root).filter((el) => roleOf(el) === v.role
          && (v.name == null || nameOf(el).includes(v.name)));
      case 'id':
        return Array.from(root.querySelectorAll('#' + CSS.escape(v)));
      case 'name':
        return Array.from(root.querySelectorAll('[name="' + CSS.escape(v) + '"]'));
      case 'css':
        return Array.from(root.querySelectorAll(v));
      case 'text': {
        const hits = descendants(root).filter((el) => textMatches(el, v.text, v.exact));
        return hits.filter((el) => !hits.some((o) => o !== el && el.contains(o)));
      }
      case 'attributes':
        return descendants(root).filter((el) =>
          Object.entries(v).every(([k, val]) => el.getAttribute(k) === val));
      case 'has':
        return descendants(root).filter((el) => search(v, el).length > 0);
      case 'visible':
        return descendants(root).filter((el) => visible(el) === v);
      case 'nth': {
        const all = descendants(root);
        const i = v < 0 ? all.length + v : v;
        return all[i] ? [all[i]] : [];
      }
      case 'chain': {
        let current = [root];
        for (const part of v) {
          if (part.kind === 'has') current = current.filter((el) => search(part.value, el).length > 0);
          else if (part.kind === 'visible') current = current.filter((el) => visible(el) === part.value);
          else if (part.kind === 'nth') {
            const i = part.value < 0 ? current.length + part.value : part.value;
            current = current[i] ? [current[i]] : [];
          } else current = current.flatMap((el) => search(part, el));
        }
        return Array.from(new Set(current));
      }
      default:
        throw new Error('unsupported selector kind ' + sel.kind);
    }
  };

  R.root = (scopeId) => {
    if (!scopeId) return document;
    const el = R.els.get(scopeId);
    if (!el || !el.isConnected) return null;
    if (el.tagName === 'IFRAME') return el.contentDocument;
    return el;
  };
  R.get = (id) => {
    const el = R.els.get(id);
    return el && el.isConnected ? el : null;
  };
  R.first = (sel, scopeId) => {
    const root = R.root(scopeId);
    if (!root) return { detached: true };
    const found = search(sel, root)[0];
    return found ? { element: found } : {};
  };
  R.register = (el) => {
    const id = 'ac' + (++R.seq);
    R.els.set(id, el);
    return id;
  };
  R.visible = visible;
  window.__autocounsel = R;
  return R;
})()
"#;

/// How the browser is started. Built from [`BrowserOptions`].
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    pub extra_args: Vec<String>,
}

impl From<&BrowserOptions> for BrowserSettings {
    fn from(options: &BrowserOptions) -> Self {
        Self {
            headless: options.headless,
            executable: options.executable.clone(),
            window_width: options.window_width,
            window_height: options.window_height,
            user_agent: options.user_agent.clone(),
            extra_args: options.extra_args.clone(),
        }
    }
}

impl BrowserSettings {
    fn to_config(&self) -> Result<BrowserConfig, AutomationError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.window_width, self.window_height)
            .args(self.extra_args.clone());
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(AutomationError::PlatformError)
    }
}

/// Chrome's replies once the page or its session no longer exists.
const TARGET_GONE_MESSAGES: [&str; 4] = [
    "target closed",
    "session with given id not found",
    "no target with given id",
    "inspected target navigated or closed",
];

fn target_gone(message: &str) -> bool {
    let message = message.to_lowercase();
    TARGET_GONE_MESSAGES.iter().any(|m| message.contains(m))
}

fn map_cdp(error: CdpError) -> AutomationError {
    match error {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            AutomationError::SessionLost(error.to_string())
        }
        CdpError::Chrome(_) | CdpError::ChromeMessage(_) if target_gone(&error.to_string()) => {
            AutomationError::SessionLost(error.to_string())
        }
        CdpError::Timeout => AutomationError::Timeout(error.to_string()),
        CdpError::NotFound => AutomationError::ElementNotFound(error.to_string()),
        other => AutomationError::PlatformError(other.to_string()),
    }
}

/// Key name -> (code, text, virtual key code)
fn key_definition(key: &str) -> (&str, Option<&'static str>, Option<i64>) {
    match key {
        "Enter" => ("Enter", Some("\r"), Some(13)),
        "Tab" => ("Tab", Some("\t"), Some(9)),
        "Escape" => ("Escape", None, Some(27)),
        "Backspace" => ("Backspace", None, Some(8)),
        "Space" => ("Space", Some(" "), Some(32)),
        _ => (key, None, None),
    }
}

pub struct CdpDriver {
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Page,
    signals: SignalHub,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl CdpDriver {
    /// Start a browser with one page and begin listening for dialogs.
    #[instrument(skip(settings), fields(headless = settings.headless))]
    pub async fn launch(settings: BrowserSettings) -> Result<Self, AutomationError> {
        let config = settings.to_config()?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            AutomationError::PlatformError(format!("Failed to launch browser: {e}"))
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(map_cdp)?;
        if let Some(user_agent) = &settings.user_agent {
            page.set_user_agent(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(map_cdp)?;
        }

        let signals = SignalHub::new();
        let dialog_task = Self::listen_for_dialogs(&page, signals.clone()).await?;
        info!("Browser session started");

        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            signals,
            tasks: std::sync::Mutex::new(vec![handler_task, dialog_task]),
            closed: AtomicBool::new(false),
        })
    }

    /// Dialogs are accepted while someone is subscribed to them and dismissed
    /// otherwise; either way they are published.
    async fn listen_for_dialogs(
        page: &Page,
        signals: SignalHub,
    ) -> Result<JoinHandle<()>, AutomationError> {
        let mut dialogs = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(map_cdp)?;
        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = dialogs.next().await {
                let accept = signals.has_subscribers(SignalKind::Dialog);
                debug!(message = %event.message, accept, "dialog opened");
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(accept)).await {
                    warn!(error = %e, "Failed to answer dialog");
                }
                signals.publish(UiSignal::dialog(event.message.clone(), accept));
            }
        }))
    }

    fn ensure_open(&self) -> Result<(), AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AutomationError::SessionLost(
                "browser session was closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Evaluate `body` with `R` bound to the resolver. The body returns either
    /// `{ ok: value }` or `{ error: 'detached' | 'not_found' | message }`.
    async fn run(&self, body: String) -> Result<Value, AutomationError> {
        self.ensure_open()?;
        let script = format!("(() => {{ const R = {RUNTIME_JS}; {body} }})()");
        let result = self.page.evaluate(script).await.map_err(map_cdp)?;
        let value = result.value().cloned().unwrap_or(Value::Null);
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(match error {
                "detached" => AutomationError::ElementDetached(error.to_string()),
                "not_found" => AutomationError::ElementNotFound(error.to_string()),
                other => AutomationError::PlatformError(other.to_string()),
            });
        }
        Ok(value.get("ok").cloned().unwrap_or(Value::Null))
    }

    fn selector_json(selector: &Selector) -> Result<String, AutomationError> {
        selector
            .validate()
            .map_err(AutomationError::InvalidSelector)?;
        serde_json::to_string(selector).map_err(|e| AutomationError::Internal(e.to_string()))
    }

    fn scope_json(scope: Option<&ElementHandle>) -> String {
        match scope {
            Some(handle) => Value::String(handle.id().to_string()).to_string(),
            None => "null".to_string(),
        }
    }

    /// Runs `body` with `el` bound to the handle's element.
    async fn with_element(
        &self,
        element: &ElementHandle,
        body: &str,
    ) -> Result<Value, AutomationError> {
        let id = Value::String(element.id().to_string());
        self.run(format!(
            "const el = R.get({id}); if (!el) return {{ error: 'detached' }}; {body}"
        ))
        .await
    }

    async fn probe(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> Result<Value, AutomationError> {
        let sel = Self::selector_json(selector)?;
        let scope = Self::scope_json(scope);
        self.run(format!(
            "const r = R.first({sel}, {scope}); \
             if (r.detached) return {{ ok: {{ detached: true }} }}; \
             if (!r.element) return {{ ok: {{ attached: false }} }}; \
             return {{ ok: {{ attached: true, visible: R.visible(r.element) }} }};"
        ))
        .await
    }

    async fn dispatch_key(
        &self,
        kind: DispatchKeyEventType,
        key: &str,
        text: Option<&str>,
    ) -> Result<(), AutomationError> {
        let (code, _, virtual_key) = key_definition(key);
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key(key.to_string())
            .code(code.to_string());
        if let Some(text) = text {
            builder = builder.text(text.to_string());
        }
        if let Some(vk) = virtual_key {
            builder = builder
                .windows_virtual_key_code(vk)
                .native_virtual_key_code(vk);
        }
        let params = builder.build().map_err(AutomationError::Internal)?;
        self.page.execute(params).await.map_err(map_cdp)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UiDriver for CdpDriver {
    #[instrument(skip(self))]
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.ensure_open()?;
        self.page.goto(url).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn locate(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
        timeout: Duration,
    ) -> Result<ElementHandle, AutomationError> {
        let sel = Self::selector_json(selector)?;
        let scope_id = Self::scope_json(scope);
        let deadline = Instant::now() + timeout;
        loop {
            let found = self
                .run(format!(
                    "const r = R.first({sel}, {scope_id}); \
                     if (r.detached) return {{ error: 'detached' }}; \
                     return {{ ok: r.element ? R.register(r.element) : null }};"
                ))
                .await?;
            if let Some(id) = found.as_str() {
                return Ok(ElementHandle::new(id, selector.clone()));
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::ElementNotFound(selector.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), AutomationError> {
        let text = Value::String(text.to_string());
        self.with_element(
            element,
            &format!(
                "el.focus(); el.value = {text}; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return {{ ok: true }};"
            ),
        )
        .await?;
        Ok(())
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        label: &str,
    ) -> Result<(), AutomationError> {
        let label_json = Value::String(label.to_string());
        let selected = self
            .with_element(
                element,
                &format!(
                    "const opt = Array.from(el.options || []) \
                       .find((o) => (o.label || o.textContent).trim() === {label_json}); \
                     if (!opt) return {{ ok: false }}; \
                     el.value = opt.value; \
                     el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                     el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                     return {{ ok: true }};"
                ),
            )
            .await?;
        if selected.as_bool() != Some(true) {
            return Err(AutomationError::InvalidArgument(format!(
                "no option labelled '{label}' in {}",
                element.selector()
            )));
        }
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), AutomationError> {
        self.with_element(
            element,
            "el.scrollIntoView({ block: 'center' }); el.click(); return { ok: true };",
        )
        .await?;
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let deadline = Instant::now() + timeout;
        loop {
            let probe = self.probe(selector, scope).await?;
            let detached = probe.get("detached").and_then(Value::as_bool) == Some(true);
            let attached = probe.get("attached").and_then(Value::as_bool) == Some(true);
            let visible = attached && probe.get("visible").and_then(Value::as_bool) == Some(true);
            let reached = match state {
                WaitState::Attached => attached,
                WaitState::Visible => visible,
                // a vanished scope takes its contents with it
                WaitState::Detached => detached || !attached,
                WaitState::Hidden => detached || !visible,
            };
            if reached {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "{selector} did not become {state} within {timeout:?}"
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_visible(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> Result<bool, AutomationError> {
        let probe = self.probe(selector, scope).await?;
        Ok(probe.get("visible").and_then(Value::as_bool) == Some(true))
    }

    async fn page_text(&self) -> Result<String, AutomationError> {
        let text = self
            .run("return { ok: document.body ? document.body.innerText : '' };".to_string())
            .await?;
        Ok(text.as_str().unwrap_or_default().to_string())
    }

    async fn snapshot(&self, path: &Path) -> Result<(), AutomationError> {
        self.ensure_open()?;
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(map_cdp)?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), AutomationError> {
        self.ensure_open()?;
        let (_, text, _) = key_definition(key);
        self.dispatch_key(DispatchKeyEventType::KeyDown, key, None)
            .await?;
        if let Some(text) = text {
            self.dispatch_key(DispatchKeyEventType::Char, key, Some(text))
                .await?;
        }
        self.dispatch_key(DispatchKeyEventType::KeyUp, key, None)
            .await
    }

    fn subscribe(&self, kind: SignalKind) -> SignalSubscription {
        self.signals.subscribe(kind)
    }

    async fn close(&self) -> Result<(), AutomationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Browser did not close cleanly");
            }
            if let Err(e) = browser.wait().await {
                debug!(error = %e, "Waiting for browser exit failed");
            }
        }
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for task in tasks {
            task.abort();
        }
        info!("Browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_options() {
        let options = BrowserOptions {
            headless: true,
            window_width: 800,
            ..BrowserOptions::default()
        };
        let settings = BrowserSettings::from(&options);
        assert!(settings.headless);
        assert_eq!(settings.window_width, 800);
        assert_eq!(settings.extra_args, options.extra_args);
    }

    #[test]
    fn test_transport_errors_are_session_fatal() {
        assert!(map_cdp(CdpError::NoResponse).is_session_fatal());
        assert!(map_cdp(CdpError::Timeout).is_timeout());
    }

    #[test]
    fn test_closed_tab_is_session_fatal() {
        let closed = map_cdp(CdpError::ChromeMessage("Target closed".to_string()));
        assert!(closed.is_session_fatal(), "{closed:?}");

        assert!(target_gone("Session with given id not found."));
        assert!(target_gone("No target with given id found"));
        assert!(!target_gone("Cannot find context with specified id"));

        let other = map_cdp(CdpError::ChromeMessage("Cannot navigate to invalid URL".to_string()));
        assert!(matches!(other, AutomationError::PlatformError(_)));
    }

    #[test]
    fn test_selector_json_rejects_invalid_selectors() {
        let err = CdpDriver::selector_json(&Selector::from("bogus")).unwrap_err();
        assert!(matches!(err, AutomationError::InvalidSelector(_)));
        let json = CdpDriver::selector_json(&Selector::from("#Pdate")).unwrap();
        assert_eq!(json, r#"{"kind":"id","value":"Pdate"}"#);
    }
}
