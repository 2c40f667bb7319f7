/*
 * Meeting Orchestrator
 * Copyright (c) 2024 Meeting Orchestrator Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;

/// Abstracted DOM access, per the Design Notes §9 "reflective DOM scraping"
/// strategy: C3/C7/C8/C9 talk only to this trait, never to `chromiumoxide`
/// directly, so tests substitute `FakePage`.
#[async_trait]
pub trait PageSurface: Send + Sync {
    async fn url(&self) -> String;
    async fn content(&self) -> Result<String>;
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<bool>;
    /// Scans elements matching `selectors` in order, clicking the first one
    /// whose visible text or aria-label contains `text_fragment` (case
    /// insensitive) and does not also contain `exclude_fragment` — used for
    /// the permission dialog's "allow" scan in `spec.md` §4.4 step 4 and the
    /// generic join-button scan in step 6, which must skip chrome like
    /// "Leave and join another call".
    async fn click_matching_text(
        &self,
        selectors: &[&str],
        text_fragment: &str,
        exclude_fragment: Option<&str>,
    ) -> Result<bool>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    async fn inner_text(&self, selector: &str) -> Result<Option<String>>;
    async fn get_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>>;
    /// Returns the JSON array of raw roster-row candidates for the DOM-scrape
    /// tier of C3 (`spec.md` §4.5 step C): each element carries `text`,
    /// `self_attr`, `aria_label`, and `classes`.
    async fn evaluate_script(&self, script: &str) -> Result<Value>;
    async fn wait(&self, duration: Duration);
    /// Best-effort full-page screenshot, returns the artifact-relative path.
    async fn screenshot(&self, reason: &str) -> Option<String>;
}

/// Real backend: one `chromiumoxide` page per session, automation
/// fingerprints suppressed at creation time per `spec.md` §4.3.
pub struct ChromiumPage {
    page: chromiumoxide::Page,
    data_dir: PathBuf,
    session_id: String,
}

impl ChromiumPage {
    pub fn new(page: chromiumoxide::Page, data_dir: PathBuf, session_id: String) -> Self {
        Self {
            page,
            data_dir,
            session_id,
        }
    }
}

#[async_trait]
impl PageSurface for ChromiumPage {
    async fn url(&self) -> String {
        self.page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("failed to read page content")
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        self.page
            .wait_for_navigation()
            .await
            .context("network-idle wait failed")?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                element.click().await.context("click failed")?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn click_matching_text(
        &self,
        selectors: &[&str],
        text_fragment: &str,
        exclude_fragment: Option<&str>,
    ) -> Result<bool> {
        let needle = text_fragment.to_lowercase();
        let exclude = exclude_fragment.map(|s| s.to_lowercase());
        for selector in selectors {
            if let Ok(elements) = self.page.find_elements(*selector).await {
                for element in elements {
                    let text = element
                        .inner_text()
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_default()
                        .to_lowercase();
                    let aria = element
                        .attribute("aria-label")
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_default()
                        .to_lowercase();
                    if let Some(exclude) = &exclude {
                        if text.contains(exclude) || aria.contains(exclude) {
                            continue;
                        }
                    }
                    if text.contains(&needle) || aria.contains(&needle) {
                        let _ = element.click().await;
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.inner_text().await.unwrap_or(None)),
            Err(_) => Ok(None),
        }
    }

    async fn get_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.attribute(attribute).await.unwrap_or(None)),
            Err(_) => Ok(None),
        }
    }

    async fn evaluate_script(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("script evaluation failed")?;
        result.into_value().context("script result was not valid JSON")
    }

    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn screenshot(&self, reason: &str) -> Option<String> {
        let filename = format!(
            "end_{}_{}_{}.png",
            self.session_id,
            reason,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.data_dir.join(&filename);
        match self
            .page
            .save_screenshot(
                chromiumoxide::page::ScreenshotParams::builder().full_page(true).build(),
                &path,
            )
            .await
        {
            Ok(_) => Some(filename),
            Err(e) => {
                tracing::warn!(error = %e, "could not capture screenshot");
                None
            }
        }
    }
}

/// In-memory scripted double used by tests: every probe is keyed by selector
/// or script fragment, per the Design Notes §9 instruction.
#[derive(Default)]
pub struct FakePage {
    pub url: RwLock<String>,
    pub content: RwLock<String>,
    pub visible: RwLock<std::collections::HashSet<String>>,
    pub inner_texts: RwLock<HashMap<String, String>>,
    pub attributes: RwLock<HashMap<(String, String), String>>,
    pub eval_responses: RwLock<HashMap<String, Value>>,
    pub clicks: RwLock<Vec<String>>,
}

impl FakePage {
    pub fn new(url: &str, content: &str) -> Self {
        Self {
            url: RwLock::new(url.to_string()),
            content: RwLock::new(content.to_string()),
            ..Default::default()
        }
    }

    pub async fn set_content(&self, content: &str) {
        *self.content.write().await = content.to_string();
    }

    pub async fn set_url(&self, url: &str) {
        *self.url.write().await = url.to_string();
    }

    pub async fn mark_visible(&self, selector: &str) {
        self.visible.write().await.insert(selector.to_string());
    }

    pub async fn set_inner_text(&self, selector: &str, text: &str) {
        self.inner_texts
            .write()
            .await
            .insert(selector.to_string(), text.to_string());
    }

    pub async fn set_attribute(&self, selector: &str, attr: &str, value: &str) {
        self.attributes
            .write()
            .await
            .insert((selector.to_string(), attr.to_string()), value.to_string());
    }

    /// Registers a response for any `evaluate_script` call whose script
    /// contains `key_fragment`.
    pub async fn set_eval_response(&self, key_fragment: &str, value: Value) {
        self.eval_responses
            .write()
            .await
            .insert(key_fragment.to_string(), value);
    }

    pub async fn click_count(&self) -> usize {
        self.clicks.read().await.len()
    }
}

#[async_trait]
impl PageSurface for FakePage {
    async fn url(&self) -> String {
        self.url.read().await.clone()
    }

    async fn content(&self) -> Result<String> {
        Ok(self.content.read().await.clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        *self.url.write().await = url.to_string();
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        self.clicks.write().await.push(selector.to_string());
        Ok(self.visible.read().await.contains(selector))
    }

    async fn click_matching_text(
        &self,
        selectors: &[&str],
        text_fragment: &str,
        exclude_fragment: Option<&str>,
    ) -> Result<bool> {
        let texts = self.inner_texts.read().await;
        let needle = text_fragment.to_lowercase();
        let exclude = exclude_fragment.map(|s| s.to_lowercase());
        for selector in selectors {
            if let Some(text) = texts.get(*selector) {
                let lowered = text.to_lowercase();
                if let Some(exclude) = &exclude {
                    if lowered.contains(exclude) {
                        continue;
                    }
                }
                if lowered.contains(&needle) {
                    self.clicks.write().await.push(selector.to_string());
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.visible.read().await.contains(selector))
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.inner_texts.read().await.get(selector).cloned())
    }

    async fn get_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>> {
        Ok(self
            .attributes
            .read()
            .await
            .get(&(selector.to_string(), attribute.to_string()))
            .cloned())
    }

    async fn evaluate_script(&self, script: &str) -> Result<Value> {
        let responses = self.eval_responses.read().await;
        for (fragment, value) in responses.iter() {
            if script.contains(fragment.as_str()) {
                return Ok(value.clone());
            }
        }
        Ok(Value::Null)
    }

    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn screenshot(&self, reason: &str) -> Option<String> {
        Some(format!("fake_{reason}.png"))
    }
}

/// Acquires the page a Session Runner drives for one session, per
/// `spec.md` §4.3 — abstracted so the Session Runner (C9) is testable
/// against `FakePageProvider` without a real browser.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn acquire(&self, session_id: &str, profile_path: &str) -> Result<Arc<dyn PageSurface>>;
}

/// Hands back a single pre-scripted `FakePage` regardless of session or
/// profile, for Session Runner integration tests.
pub struct FakePageProvider {
    page: Arc<FakePage>,
}

impl FakePageProvider {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl PageProvider for FakePageProvider {
    async fn acquire(&self, _session_id: &str, _profile_path: &str) -> Result<Arc<dyn PageSurface>> {
        Ok(self.page.clone())
    }
}

/// One persistent browser context per profile, created on first use and
/// reused by later non-overlapping sessions against the same profile
/// (`spec.md` §4.3, §5).
pub struct BrowserContextPool {
    config: Arc<Config>,
    contexts: RwLock<HashMap<String, Arc<Browser>>>,
}

impl BrowserContextPool {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    async fn context_for_profile(&self, profile_path: &str) -> Result<Arc<Browser>> {
        if let Some(browser) = self.contexts.read().await.get(profile_path) {
            return Ok(browser.clone());
        }

        let mut contexts = self.contexts.write().await;
        if let Some(browser) = contexts.get(profile_path) {
            return Ok(browser.clone());
        }

        let config = BrowserConfig::builder()
            .user_data_dir(profile_path)
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .request_timeout(Duration::from_secs(30));
        let config = if self.config.headless_browser {
            config.new_headless_mode()
        } else {
            config.with_head()
        }
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser context")?;
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "CDP handler error");
                }
            }
        });

        let browser = Arc::new(browser);
        contexts.insert(profile_path.to_string(), browser.clone());
        Ok(browser)
    }

    /// Scoped page acquisition: the page is closed when the returned
    /// `ChromiumPage` is dropped by its caller's session-runner scope.
    pub async fn page_for_session(
        &self,
        session_id: &str,
        profile_path: &str,
    ) -> Result<ChromiumPage> {
        let browser = self.context_for_profile(profile_path).await?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open a new page")?;
        Ok(ChromiumPage::new(
            page,
            self.config.data_dir.clone(),
            session_id.to_string(),
        ))
    }
}

#[async_trait]
impl PageProvider for BrowserContextPool {
    async fn acquire(&self, session_id: &str, profile_path: &str) -> Result<Arc<dyn PageSurface>> {
        let page = self.page_for_session(session_id, profile_path).await?;
        Ok(Arc::new(page))
    }
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
