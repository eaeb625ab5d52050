//! Bundled engine: a Chromium session driven over CDP by an LLM.
//!
//! Every step snapshots the page, asks the model for one action and carries
//! it out, until the model answers `done` or the step budget runs out.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use serde_json::Value;

use super::actions::{
    self, ActionReply, BrowserAction, PageElement, PageSnapshot, StepRecord, truncate,
};
use super::{AgentOutcome, Engine, EngineConfig, EngineError, EngineFactory, EngineLogger, LogSink};
use crate::llm::{ChatClient, ChatMessage};

/// Launches a fresh browser for every task.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserEngineFactory;

#[async_trait]
impl EngineFactory for BrowserEngineFactory {
    async fn create(
        &self,
        config: &EngineConfig,
        sink: LogSink,
    ) -> Result<Box<dyn Engine>, EngineError> {
        let base = sink.logger("browser_use_base");
        let browser_log = sink.logger("browser");

        // Fail before launching Chromium when there's no key to talk to the model.
        let client = ChatClient::new(config)?;
        base.info(format!("Using model {}", client.model()));

        let mut builder = BrowserConfig::builder().viewport(None);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.browser_executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| EngineError::new("BrowserConfigError", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| EngineError::new("BrowserLaunchError", e.to_string()))?;

        // CDP events must be polled or the browser stalls.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(EngineError::new("BrowserLaunchError", e.to_string()));
            }
        };
        browser_log.info(if config.headless {
            "Launched headless browser"
        } else {
            "Launched browser window"
        });

        Ok(Box::new(BrowserEngine {
            browser,
            page,
            handler_task: Some(handler_task),
            client,
            agent: sink.logger("agent"),
            controller: sink.logger("controller"),
            browser_log,
            max_steps: config.max_steps.max(1),
        }))
    }
}

pub struct BrowserEngine {
    browser: Browser,
    page: Page,
    handler_task: Option<tokio::task::JoinHandle<()>>,
    client: ChatClient,
    agent: EngineLogger,
    controller: EngineLogger,
    browser_log: EngineLogger,
    max_steps: u32,
}

#[async_trait]
impl Engine for BrowserEngine {
    async fn run(&mut self, command: &str) -> Result<AgentOutcome, EngineError> {
        self.agent.info(format!("🚀 Starting task: {command}"));

        let mut history: Vec<StepRecord> = Vec::new();
        let mut conversation = vec![ChatMessage::system(actions::system_prompt())];

        for step in 1..=self.max_steps {
            self.agent.info(format!("📍 Step {step}"));

            let snapshot = self.snapshot().await?;
            conversation.push(ChatMessage::user(actions::step_prompt(
                command, &snapshot, &history,
            )));

            let reply_text = self.client.complete(&conversation).await?;
            let ActionReply { reasoning, action } = match actions::parse_action_reply(&reply_text)
            {
                Ok(reply) => reply,
                Err(e) => {
                    // One malformed reply is recoverable; tell the model and move on.
                    self.agent.warn(format!("❌ {}", e.message));
                    conversation.push(ChatMessage::assistant(reply_text));
                    history.push(StepRecord {
                        step,
                        action: "invalid reply".to_string(),
                        outcome: e.message,
                    });
                    continue;
                }
            };
            conversation.push(ChatMessage::assistant(reply_text));

            if let Some(reasoning) = reasoning.filter(|r| !r.trim().is_empty()) {
                self.agent.info(format!("🧠 {}", truncate(&reasoning, 200)));
            }

            if let BrowserAction::Done { result } = action {
                self.agent.info("✅ Task completed");
                self.agent.info(format!("📄 Result: {}", truncate(&result, 500)));
                return Ok(AgentOutcome::with_result(result));
            }

            self.agent.info(format!("🛠️  Action: {}", action.describe()));
            let outcome = match self.act(&action).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.controller.error(format!("Action failed: {e}"));
                    format!("error: {e}")
                }
            };
            history.push(StepRecord {
                step,
                action: action.describe(),
                outcome,
            });
        }

        self.agent.warn(format!(
            "❌ Stopped after {} steps without finishing",
            self.max_steps
        ));
        Ok(AgentOutcome::default())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::new("BrowserCloseError", e.to_string()));
        if closed.is_ok() {
            if let Err(e) = self.browser.wait().await {
                tracing::debug!(error = %e, "Waiting for browser process failed");
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        closed
    }
}

impl BrowserEngine {
    async fn snapshot(&self) -> Result<PageSnapshot, EngineError> {
        let title = self
            .eval_string("document.title")
            .await
            .unwrap_or_default();
        let url = self
            .eval_string("window.location.href")
            .await
            .unwrap_or_default();

        let elements = match self.eval_value(&actions::snapshot_script()).await {
            Ok(value) => serde_json::from_value::<Vec<PageElement>>(value).unwrap_or_default(),
            Err(e) => {
                self.browser_log.warn(format!("Could not list page elements: {e}"));
                Vec::new()
            }
        };

        Ok(PageSnapshot {
            title,
            url,
            elements,
        })
    }

    /// Carry out one action; the returned string is fed back to the model.
    async fn act(&self, action: &BrowserAction) -> Result<String, EngineError> {
        match action {
            BrowserAction::Navigate { url } => {
                let url = actions::normalize_url(url)?;
                self.page
                    .goto(url.as_str())
                    .await
                    .map_err(|e| browser_error("NavigationError", e))?;
                self.controller.info(format!("🔗 Navigated to {url}"));
                Ok(format!("now at {url}"))
            }
            BrowserAction::Click { selector } => {
                let css = actions::resolve_selector(selector);
                let element = self
                    .page
                    .find_element(css.as_str())
                    .await
                    .map_err(|e| browser_error("ElementNotFoundError", e))?;
                element
                    .click()
                    .await
                    .map_err(|e| browser_error("ClickError", e))?;
                self.controller.info(format!("🖱️  Clicked {selector}"));
                Ok("clicked".to_string())
            }
            BrowserAction::Type { selector, text } => {
                let css = actions::resolve_selector(selector);
                let element = self
                    .page
                    .find_element(css.as_str())
                    .await
                    .map_err(|e| browser_error("ElementNotFoundError", e))?;
                element
                    .click()
                    .await
                    .map_err(|e| browser_error("ClickError", e))?;
                element
                    .type_str(text)
                    .await
                    .map_err(|e| browser_error("InputError", e))?;
                self.controller
                    .info(format!("⌨️  Typed {:?} into {selector}", truncate(text, 40)));
                Ok(format!("typed {} characters", text.chars().count()))
            }
            BrowserAction::Press { key } => {
                for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
                    let mut params = DispatchKeyEventParams::builder()
                        .key(key.clone())
                        .r#type(kind);
                    if key == "Enter" {
                        params = params.text("\r");
                    }
                    let params = params
                        .build()
                        .map_err(|e| EngineError::new("InputError", e))?;
                    self.page
                        .execute(params)
                        .await
                        .map_err(|e| browser_error("InputError", e))?;
                }
                self.controller.info(format!("⌨️  Pressed {key}"));
                Ok(format!("pressed {key}"))
            }
            BrowserAction::Extract { selector } => {
                let text = self
                    .eval_string(&actions::extract_script(selector.as_deref()))
                    .await?;
                self.controller.info(format!(
                    "📄 Extracted {} characters",
                    text.chars().count()
                ));
                Ok(truncate(text.trim(), 2_000))
            }
            BrowserAction::Done { result } => Ok(result.clone()),
        }
    }

    async fn eval_value(&self, script: &str) -> Result<Value, EngineError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| browser_error("EvaluationError", e))?
            .into_value()
            .map_err(|e| browser_error("EvaluationError", e))
    }

    async fn eval_string(&self, script: &str) -> Result<String, EngineError> {
        Ok(match self.eval_value(script).await? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

fn browser_error(kind: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::new(kind, err.to_string())
}
