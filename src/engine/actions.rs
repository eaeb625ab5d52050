//! Step protocol between the agent loop and the model.
//!
//! Each step the model sees the task, a snapshot of the current page and the
//! history of earlier steps, and answers with exactly one JSON action.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EngineError;

/// Interactive elements listed per snapshot.
pub const MAX_SNAPSHOT_ELEMENTS: usize = 50;

/// Attribute stamped onto interactive elements so `e<N>` refs resolve.
pub const REF_ATTRIBUTE: &str = "data-bp-ref";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserAction {
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
    },
    Press {
        key: String,
    },
    /// Read the visible text of `selector` (or the whole body).
    Extract {
        #[serde(default)]
        selector: Option<String>,
    },
    Done {
        result: String,
    },
}

impl BrowserAction {
    /// One-line human description for the log pane.
    pub fn describe(&self) -> String {
        match self {
            Self::Navigate { url } => format!("navigate → {url}"),
            Self::Click { selector } => format!("click {selector}"),
            Self::Type { selector, text } => {
                format!("type {:?} into {selector}", truncate(text, 40))
            }
            Self::Press { key } => format!("press {key}"),
            Self::Extract { selector } => {
                format!("extract text from {}", selector.as_deref().unwrap_or("page"))
            }
            Self::Done { .. } => "done".to_string(),
        }
    }
}

/// Parsed model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReply {
    pub reasoning: Option<String>,
    pub action: BrowserAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageElement {
    #[serde(rename = "ref")]
    pub reference: String,
    pub tag: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    pub elements: Vec<PageElement>,
}

/// What happened in an earlier step, fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: u32,
    pub action: String,
    pub outcome: String,
}

pub fn system_prompt() -> &'static str {
    r#"You control a web browser to complete the user's task. ONE action per reply.

Reply with a single JSON object and nothing else:
{"reasoning": "<short>", "action": "<name>", ...params}

Actions:
| action   | params                                   |
|----------|------------------------------------------|
| navigate | url: absolute URL                        |
| click    | selector: element ref (e.g. "e3") or CSS |
| type     | selector, text                           |
| press    | key: e.g. "Enter"                        |
| extract  | selector (optional; whole page if empty) |
| done     | result: final answer for the user        |

Use "done" as soon as the task is complete. Put the information the user
asked for into "result"."#
}

/// User message for one step.
pub fn step_prompt(task: &str, snapshot: &PageSnapshot, history: &[StepRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TASK: {task}");
    let _ = writeln!(out);
    let _ = writeln!(out, "CURRENT PAGE");
    let _ = writeln!(out, "url: {}", snapshot.url);
    let _ = writeln!(out, "title: {}", snapshot.title);

    if snapshot.elements.is_empty() {
        let _ = writeln!(out, "interactive elements: none");
    } else {
        let _ = writeln!(out, "interactive elements:");
        for el in &snapshot.elements {
            let _ = writeln!(out, "  {} <{}> {}", el.reference, el.tag, truncate(&el.name, 60));
        }
    }

    if !history.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "PREVIOUS STEPS");
        for h in history {
            let _ = writeln!(
                out,
                "  {}. {} -> {}",
                h.step,
                h.action,
                truncate(&h.outcome, 300)
            );
        }
    }

    out
}

/// Parse the model's reply into an action.
///
/// Accepts a ```json fence, a bare fence, or the first balanced `{…}`.
pub fn parse_action_reply(text: &str) -> Result<ActionReply, EngineError> {
    let candidates = [fenced(text, "```json"), fenced(text, "```"), first_object(text)];

    let mut last_err = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                let reasoning = value
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match serde_json::from_value::<BrowserAction>(value) {
                    Ok(action) => return Ok(ActionReply { reasoning, action }),
                    Err(e) => last_err = Some(e.to_string()),
                }
            }
            Err(e) => last_err = Some(e.to_string()),
        }
    }

    Err(EngineError::new(
        "ActionParseError",
        format!(
            "could not read an action from the model reply ({}): {}",
            last_err.unwrap_or_else(|| "no JSON object found".to_string()),
            truncate(text, 200)
        ),
    ))
}

fn fenced<'a>(text: &'a str, open: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find("```")?;
    Some(text[start..start + end].trim())
}

/// First balanced `{…}` in `text`, ignoring braces inside string literals.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Turn an `e<N>` element ref into a CSS selector; pass anything else through.
pub fn resolve_selector(selector: &str) -> String {
    let s = selector.trim();
    let is_ref = s.len() > 1
        && s.starts_with('e')
        && s[1..].chars().all(|c| c.is_ascii_digit());
    if is_ref {
        format!("[{REF_ATTRIBUTE}=\"{s}\"]")
    } else {
        s.to_string()
    }
}

/// Prefix bare hostnames with `https://`.
pub fn normalize_url(raw: &str) -> Result<String, EngineError> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") || raw.starts_with("about:") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    url::Url::parse(&candidate)
        .map(|u| u.to_string())
        .map_err(|e| EngineError::new("InvalidUrlError", format!("{raw}: {e}")))
}

/// Char-safe truncation with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// Script that stamps refs onto interactive elements and returns the snapshot.
pub fn snapshot_script() -> String {
    format!(
        r#"(() => {{
  const nodes = Array.from(document.querySelectorAll('a, button, input, select, textarea, [role="button"], [role="link"]'))
    .slice(0, {MAX_SNAPSHOT_ELEMENTS});
  return nodes.map((el, i) => {{
    const ref = 'e' + i;
    el.setAttribute('{REF_ATTRIBUTE}', ref);
    return {{
      ref,
      tag: el.tagName.toLowerCase(),
      name: (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('placeholder') || '').trim().slice(0, 80)
    }};
  }});
}})()"#
    )
}

/// Script returning the visible text of `selector`, or of the body.
pub fn extract_script(selector: Option<&str>) -> String {
    match selector {
        Some(sel) => {
            let css = serde_json::to_string(&resolve_selector(sel)).unwrap_or_else(|_| "\"body\"".into());
            format!(
                "(() => {{ const el = document.querySelector({css}); return el ? el.innerText : ''; }})()"
            )
        }
        None => "document.body ? document.body.innerText : ''".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let reply = parse_action_reply(
            r#"{"reasoning": "open the site", "action": "navigate", "url": "https://example.com"}"#,
        )
        .unwrap();
        assert_eq!(reply.reasoning.as_deref(), Some("open the site"));
        assert_eq!(
            reply.action,
            BrowserAction::Navigate {
                url: "https://example.com".into()
            }
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Sure.\n```json\n{\"action\": \"done\", \"result\": \"Example Domain\"}\n```\n";
        let reply = parse_action_reply(text).unwrap();
        assert_eq!(
            reply.action,
            BrowserAction::Done {
                result: "Example Domain".into()
            }
        );
    }

    #[test]
    fn test_parse_embedded_object_with_braces_in_strings() {
        let text = r#"I will type now: {"action": "type", "selector": "e2", "text": "a {weird} value"} ok"#;
        let reply = parse_action_reply(text).unwrap();
        assert_eq!(
            reply.action,
            BrowserAction::Type {
                selector: "e2".into(),
                text: "a {weird} value".into()
            }
        );
    }

    #[test]
    fn test_parse_extract_without_selector() {
        let reply = parse_action_reply(r#"{"action":"extract"}"#).unwrap();
        assert_eq!(reply.action, BrowserAction::Extract { selector: None });
    }

    #[test]
    fn test_parse_rejects_unknown_action() {
        let err = parse_action_reply(r#"{"action": "teleport"}"#).unwrap_err();
        assert_eq!(err.kind, "ActionParseError");
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_action_reply("I cannot help with that.").unwrap_err();
        assert!(err.message.contains("no JSON object found"));
    }

    #[test]
    fn test_resolve_selector() {
        assert_eq!(resolve_selector("e12"), "[data-bp-ref=\"e12\"]");
        assert_eq!(resolve_selector("#search"), "#search");
        assert_eq!(resolve_selector("em"), "em");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com/");
        assert_eq!(
            normalize_url("http://localhost:8080/a").unwrap(),
            "http://localhost:8080/a"
        );
        assert!(normalize_url("https://").is_err());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_step_prompt_lists_elements_and_history() {
        let snapshot = PageSnapshot {
            title: "Example Domain".into(),
            url: "https://example.com/".into(),
            elements: vec![PageElement {
                reference: "e0".into(),
                tag: "a".into(),
                name: "More information...".into(),
            }],
        };
        let history = vec![StepRecord {
            step: 1,
            action: "navigate → https://example.com".into(),
            outcome: "ok".into(),
        }];
        let prompt = step_prompt("report the title", &snapshot, &history);
        assert!(prompt.contains("TASK: report the title"));
        assert!(prompt.contains("title: Example Domain"));
        assert!(prompt.contains("e0 <a> More information..."));
        assert!(prompt.contains("1. navigate → https://example.com -> ok"));
    }

    #[test]
    fn test_describe_actions() {
        let click = BrowserAction::Click {
            selector: "e4".into(),
        };
        assert_eq!(click.describe(), "click e4");
        let extract = BrowserAction::Extract { selector: None };
        assert_eq!(extract.describe(), "extract text from page");
    }
}
