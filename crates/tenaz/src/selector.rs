//! Typed selector candidates.
//!
//! A [`Selector`] is one strategy for finding a logical UI element. Fallback
//! chains are built from several of them (see [`crate::Locator`]) instead of
//! joining CSS strings with commas, so the resolver can report which strategy
//! won and which ones came up empty.
//!
//! # Textual syntax
//!
//! Selectors parse from (and display back to) an engine-prefixed syntax:
//!
//! | Expression                         | Meaning                                  |
//! |------------------------------------|------------------------------------------|
//! | `role=button[name="Login"]`        | ARIA role with exact accessible name     |
//! | `role=textbox[name=/email/i]`      | ARIA role with name matching a regex     |
//! | `text=Sign in`                     | case-insensitive text substring          |
//! | `label=Email` / `placeholder=Email`| associated label / placeholder text      |
//! | `testid=login-button`              | `data-testid` attribute                  |
//! | `attr=required`, `attr=id=email`   | attribute presence / exact value         |
//! | `css=input[type=email]`            | CSS selector                             |
//! | `xpath=//button`                   | XPath expression                         |
//!
//! Anything without a known engine prefix is CSS, except expressions starting
//! with `//` which are XPath. A substring that itself starts with `/`, `"` or
//! `\` is written with a leading backslash (`text=\/api/v1`), so every
//! selector displays to an expression that parses back to it.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::css;
use crate::driver::ElementSnapshot;
use crate::result::{TenazError, TenazResult};

/// A compiled regular expression that remembers its source and flags so it
/// can be shipped to the browser as well as evaluated locally.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    ignore_case: bool,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns `InvalidSelector` if the regex does not compile.
    pub fn new(source: impl Into<String>, ignore_case: bool) -> TenazResult<Self> {
        let source = source.into();
        let regex = RegexBuilder::new(&source)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| TenazError::invalid_selector(format!("/{source}/"), e.to_string()))?;
        Ok(Self {
            source,
            ignore_case,
            regex,
        })
    }

    /// Regex source without delimiters
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the `i` flag is set
    #[must_use]
    pub const fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Test a haystack
    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.ignore_case == other.ignore_case
    }
}

impl Eq for Pattern {}

/// How a text-bearing selector compares text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    /// Whitespace-normalized, case-sensitive equality (`"quoted"` syntax)
    Exact(String),
    /// Whitespace-normalized, case-insensitive substring (bare syntax)
    Contains(String),
    /// Regular expression (`/source/flags` syntax)
    Pattern(Pattern),
}

impl TextMatch {
    /// Exact match
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Substring match
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    /// Case-insensitive regex match
    ///
    /// # Errors
    ///
    /// Returns `InvalidSelector` if the regex does not compile.
    pub fn pattern_ci(source: impl Into<String>) -> TenazResult<Self> {
        Ok(Self::Pattern(Pattern::new(source, true)?))
    }

    /// Test text against this matcher
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Exact(expected) => normalize_whitespace(text) == normalize_whitespace(expected),
            Self::Contains(needle) => normalize_whitespace(text)
                .to_lowercase()
                .contains(&normalize_whitespace(needle).to_lowercase()),
            Self::Pattern(pattern) => pattern.is_match(text),
        }
    }

    /// Parse the body of a text-bearing engine (`"exact"`, `/re/i` or bare)
    fn parse(body: &str, input: &str) -> TenazResult<Self> {
        let body = body.trim();
        if body.is_empty() {
            return Err(TenazError::invalid_selector(input, "empty text"));
        }

        if let Some(rest) = body.strip_prefix('\\') {
            if rest.is_empty() {
                return Err(TenazError::invalid_selector(input, "empty text"));
            }
            return Ok(Self::Contains(rest.to_string()));
        }

        if let Some(rest) = body.strip_prefix('/') {
            let Some(end) = rest.rfind('/') else {
                return Err(TenazError::invalid_selector(input, "unterminated regex"));
            };
            let (source, flags) = (&rest[..end], &rest[end + 1..]);
            if source.is_empty() {
                return Err(TenazError::invalid_selector(input, "empty regex"));
            }
            if let Some(bad) = flags.chars().find(|c| *c != 'i') {
                return Err(TenazError::invalid_selector(
                    input,
                    format!("unsupported regex flag `{bad}`"),
                ));
            }
            let pattern = Pattern::new(source, flags.contains('i'))
                .map_err(|e| TenazError::invalid_selector(input, e.to_string()))?;
            return Ok(Self::Pattern(pattern));
        }

        if body.starts_with('"') {
            return parse_quoted(body, input).map(Self::Exact);
        }

        Ok(Self::Contains(body.to_string()))
    }

    /// JSON descriptor consumed by the in-page query engine
    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Exact(value) => json!({ "kind": "exact", "value": value }),
            Self::Contains(value) => json!({ "kind": "contains", "value": value }),
            Self::Pattern(p) => json!({
                "kind": "regex",
                "source": p.source(),
                "flags": if p.ignore_case() { "i" } else { "" },
            }),
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(value) => {
                write!(f, "\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Self::Contains(value) if value.starts_with(['/', '"', '\\']) => {
                write!(f, "\\{value}")
            }
            Self::Contains(value) => write!(f, "{value}"),
            Self::Pattern(p) => {
                write!(f, "/{}/{}", p.source(), if p.ignore_case() { "i" } else { "" })
            }
        }
    }
}

/// One candidate strategy for finding an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Selector {
    /// ARIA role with optional accessible-name filter
    Role {
        /// Role name (e.g. `button`, `textbox`)
        role: String,
        /// Accessible name filter
        name: Option<TextMatch>,
    },
    /// Text content
    Text(TextMatch),
    /// Associated `<label>` / `aria-labelledby` / `aria-label` text
    Label(TextMatch),
    /// `placeholder` attribute
    Placeholder(TextMatch),
    /// `data-testid` attribute
    TestId(String),
    /// Attribute presence or exact value
    Attribute {
        /// Attribute name
        name: String,
        /// Required value (`None` = presence only)
        value: Option<String>,
    },
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
}

impl Selector {
    /// Role selector without a name filter
    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
        }
    }

    /// Role selector with an accessible-name filter
    #[must_use]
    pub fn role_named(role: impl Into<String>, name: TextMatch) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name),
        }
    }

    /// Case-insensitive text substring selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextMatch::Contains(text.into()))
    }

    /// Label selector
    #[must_use]
    pub fn label(text: impl Into<String>) -> Self {
        Self::Label(TextMatch::Contains(text.into()))
    }

    /// Placeholder selector
    #[must_use]
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::Placeholder(TextMatch::Contains(text.into()))
    }

    /// Test ID selector (data-testid attribute)
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Attribute selector
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: Option<&str>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }

    /// CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// XPath selector
    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    /// Engine name as used in the textual syntax
    #[must_use]
    pub const fn engine(&self) -> &'static str {
        match self {
            Self::Role { .. } => "role",
            Self::Text(_) => "text",
            Self::Label(_) => "label",
            Self::Placeholder(_) => "placeholder",
            Self::TestId(_) => "testid",
            Self::Attribute { .. } => "attr",
            Self::Css(_) => "css",
            Self::XPath(_) => "xpath",
        }
    }

    /// Evaluate against an element snapshot without a browser.
    ///
    /// Returns `None` when the selector needs a real DOM (XPath, CSS
    /// combinators and other syntax outside the supported subset).
    #[must_use]
    pub fn matches(&self, element: &ElementSnapshot) -> Option<bool> {
        let hit = match self {
            Self::Role { role, name } => {
                element
                    .role
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(role))
                    && name.as_ref().map_or(true, |n| n.matches(&element.name))
            }
            Self::Text(text) => text.matches(&element.text),
            Self::Label(text) => element
                .label
                .as_deref()
                .or_else(|| element.attribute("aria-label"))
                .is_some_and(|l| text.matches(l)),
            Self::Placeholder(text) => element
                .attribute("placeholder")
                .is_some_and(|p| text.matches(p)),
            Self::TestId(id) => element.attribute("data-testid") == Some(id.as_str()),
            Self::Attribute { name, value } => match (element.attribute(name), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Self::Css(selector) => return css::matches(selector, element),
            Self::XPath(_) => return None,
        };
        Some(hit)
    }

    /// JSON descriptor consumed by the in-page query engine
    #[must_use]
    pub fn query_spec(&self) -> serde_json::Value {
        match self {
            Self::Role { role, name } => json!({
                "engine": "role",
                "role": role,
                "name": name.as_ref().map(TextMatch::to_json),
            }),
            Self::Text(text) => json!({ "engine": "text", "text": text.to_json() }),
            Self::Label(text) => json!({ "engine": "label", "text": text.to_json() }),
            Self::Placeholder(text) => json!({ "engine": "placeholder", "text": text.to_json() }),
            Self::TestId(id) => json!({ "engine": "testid", "id": id }),
            Self::Attribute { name, value } => {
                json!({ "engine": "attr", "name": name, "value": value })
            }
            Self::Css(css) => json!({ "engine": "css", "css": css }),
            Self::XPath(xpath) => json!({ "engine": "xpath", "xpath": xpath }),
        }
    }

    /// JavaScript expression that evaluates to an array of element snapshots
    /// for every element in the page matching this selector, in DOM order.
    #[must_use]
    pub fn to_query_all(&self) -> String {
        format!("({QUERY_ENGINE_JS})({})", self.query_spec())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role, name: None } => write!(f, "role={role}"),
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name={name}]"),
            Self::Text(text) => write!(f, "text={text}"),
            Self::Label(text) => write!(f, "label={text}"),
            Self::Placeholder(text) => write!(f, "placeholder={text}"),
            Self::TestId(id) => write!(f, "testid={}", literal(id)),
            Self::Attribute { name, value: None } => write!(f, "attr={name}"),
            Self::Attribute {
                name,
                value: Some(value),
            } => write!(f, "attr={name}={}", literal(value)),
            Self::Css(css) => write!(f, "css={css}"),
            Self::XPath(xpath) => write!(f, "xpath={xpath}"),
        }
    }
}

impl FromStr for Selector {
    type Err = TenazError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TenazError::invalid_selector(input, "empty selector"));
        }

        let engine = trimmed
            .split_once('=')
            .map(|(prefix, body)| (prefix.trim().to_ascii_lowercase(), body));

        match engine {
            Some((prefix, body)) if prefix == "role" => parse_role(body, input),
            Some((prefix, body)) if prefix == "text" => Ok(Self::Text(TextMatch::parse(body, input)?)),
            Some((prefix, body)) if prefix == "label" => {
                Ok(Self::Label(TextMatch::parse(body, input)?))
            }
            Some((prefix, body)) if prefix == "placeholder" => {
                Ok(Self::Placeholder(TextMatch::parse(body, input)?))
            }
            Some((prefix, body)) if prefix == "testid" || prefix == "data-testid" => {
                let id = unquote(body.trim(), input)?;
                if id.is_empty() {
                    return Err(TenazError::invalid_selector(input, "empty test id"));
                }
                Ok(Self::TestId(id))
            }
            Some((prefix, body)) if prefix == "attr" => parse_attribute(body, input),
            Some((prefix, body)) if prefix == "css" => non_empty(body, input).map(Self::Css),
            Some((prefix, body)) if prefix == "xpath" => non_empty(body, input).map(Self::XPath),
            _ if trimmed.starts_with("//") || trimmed.starts_with("(//") => {
                Ok(Self::XPath(trimmed.to_string()))
            }
            _ => Ok(Self::Css(trimmed.to_string())),
        }
    }
}

impl TryFrom<String> for Selector {
    type Error = TenazError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

fn parse_role(body: &str, input: &str) -> TenazResult<Selector> {
    let body = body.trim();
    let (role, options) = match body.find('[') {
        Some(open) => {
            let Some(inner) = body[open + 1..].strip_suffix(']') else {
                return Err(TenazError::invalid_selector(input, "unterminated `[`"));
            };
            (body[..open].trim(), Some(inner.trim()))
        }
        None => (body, None),
    };

    if role.is_empty() {
        return Err(TenazError::invalid_selector(input, "missing role"));
    }
    if !role.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(TenazError::invalid_selector(
            input,
            format!("invalid role `{role}`"),
        ));
    }

    let name = match options {
        None => None,
        Some(options) => {
            let Some(value) = options.strip_prefix("name") else {
                return Err(TenazError::invalid_selector(
                    input,
                    "only the `name` role option is supported",
                ));
            };
            let Some(value) = value.trim_start().strip_prefix('=') else {
                return Err(TenazError::invalid_selector(input, "expected `name=`"));
            };
            Some(TextMatch::parse(value, input)?)
        }
    };

    Ok(Selector::Role {
        role: role.to_ascii_lowercase(),
        name,
    })
}

fn parse_attribute(body: &str, input: &str) -> TenazResult<Selector> {
    let body = body.trim();
    let (name, value) = match body.split_once('=') {
        Some((name, value)) => (name.trim(), Some(unquote(value.trim(), input)?)),
        None => (body, None),
    };
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(TenazError::invalid_selector(input, "invalid attribute name"));
    }
    Ok(Selector::Attribute {
        name: name.to_string(),
        value,
    })
}

fn non_empty(body: &str, input: &str) -> TenazResult<String> {
    let body = body.trim();
    if body.is_empty() {
        Err(TenazError::invalid_selector(input, "empty expression"))
    } else {
        Ok(body.to_string())
    }
}

/// Quote a value that would not survive [`unquote`] as written
fn literal(value: &str) -> std::borrow::Cow<'_, str> {
    if value.starts_with('"') || value.trim() != value || value.is_empty() {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
            .into()
    } else {
        value.into()
    }
}

/// Strip surrounding double quotes if present
fn unquote(value: &str, input: &str) -> TenazResult<String> {
    if value.starts_with('"') {
        parse_quoted(value, input)
    } else {
        Ok(value.to_string())
    }
}

/// Parse a `"..."` literal with `\"` and `\\` escapes; nothing may follow it.
fn parse_quoted(value: &str, input: &str) -> TenazResult<String> {
    let mut out = String::new();
    let mut chars = value.chars().skip(1);
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => break,
            },
            '"' => {
                if chars.next().is_some() {
                    return Err(TenazError::invalid_selector(
                        input,
                        "unexpected characters after closing quote",
                    ));
                }
                return Ok(out);
            }
            other => out.push(other),
        }
    }
    Err(TenazError::invalid_selector(input, "unterminated quote"))
}

/// Collapse runs of whitespace and trim
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// In-page query engine. Called with the descriptor from
/// [`Selector::query_spec`]; returns `ElementSnapshot`-shaped objects.
const QUERY_ENGINE_JS: &str = r#"(spec) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const textMatches = (m, value) => {
    if (!m) return true;
    const v = norm(value);
    if (m.kind === 'exact') return v === norm(m.value);
    if (m.kind === 'contains') return v.toLowerCase().includes(norm(m.value).toLowerCase());
    return new RegExp(m.source, m.flags).test(value || '');
  };
  const implicitRole = (el) => {
    const explicit = el.getAttribute('role');
    if (explicit) return explicit.trim().split(/\s+/)[0];
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    switch (tag) {
      case 'button': return 'button';
      case 'a': return el.hasAttribute('href') ? 'link' : null;
      case 'nav': return 'navigation';
      case 'main': return 'main';
      case 'header': return 'banner';
      case 'footer': return 'contentinfo';
      case 'form': return 'form';
      case 'dialog': return 'dialog';
      case 'textarea': return 'textbox';
      case 'select': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
      case 'ul': case 'ol': return 'list';
      case 'li': return 'listitem';
      case 'table': return 'table';
      case 'img': return 'img';
      case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
      case 'input':
        if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        if (type === 'range') return 'slider';
        if (type === 'number') return 'spinbutton';
        if (type === 'search') return 'searchbox';
        if (type === 'hidden') return null;
        return 'textbox';
    }
    return null;
  };
  const labelText = (el) => {
    const ids = el.getAttribute('aria-labelledby');
    if (ids) {
      const text = ids.split(/\s+/)
        .map((id) => document.getElementById(id))
        .filter(Boolean)
        .map((n) => n.textContent)
        .join(' ');
      if (norm(text)) return norm(text);
    }
    if (el.labels && el.labels.length) {
      return norm(Array.from(el.labels).map((l) => l.textContent).join(' '));
    }
    return null;
  };
  const accessibleName = (el) => {
    const aria = norm(el.getAttribute('aria-label'));
    if (aria) return aria;
    const label = labelText(el);
    if (label) return label;
    const tag = el.tagName.toLowerCase();
    if (tag === 'input' || tag === 'textarea' || tag === 'select') {
      const type = (el.getAttribute('type') || '').toLowerCase();
      if (['button', 'submit', 'reset'].includes(type)) return norm(el.value);
      return norm(el.getAttribute('placeholder') || el.getAttribute('title'));
    }
    if (tag === 'img') return norm(el.getAttribute('alt'));
    return norm(el.textContent || el.getAttribute('title'));
  };
  const isVisible = (el) => {
    if (!el.isConnected) return false;
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  const isEnabled = (el) =>
    !(el.disabled || el.closest('fieldset:disabled') || el.getAttribute('aria-disabled') === 'true');
  const isEditable = (el) => {
    if (!isEnabled(el)) return false;
    if (el.isContentEditable) return true;
    const tag = el.tagName.toLowerCase();
    return (tag === 'input' || tag === 'textarea' || tag === 'select') && !el.readOnly;
  };
  const checkedState = (el) => {
    if (el.type === 'checkbox' || el.type === 'radio') return !!el.checked;
    const aria = el.getAttribute('aria-checked');
    return aria === null ? null : aria === 'true';
  };
  const all = () => Array.from(document.querySelectorAll('*'));
  const find = () => {
    switch (spec.engine) {
      case 'css': return Array.from(document.querySelectorAll(spec.css));
      case 'xpath': {
        const r = document.evaluate(spec.xpath, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const out = [];
        for (let i = 0; i < r.snapshotLength; i++) {
          const node = r.snapshotItem(i);
          if (node.nodeType === 1) out.push(node);
        }
        return out;
      }
      case 'role':
        return all().filter((el) => implicitRole(el) === spec.role && textMatches(spec.name, accessibleName(el)));
      case 'text':
        return all().filter((el) =>
          textMatches(spec.text, el.textContent) &&
          !Array.from(el.children).some((c) => textMatches(spec.text, c.textContent)));
      case 'label':
        return all().filter((el) => {
          const l = labelText(el) || el.getAttribute('aria-label');
          return l !== null && textMatches(spec.text, l);
        });
      case 'placeholder':
        return all().filter((el) => el.hasAttribute('placeholder') && textMatches(spec.text, el.getAttribute('placeholder')));
      case 'testid':
        return Array.from(document.querySelectorAll('[data-testid]')).filter((el) => el.getAttribute('data-testid') === spec.id);
      case 'attr':
        return all().filter((el) => el.hasAttribute(spec.name) && (spec.value === null || el.getAttribute(spec.name) === spec.value));
    }
    return [];
  };
  const describe = (el) => {
    const attributes = {};
    for (const a of Array.from(el.attributes)) attributes[a.name] = a.value;
    return {
      tag: el.tagName.toLowerCase(),
      role: implicitRole(el),
      name: accessibleName(el),
      text: norm(el.innerText !== undefined ? el.innerText : el.textContent),
      label: labelText(el),
      attributes,
      state: { visible: isVisible(el), enabled: isEnabled(el), editable: isEditable(el), checked: checkedState(el) },
    };
  };
  return find().map(describe);
}"#;
