//! Compound CSS selector matching against element snapshots.
//!
//! Supports comma-separated lists of compound selectors built from a type (or
//! `*`), `#id`, `.class`, attribute tests (`[a]`, `[a=v]`, `[a*=v]`, `[a^=v]`,
//! `[a$=v]`, `[a~=v]`, optional `i` flag) and the `:disabled`, `:enabled` and
//! `:checked` pseudo-classes. Combinators and anything else report "unsupported"
//! so callers can defer to a real DOM.

use crate::driver::ElementSnapshot;

/// Match `selector` against one element. `None` = syntax outside the subset.
#[must_use]
pub fn matches(selector: &str, element: &ElementSnapshot) -> Option<bool> {
    let compounds = split_list(selector)
        .into_iter()
        .map(|part| Compound::parse(part.trim()))
        .collect::<Option<Vec<_>>>()?;
    Some(compounds.iter().any(|c| c.matches(element)))
}

/// Whether the whole selector is inside the supported subset
#[must_use]
pub fn is_supported(selector: &str) -> bool {
    split_list(selector)
        .into_iter()
        .all(|part| Compound::parse(part.trim()).is_some())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Id(String),
    Class(String),
    Attr {
        name: String,
        op: AttrOp,
        value: String,
        ignore_case: bool,
    },
    Disabled,
    Enabled,
    Checked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
}

/// Split on top-level commas (outside brackets and quotes)
fn split_list(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&selector[start..]);
    parts
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn value(&mut self) -> Option<String> {
        match self.peek()? {
            q @ ('"' | '\'') => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.bump()? {
                        '\\' => out.push(self.bump()?),
                        c if c == q => return Some(out),
                        c => out.push(c),
                    }
                }
            }
            _ => self.ident(),
        }
    }
}

impl Compound {
    fn parse(input: &str) -> Option<Self> {
        if input.is_empty() {
            return None;
        }
        let mut cur = Cursor::new(input);
        let tag = if cur.eat('*') { None } else { cur.ident() };
        let mut parts = Vec::new();

        while let Some(c) = cur.bump() {
            let part = match c {
                '#' => Part::Id(cur.ident()?),
                '.' => Part::Class(cur.ident()?),
                '[' => Self::parse_attr(&mut cur)?,
                ':' => match cur.ident()?.as_str() {
                    "disabled" => Part::Disabled,
                    "enabled" => Part::Enabled,
                    "checked" => Part::Checked,
                    _ => return None,
                },
                // combinators, pseudo-elements and the rest need a real DOM
                _ => return None,
            };
            parts.push(part);
        }

        if tag.is_none() && parts.is_empty() && !input.starts_with('*') {
            return None;
        }
        Some(Self { tag, parts })
    }

    fn parse_attr(cur: &mut Cursor) -> Option<Part> {
        cur.skip_ws();
        let name = cur.ident()?;
        cur.skip_ws();
        if cur.eat(']') {
            return Some(Part::Attr {
                name,
                op: AttrOp::Exists,
                value: String::new(),
                ignore_case: false,
            });
        }

        let op = match cur.bump()? {
            '=' => AttrOp::Equals,
            '*' => AttrOp::Contains,
            '^' => AttrOp::Prefix,
            '$' => AttrOp::Suffix,
            '~' => AttrOp::Word,
            _ => return None,
        };
        if op != AttrOp::Equals && !cur.eat('=') {
            return None;
        }
        cur.skip_ws();
        let value = cur.value()?;
        cur.skip_ws();
        let ignore_case = match cur.peek()? {
            'i' | 'I' => {
                cur.pos += 1;
                true
            }
            's' | 'S' => {
                cur.pos += 1;
                false
            }
            _ => false,
        };
        cur.skip_ws();
        cur.eat(']').then_some(Part::Attr {
            name,
            op,
            value,
            ignore_case,
        })
    }

    fn matches(&self, el: &ElementSnapshot) -> bool {
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(&el.tag) {
                return false;
            }
        }
        self.parts.iter().all(|part| part.matches(el))
    }
}

impl Part {
    fn matches(&self, el: &ElementSnapshot) -> bool {
        match self {
            Self::Id(id) => el.attribute("id") == Some(id.as_str()),
            Self::Class(class) => el
                .attribute("class")
                .is_some_and(|c| c.split_whitespace().any(|name| name == class)),
            Self::Attr {
                name,
                op,
                value,
                ignore_case,
            } => {
                let Some(actual) = el.attribute(name) else {
                    return false;
                };
                let (actual, value) = if *ignore_case {
                    (actual.to_lowercase(), value.to_lowercase())
                } else {
                    (actual.to_string(), value.clone())
                };
                match op {
                    AttrOp::Exists => true,
                    AttrOp::Equals => actual == value,
                    AttrOp::Contains => !value.is_empty() && actual.contains(&value),
                    AttrOp::Prefix => !value.is_empty() && actual.starts_with(&value),
                    AttrOp::Suffix => !value.is_empty() && actual.ends_with(&value),
                    AttrOp::Word => actual.split_whitespace().any(|w| w == value),
                }
            }
            Self::Disabled => !el.state.enabled,
            Self::Enabled => el.state.enabled,
            Self::Checked => el.state.checked == Some(true),
        }
    }
}
