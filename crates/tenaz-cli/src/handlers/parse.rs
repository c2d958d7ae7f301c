//! Parse command handler

use crate::error::{CliError, CliResult};
use crate::ParseArgs;
use std::fmt::Write as _;
use tenaz::Selector;

/// One selector's normalized form, and its browser query with `js`
pub fn render_selector(input: &str, js: bool) -> CliResult<String> {
    let selector: Selector = input.parse()?;
    let mut out = format!("{input}\n  engine: {}\n  normalized: {selector}\n", selector.engine());
    if js {
        let _ = writeln!(out, "  query: {}", selector.to_query_all());
    }
    Ok(out)
}

/// Execute the parse command; fails if any input is malformed
pub fn execute_parse(args: &ParseArgs) -> CliResult<String> {
    let mut out = String::new();
    let mut errors = Vec::new();
    for input in &args.selectors {
        match render_selector(input, args.js) {
            Ok(text) => out.push_str(&text),
            Err(e) => errors.push(e.to_string()),
        }
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(CliError::invalid_argument(errors.join("; ")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_css_is_normalized() {
        let out = render_selector("button.primary", false).unwrap();
        assert!(out.contains("engine: css"));
        assert!(out.contains("normalized: css=button.primary"));
        assert!(!out.contains("query:"));
    }

    #[test]
    fn test_js_query_included() {
        let out = render_selector("testid=login-button", true).unwrap();
        assert!(out.contains("query: "));
        assert!(out.contains("login-button"));
    }

    #[test]
    fn test_any_invalid_input_fails() {
        let args = ParseArgs {
            selectors: vec!["text=Login".into(), "role=".into()],
            js: false,
        };
        let err = execute_parse(&args).unwrap_err();
        assert!(err.to_string().contains("role="));
    }

    #[test]
    fn test_all_valid() {
        let args = ParseArgs {
            selectors: vec!["text=Login".into(), "//form//button".into()],
            js: false,
        };
        let out = execute_parse(&args).unwrap();
        assert!(out.contains("normalized: text=Login"));
        assert!(out.contains("engine: xpath"));
    }
}
