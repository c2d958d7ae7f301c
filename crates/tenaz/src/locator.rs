//! Locator chains and indicator sets.
//!
//! A [`Locator`] names one logical UI target and lists the ways to find it in
//! priority order. The resolver walks the list front to back on every poll and
//! the first candidate that yields an element in the required state wins, so
//! put the most specific strategy first:
//!
//! ```
//! use tenaz::{Locator, Selector};
//!
//! let email = Locator::parse_chain(["role=textbox[name=/username|email/i]", "attr=id=email"])
//!     .unwrap()
//!     .named("email field");
//! assert_eq!(email.candidates().len(), 2);
//! assert_eq!(email.candidates()[1], Selector::attribute("id", Some("email")));
//! ```
//!
//! An [`IndicatorSet`] groups independent locators where "at least one is
//! present" is the contract (e.g. any of several admin-only menu entries).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::result::{TenazError, TenazResult};
use crate::selector::Selector;

/// Ordered candidate chain for one logical element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Diagnostic name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Candidates in priority order
    candidates: Vec<Selector>,
}

impl Locator {
    /// Single-candidate locator
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            name: None,
            candidates: vec![selector],
        }
    }

    /// Locator from an arbitrary candidate list. An empty list is accepted
    /// here and rejected by [`Locator::validate`] (and thus by the resolver).
    #[must_use]
    pub fn from_candidates(candidates: impl IntoIterator<Item = Selector>) -> Self {
        Self {
            name: None,
            candidates: candidates.into_iter().collect(),
        }
    }

    /// Parse a chain of selector expressions
    ///
    /// # Errors
    ///
    /// Returns `InvalidSelector` for the first malformed expression, or
    /// `InvalidCandidateSet` for an empty chain.
    pub fn parse_chain<I, S>(expressions: I) -> TenazResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates = expressions
            .into_iter()
            .map(|e| e.as_ref().parse::<Selector>())
            .collect::<TenazResult<Vec<_>>>()?;
        let locator = Self::from_candidates(candidates);
        locator.validate()?;
        Ok(locator)
    }

    /// Append a lower-priority fallback
    #[must_use]
    pub fn or(mut self, selector: Selector) -> Self {
        self.candidates.push(selector);
        self
    }

    /// Set diagnostic name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Candidates in priority order
    #[must_use]
    pub fn candidates(&self) -> &[Selector] {
        &self.candidates
    }

    /// Diagnostic name, if set
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if set, otherwise the rendered chain
    #[must_use]
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.chain_string())
    }

    /// Candidates rendered as `a | b | c`
    #[must_use]
    pub fn chain_string(&self) -> String {
        self.candidates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Reject an empty chain
    ///
    /// # Errors
    ///
    /// Returns `InvalidCandidateSet` when there are no candidates.
    pub fn validate(&self) -> TenazResult<()> {
        if self.candidates.is_empty() {
            return Err(TenazError::invalid_candidates(format!(
                "locator `{}` has no candidates",
                self.name.as_deref().unwrap_or("<unnamed>")
            )));
        }
        Ok(())
    }
}

impl From<Selector> for Locator {
    fn from(selector: Selector) -> Self {
        Self::new(selector)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} [{}]", self.chain_string()),
            None => write!(f, "[{}]", self.chain_string()),
        }
    }
}

/// Non-empty set of independent locators; "at least one resolves"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    groups: Vec<Locator>,
}

impl IndicatorSet {
    /// Set from locator groups (validated by [`IndicatorSet::validate`])
    #[must_use]
    pub fn new(groups: impl IntoIterator<Item = Locator>) -> Self {
        Self {
            name: None,
            groups: groups.into_iter().collect(),
        }
    }

    /// Parse one chain of expressions per group
    ///
    /// # Errors
    ///
    /// Returns `InvalidSelector` for malformed expressions and
    /// `InvalidCandidateSet` for an empty set or an empty group.
    pub fn parse<G, I, S>(groups: G) -> TenazResult<Self>
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let groups = groups
            .into_iter()
            .map(Locator::parse_chain)
            .collect::<TenazResult<Vec<_>>>()?;
        let set = Self::new(groups);
        set.validate()?;
        Ok(set)
    }

    /// Set diagnostic name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add another group
    #[must_use]
    pub fn or(mut self, group: impl Into<Locator>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Groups in evaluation order
    #[must_use]
    pub fn groups(&self) -> &[Locator] {
        &self.groups
    }

    /// Diagnostic name, if set
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if set, otherwise a count of groups
    #[must_use]
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} indicator groups", self.groups.len()))
    }

    /// Reject an empty set or any empty group
    ///
    /// # Errors
    ///
    /// Returns `InvalidCandidateSet`.
    pub fn validate(&self) -> TenazResult<()> {
        if self.groups.is_empty() {
            return Err(TenazError::invalid_candidates(format!(
                "indicator set `{}` has no groups",
                self.name.as_deref().unwrap_or("<unnamed>")
            )));
        }
        self.groups.iter().try_for_each(Locator::validate)
    }
}

impl FromIterator<Locator> for IndicatorSet {
    fn from_iter<T: IntoIterator<Item = Locator>>(iter: T) -> Self {
        Self::new(iter)
    }
}
