//! Public-suffix lookups.
//!
//! The suffix data is handed in by the caller: either a fixed [`SuffixRules`]
//! or a [`SuffixRegistry`] whose snapshots can be swapped while the process
//! runs. Nothing here touches the network, and only [`SuffixRules::from_file`]
//! touches the disk.
//!
//! Rules use the format of `public_suffix_list.dat` and are matched by the
//! `publicsuffix` crate:
//!
//! ```text
//! // comment
//! com
//! co.uk
//! *.ck       wildcard: every label directly under ck is a suffix
//! !www.ck    exception: www.ck is registrable despite the wildcard
//! 中国       stored and matched as xn--fiqs8s
//! ```
//!
//! There is no implicit `*` rule. A name under an unlisted TLD has no match.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use publicsuffix::{List, Psl};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SuffixError {
    #[error("Failed to read public suffix list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid public suffix rule: {0}")]
    InvalidRule(String),

    #[error("Failed to parse public suffix list: {0}")]
    Parse(String),
}

/// Read-only public-suffix capability.
///
/// Names are lower-case ASCII (IDN labels in their `xn--` form), fully
/// qualified and carry no trailing dot.
pub trait SuffixList {
    /// Whether `name` is itself a listed public suffix.
    fn is_public_suffix(&self, name: &str) -> bool;

    /// The longest public suffix that is a proper suffix of `name`.
    ///
    /// The returned slice borrows from `name`.
    fn longest_public_suffix_match<'a>(&self, name: &'a str) -> Option<&'a str>;
}

/// A parsed rule set.
#[derive(Debug)]
pub struct SuffixRules {
    list: List,
    rules: usize,
}

impl SuffixRules {
    /// Parse rules in `public_suffix_list.dat` format.
    ///
    /// Only the first whitespace-separated token of a line is a rule, matching
    /// how the published list is meant to be read. Unicode rules are converted
    /// to ASCII so they match names as certificates carry them.
    pub fn parse(text: &str) -> Result<Self, SuffixError> {
        let mut ascii = String::with_capacity(text.len());
        let mut rules = 0;
        for line in text.lines() {
            match line.split_whitespace().next() {
                Some(rule) if !rule.starts_with("//") => {
                    ascii.push_str(&ascii_rule(rule)?);
                    rules += 1;
                }
                // Comments carry the ICANN / PRIVATE section markers
                _ => ascii.push_str(line.trim()),
            }
            ascii.push('\n');
        }

        let list = ascii
            .parse::<List>()
            .map_err(|e| SuffixError::Parse(e.to_string()))?;
        tracing::debug!(rules, "Parsed public suffix rules");
        Ok(Self { list, rules })
    }

    /// Read and parse a rule file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SuffixError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Build a rule set from individual rules.
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a str>) -> Result<Self, SuffixError> {
        let text = rules.into_iter().collect::<Vec<_>>().join("\n");
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules == 0
    }

    /// The public suffix of `name` under a listed rule, possibly `name` itself.
    fn listed_suffix<'a>(&self, name: &'a str) -> Option<&'a str> {
        let suffix = self.list.suffix(name.as_bytes())?;
        if !suffix.is_known() {
            return None;
        }
        let len = suffix.as_bytes().len();
        Some(&name[name.len() - len..])
    }
}

/// Lower-case a rule and convert its labels to ASCII, keeping the `!` or `*.`
/// marker in front.
fn ascii_rule(rule: &str) -> Result<String, SuffixError> {
    let rule = rule.trim_end_matches('.').to_lowercase();
    if rule.is_ascii() {
        return Ok(rule);
    }
    let (marker, body) = if let Some(body) = rule.strip_prefix('!') {
        ("!", body)
    } else if let Some(body) = rule.strip_prefix("*.") {
        ("*.", body)
    } else {
        ("", rule.as_str())
    };
    let body = idna::domain_to_ascii(body).map_err(|_| SuffixError::InvalidRule(rule.clone()))?;
    Ok(format!("{}{}", marker, body))
}

impl SuffixList for SuffixRules {
    fn is_public_suffix(&self, name: &str) -> bool {
        self.listed_suffix(name).is_some_and(|suffix| suffix.len() == name.len())
    }

    fn longest_public_suffix_match<'a>(&self, name: &'a str) -> Option<&'a str> {
        match self.listed_suffix(name) {
            Some(suffix) if suffix.len() < name.len() => Some(suffix),
            // name is a suffix itself: the answer is the suffix of its parent
            Some(_) => name
                .split_once('.')
                .and_then(|(_, parent)| self.listed_suffix(parent)),
            None => None,
        }
    }
}

impl<T: SuffixList + ?Sized> SuffixList for Arc<T> {
    fn is_public_suffix(&self, name: &str) -> bool {
        (**self).is_public_suffix(name)
    }

    fn longest_public_suffix_match<'a>(&self, name: &'a str) -> Option<&'a str> {
        (**self).longest_public_suffix_match(name)
    }
}

/// One version of the suffix data.
#[derive(Debug)]
pub struct SuffixSnapshot {
    pub version: u64,
    pub rules: SuffixRules,
}

impl SuffixList for SuffixSnapshot {
    fn is_public_suffix(&self, name: &str) -> bool {
        self.rules.is_public_suffix(name)
    }

    fn longest_public_suffix_match<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.rules.longest_public_suffix_match(name)
    }
}

/// Versioned, hot-swappable suffix data.
///
/// Callers take one [`SuffixRegistry::current`] snapshot per operation so a
/// single write never mixes two versions of the list.
#[derive(Debug)]
pub struct SuffixRegistry {
    current: RwLock<Arc<SuffixSnapshot>>,
}

impl SuffixRegistry {
    pub fn new(rules: SuffixRules) -> Self {
        Self {
            current: RwLock::new(Arc::new(SuffixSnapshot { version: 1, rules })),
        }
    }

    pub fn current(&self) -> Arc<SuffixSnapshot> {
        self.current.read().clone()
    }

    /// Install a new rule set and return its version.
    pub fn replace(&self, rules: SuffixRules) -> u64 {
        let mut current = self.current.write();
        let version = current.version + 1;
        *current = Arc::new(SuffixSnapshot { version, rules });
        tracing::info!(version, "Installed new public suffix list");
        version
    }
}
