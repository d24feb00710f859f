//! Rate-limit bucket keys.
//!
//! A bucket is the registrable domain of a name (its public suffix plus one
//! label). A name that is itself a public suffix is its own bucket, so
//! `dyndns.org`, `mydomain.dyndns.org` and `other.dyndns.org` are three
//! separate buckets while `www.mydomain.dyndns.org` shares one with
//! `mydomain.dyndns.org`.

use std::collections::BTreeSet;

use crate::error::{LimitError, Result};
use crate::suffix::SuffixList;

/// Map a domain name to its bucket key.
///
/// Surrounding whitespace, a trailing dot and upper-case letters are
/// normalized away and Unicode labels are converted to their `xn--` form
/// before lookup. Applying `bucket` to a bucket key returns the key unchanged.
pub fn bucket<S: SuffixList + ?Sized>(suffixes: &S, name: &str) -> Result<String> {
    let name = normalize(name)?;

    if suffixes.is_public_suffix(&name) {
        return Ok(name);
    }

    let suffix = suffixes
        .longest_public_suffix_match(&name)
        .ok_or_else(|| LimitError::InvalidDomain(name.clone()))?;

    // name = "<rest>.<suffix>", keep the last label of <rest>
    let rest = &name[..name.len() - suffix.len() - 1];
    let registrant = rest.rsplit('.').next().unwrap_or(rest);
    Ok(format!("{}.{}", registrant, suffix))
}

/// Collapse a set of names into their distinct bucket keys.
///
/// Fails on the first name that cannot be canonicalized, before the caller
/// has written anything.
pub fn bucket_set<S, I, N>(suffixes: &S, names: I) -> Result<BTreeSet<String>>
where
    S: SuffixList + ?Sized,
    I: IntoIterator<Item = N>,
    N: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| bucket(suffixes, name.as_ref()))
        .collect()
}

/// Longest name and label DNS allows.
const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

fn normalize(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    idna::domain_to_ascii_strict(trimmed)
        .ok()
        .filter(|ascii| is_valid_hostname(ascii))
        .ok_or_else(|| LimitError::InvalidDomain(name.to_string()))
}

/// Letters, digits and inner hyphens only, within DNS length limits.
fn is_valid_hostname(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && name.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
