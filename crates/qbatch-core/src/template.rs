//! Placeholder substitution for submission-script headers.
//!
//! Placeholders are introduced by `$$`: `$$name` or `$${name}`, where a name is
//! an ASCII identifier. `$$$$` escapes a placeholder and is never
//! substituted. Substitution is partial: placeholders without a value, escapes
//! and bare delimiters are all left in the text unchanged, so substituting
//! again with the same values changes nothing.

use crate::error::{Result, SchedulerError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

pub const DELIMITER: &str = "$$";

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\$\$(?:(?P<escaped>\$\$)|(?P<named>[_a-zA-Z][_a-zA-Z0-9]*)|\{(?P<braced>[_a-zA-Z][_a-zA-Z0-9]*)\}|(?P<invalid>))",
    )
    .expect("valid placeholder regex")
});

/// A header template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QTemplate {
    template: String,
}

impl QTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of first appearance, without duplicates.
    pub fn get_identifiers(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        for caps in PLACEHOLDER_RE.captures_iter(&self.template) {
            match placeholder_name(&caps) {
                Some(name) => {
                    if !ids.iter().any(|id| id == name) {
                        ids.push(name.to_string());
                    }
                }
                None if caps.name("escaped").is_some() || caps.name("invalid").is_some() => {}
                None => {
                    return Err(SchedulerError::Template(
                        "Unrecognized named group in pattern".to_string(),
                    ));
                }
            }
        }
        Ok(ids)
    }

    /// Replace every placeholder that has a value in `mapping`.
    ///
    /// Everything else, including `$$$$` escapes, is copied as written.
    pub fn safe_substitute(&self, mapping: &BTreeMap<String, String>) -> String {
        PLACEHOLDER_RE
            .replace_all(&self.template, |caps: &Captures<'_>| {
                placeholder_name(caps)
                    .and_then(|name| mapping.get(name))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn placeholder_name<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.name("named")
        .or_else(|| caps.name("braced"))
        .map(|m| m.as_str())
}
