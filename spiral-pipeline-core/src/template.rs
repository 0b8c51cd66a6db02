//! Prompt templates with `{placeholder}` substitution.
//!
//! Rendering is a single pass over the template: every `{key}` with a value in
//! [`Substitutions`] is replaced, every other token is left as written. Values
//! are never re-scanned, so the order keys were set in has no effect.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::info;

use crate::error::StoreError;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z0-9_]+)\}").expect("valid placeholder regex"))
}

/// Placeholder name to replacement text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitutions {
    values: BTreeMap<&'static str, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Replaces `{key}` tokens that have a value; unknown tokens stay untouched.
pub fn render(template: &str, substitutions: &Substitutions) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures| {
            substitutions
                .get(&caps[1])
                .map_or_else(|| caps[0].to_string(), str::to_string)
        })
        .into_owned()
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in placeholder_re().captures_iter(template) {
        let name = caps[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Placeholders in `template` that `substitutions` does not fill.
pub fn uncovered_placeholders(template: &str, substitutions: &Substitutions) -> Vec<String> {
    placeholders(template)
        .into_iter()
        .filter(|p| substitutions.get(p).is_none())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TemplateKind {
    Enrichment,
    Discovery,
    Comparison,
    ComparisonIdeas,
    Stack,
    Newsletter,
    Subject,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 7] = [
        TemplateKind::Enrichment,
        TemplateKind::Discovery,
        TemplateKind::Comparison,
        TemplateKind::ComparisonIdeas,
        TemplateKind::Stack,
        TemplateKind::Newsletter,
        TemplateKind::Subject,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            TemplateKind::Enrichment => "enrichment-prompt.txt",
            TemplateKind::Discovery => "discovery-prompt.txt",
            TemplateKind::Comparison => "comparison-prompt.txt",
            TemplateKind::ComparisonIdeas => "comparison-ideas-prompt.txt",
            TemplateKind::Stack => "stack-prompt.txt",
            TemplateKind::Newsletter => "newsletter-prompt.txt",
            TemplateKind::Subject => "subject-prompt.txt",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            TemplateKind::Enrichment => include_str!("../templates/enrichment-prompt.txt"),
            TemplateKind::Discovery => include_str!("../templates/discovery-prompt.txt"),
            TemplateKind::Comparison => include_str!("../templates/comparison-prompt.txt"),
            TemplateKind::ComparisonIdeas => {
                include_str!("../templates/comparison-ideas-prompt.txt")
            }
            TemplateKind::Stack => include_str!("../templates/stack-prompt.txt"),
            TemplateKind::Newsletter => include_str!("../templates/newsletter-prompt.txt"),
            TemplateKind::Subject => include_str!("../templates/subject-prompt.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub text: String,
}

impl Template {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn render(&self, substitutions: &Substitutions) -> String {
        render(&self.text, substitutions)
    }

    pub fn placeholders(&self) -> Vec<String> {
        placeholders(&self.text)
    }
}

/// One template per [`TemplateKind`].
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: BTreeMap<TemplateKind, Template>,
}

impl TemplateSet {
    /// The templates compiled into the library.
    pub fn builtin() -> Self {
        let templates = TemplateKind::ALL
            .iter()
            .map(|&kind| (kind, Template::new(kind.file_name(), kind.builtin())))
            .collect();
        Self { templates }
    }

    /// Built-in templates, each replaced by a same-named file in `dir` if present.
    pub fn load(dir: Option<&Path>) -> Result<Self, StoreError> {
        let mut set = Self::builtin();
        let Some(dir) = dir else {
            return Ok(set);
        };
        for kind in TemplateKind::ALL {
            let path = dir.join(kind.file_name());
            if path.is_file() {
                let text = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
                info!(path = %path.display(), "Using template override");
                set.templates
                    .insert(kind, Template::new(kind.file_name(), text));
            }
        }
        Ok(set)
    }

    pub fn get(&self, kind: TemplateKind) -> &Template {
        // Every kind is inserted by `builtin`.
        &self.templates[&kind]
    }

    pub fn with_template(mut self, kind: TemplateKind, text: impl Into<String>) -> Self {
        self.templates
            .insert(kind, Template::new(kind.file_name(), text));
        self
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::builtin()
    }
}
