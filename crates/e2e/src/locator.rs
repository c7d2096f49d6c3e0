//! Typed locator registry
//!
//! Selectors live in YAML files, one mapping of `Page -> Element -> selector`
//! per file. Flows refer to them by `Page.Element` key. A selector may carry
//! a single `{param}` placeholder that is filled at resolution time.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Symbolic `Page.Element` key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocatorKey {
    pub page: String,
    pub element: String,
}

impl LocatorKey {
    pub fn new(page: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            element: element.into(),
        }
    }
}

impl FromStr for LocatorKey {
    type Err = E2eError;

    fn from_str(s: &str) -> E2eResult<Self> {
        match s.split_once('.') {
            Some((page, element))
                if !page.is_empty() && !element.is_empty() && !element.contains('.') =>
            {
                Ok(Self::new(page, element))
            }
            _ => Err(E2eError::InvalidLocatorKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for LocatorKey {
    type Error = E2eError;

    fn try_from(s: String) -> E2eResult<Self> {
        s.parse()
    }
}

impl From<LocatorKey> for String {
    fn from(key: LocatorKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for LocatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.page, self.element)
    }
}

/// Selector as written in the registry, possibly with a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorTemplate {
    key: LocatorKey,
    raw: String,
    placeholder: Option<String>,
}

impl LocatorTemplate {
    /// Parse a template, rejecting more than one distinct placeholder
    pub fn parse(key: LocatorKey, raw: &str) -> E2eResult<Self> {
        let mut names: Vec<&str> = PLACEHOLDER
            .captures_iter(raw)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();

        if names.len() > 1 {
            return Err(E2eError::Config(format!(
                "locator '{}' has more than one placeholder: {}",
                key,
                names.join(", ")
            )));
        }

        Ok(Self {
            placeholder: names.first().map(|s| s.to_string()),
            key,
            raw: raw.to_string(),
        })
    }

    pub fn key(&self) -> &LocatorKey {
        &self.key
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    /// Use the template as-is. Fails while a placeholder is unbound.
    pub fn concrete(&self) -> E2eResult<ConcreteLocator> {
        match &self.placeholder {
            Some(p) => Err(E2eError::UnboundPlaceholder {
                key: self.key.to_string(),
                placeholder: p.clone(),
            }),
            None => Ok(ConcreteLocator(self.raw.clone())),
        }
    }
}

/// Selector ready to hand to the browser
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcreteLocator(pub String);

impl ConcreteLocator {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcreteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every `{token}` in the template with `value`.
///
/// Plain substitution: `value` is not escaped and must not itself contain
/// the token.
pub fn substitute(template: &LocatorTemplate, token: &str, value: &str) -> ConcreteLocator {
    ConcreteLocator(template.raw.replace(&format!("{{{}}}", token), value))
}

/// Registry of every known locator
#[derive(Debug, Clone, Default)]
pub struct LocatorRegistry {
    entries: BTreeMap<LocatorKey, LocatorTemplate>,
}

type PageFile = BTreeMap<String, BTreeMap<String, String>>;

impl LocatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single YAML document of `Page -> Element -> selector`
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let mut registry = Self::new();
        registry.merge_yaml(yaml, "<inline>")?;
        Ok(registry)
    }

    /// Load every YAML file below a directory
    pub fn load_dir(dir: &Path) -> E2eResult<Self> {
        if !dir.is_dir() {
            return Err(E2eError::ConfigNotFound(dir.display().to_string()));
        }

        let mut registry = Self::new();
        let mut files: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();

        for path in files {
            let content = std::fs::read_to_string(&path)?;
            registry.merge_yaml(&content, &path.display().to_string())?;
        }

        debug!("Loaded {} locator(s) from {}", registry.len(), dir.display());
        Ok(registry)
    }

    fn merge_yaml(&mut self, yaml: &str, origin: &str) -> E2eResult<()> {
        let pages: PageFile = serde_yaml::from_str(yaml)?;
        for (page, elements) in pages {
            for (element, selector) in elements {
                self.insert(LocatorKey::new(page.clone(), element), &selector)
                    .map_err(|e| E2eError::Config(format!("{}: {}", origin, e)))?;
            }
        }
        Ok(())
    }

    /// Register a locator; duplicate keys are rejected
    pub fn insert(&mut self, key: LocatorKey, selector: &str) -> E2eResult<()> {
        if self.entries.contains_key(&key) {
            return Err(E2eError::Config(format!("duplicate locator '{}'", key)));
        }
        let template = LocatorTemplate::parse(key.clone(), selector)?;
        self.entries.insert(key, template);
        Ok(())
    }

    pub fn resolve(&self, key: &LocatorKey) -> E2eResult<&LocatorTemplate> {
        self.entries
            .get(key)
            .ok_or_else(|| E2eError::UnknownLocator(key.to_string()))
    }

    /// Resolve and substitute in one go. The token must name the
    /// template's placeholder.
    pub fn resolve_with(&self, key: &LocatorKey, token: &str, value: &str) -> E2eResult<ConcreteLocator> {
        let template = self.resolve(key)?;
        match template.placeholder() {
            Some(p) if p == token => Ok(substitute(template, token, value)),
            Some(p) => Err(E2eError::UnboundPlaceholder {
                key: key.to_string(),
                placeholder: p.to_string(),
            }),
            None => Err(E2eError::Config(format!(
                "locator '{}' has no placeholder to bind '{}'",
                key, token
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
