//! Resource-name templates.
//!
//! Cloud resources are addressed by hierarchical paths such as
//! `projects/my-project/instances/my-instance`. A [`PathTemplate`] describes
//! the shape of one such path as an ordered sequence of literal segments and
//! named placeholders:
//!
//! ```text
//! projects/{project}/instances/{instance}
//! projects/{project}/databases/{database}/documents/{document_path=**}
//! ```
//!
//! `{name}` matches exactly one segment. `{name=**}` is a multi-segment
//! wildcard matching zero or more segments; a template may contain at most
//! one. [`PathTemplate::render`] turns bindings into a path and
//! [`PathTemplate::parse`] recovers the bindings from a path, so the two are
//! inverses for any fully-bound template.
//!
//! A resource type usually admits several shapes. [`PathTemplateSet`] holds
//! the candidate templates and parses against them in order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Errors from rendering or parsing resource-name templates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The template pattern itself is malformed.
    #[error("invalid path template {template:?}: {reason}")]
    InvalidTemplate {
        /// The offending pattern.
        template: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A placeholder has no value in the supplied bindings.
    #[error("no binding for placeholder {0:?}")]
    MissingBinding(String),

    /// A binding value cannot appear in a rendered path.
    #[error("binding {name:?} has invalid value {value:?}")]
    InvalidBinding {
        /// The placeholder name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// The path does not line up with the template's segments.
    #[error("path {path:?} does not match template {template:?}")]
    PatternMismatch {
        /// The template pattern.
        template: String,
        /// The path that failed to match.
        path: String,
    },

    /// No template in the candidate set matches the path.
    #[error("no template matches path {0:?}")]
    NoMatchingTemplate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable { name: String, multi: bool },
}

/// A compiled resource-name template.
///
/// # Example
///
/// ```
/// use gapic_core::PathTemplate;
///
/// let template = PathTemplate::new("projects/{project}/instances/{instance}").unwrap();
///
/// let path = template
///     .render(&[("project", "p1"), ("instance", "i1")])
///     .unwrap();
/// assert_eq!(path, "projects/p1/instances/i1");
///
/// let bindings = template.parse("projects/p1/instances/i1").unwrap();
/// assert_eq!(bindings["project"], "p1");
/// assert_eq!(bindings["instance"], "i1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pattern: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a template pattern.
    ///
    /// Accepted segment forms are literals, `{name}`, `{name=*}` (equivalent
    /// to `{name}`), and `{name=**}`. At most one `{name=**}` wildcard is
    /// allowed per template and placeholder names must be unique.
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        let invalid = |reason: &str| PathError::InvalidTemplate {
            template: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("template is empty"));
        }
        if pattern.starts_with('/') || pattern.ends_with('/') {
            return Err(invalid("template must not start or end with '/'"));
        }

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        let mut has_multi = false;

        for raw in pattern.split('/') {
            if raw.is_empty() {
                return Err(invalid("template contains an empty segment"));
            }

            let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
                if raw.contains(['{', '}']) {
                    return Err(invalid("unbalanced braces in segment"));
                }
                segments.push(Segment::Literal(raw.to_string()));
                continue;
            };

            let (name, multi) = match inner.split_once('=') {
                None => (inner, false),
                Some((name, "*")) => (name, false),
                Some((name, "**")) => (name, true),
                Some(_) => return Err(invalid("unsupported sub-pattern in placeholder")),
            };

            if name.is_empty() {
                return Err(invalid("placeholder has an empty name"));
            }
            if name.contains(['{', '}', '=', '*']) {
                return Err(invalid("placeholder name contains invalid characters"));
            }
            if names.contains(&name) {
                return Err(invalid("duplicate placeholder name"));
            }
            if multi {
                if has_multi {
                    return Err(invalid("more than one multi-segment wildcard"));
                }
                has_multi = true;
            }

            names.push(name);
            segments.push(Segment::Variable {
                name: name.to_string(),
                multi,
            });
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// Get the original pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Iterate over the placeholder names in template order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render the template with the given bindings into a path.
    ///
    /// Every placeholder must have a binding, and single-segment values must
    /// be non-empty and slash-free. A multi-segment wildcard value may span
    /// several segments (`"a/b/c"`) or be empty, in which case the wildcard
    /// contributes nothing to the rendered path.
    pub fn render(&self, bindings: &[(&str, &str)]) -> Result<String, PathError> {
        let lookup = |want: &str| {
            bindings
                .iter()
                .find(|(name, _)| *name == want)
                .map(|(_, value)| *value)
        };

        let mut parts: Vec<&str> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => parts.push(lit),
                Segment::Variable { name, multi } => {
                    let value =
                        lookup(name).ok_or_else(|| PathError::MissingBinding(name.clone()))?;
                    let ok = if *multi {
                        if value.is_empty() {
                            continue;
                        }
                        !value.split('/').any(str::is_empty)
                    } else {
                        !value.is_empty() && !value.contains('/')
                    };
                    if !ok {
                        return Err(PathError::InvalidBinding {
                            name: name.clone(),
                            value: value.to_string(),
                        });
                    }
                    parts.push(value);
                }
            }
        }
        Ok(parts.join("/"))
    }

    /// Parse a path against this template, recovering the bindings.
    ///
    /// Literal segments must match positionally; each `{name}` captures one
    /// segment and `{name=**}` captures whatever segments remain between the
    /// fixed prefix and suffix, possibly none.
    pub fn parse(&self, path: &str) -> Result<HashMap<String, String>, PathError> {
        let mismatch = || PathError::PatternMismatch {
            template: self.pattern.clone(),
            path: path.to_string(),
        };

        if path.is_empty() {
            return Err(mismatch());
        }
        let parts: Vec<&str> = path.split('/').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(mismatch());
        }

        let multi_pos = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Variable { multi: true, .. }));

        let mut bindings = HashMap::new();
        match multi_pos {
            None => {
                if parts.len() != self.segments.len() {
                    return Err(mismatch());
                }
                if !match_fixed(&self.segments, &parts, &mut bindings) {
                    return Err(mismatch());
                }
            }
            Some(pos) => {
                let suffix_len = self.segments.len() - pos - 1;
                if parts.len() < pos + suffix_len {
                    return Err(mismatch());
                }
                let tail_start = parts.len() - suffix_len;
                if !match_fixed(&self.segments[..pos], &parts[..pos], &mut bindings)
                    || !match_fixed(
                        &self.segments[pos + 1..],
                        &parts[tail_start..],
                        &mut bindings,
                    )
                {
                    return Err(mismatch());
                }
                let Segment::Variable { name, .. } = &self.segments[pos] else {
                    unreachable!("multi_pos always indexes a variable segment");
                };
                bindings.insert(name.clone(), parts[pos..tail_start].join("/"));
            }
        }
        Ok(bindings)
    }

    /// Check whether a path matches this template.
    pub fn matches(&self, path: &str) -> bool {
        self.parse(path).is_ok()
    }
}

fn match_fixed(
    segments: &[Segment],
    parts: &[&str],
    bindings: &mut HashMap<String, String>,
) -> bool {
    for (segment, part) in segments.iter().zip(parts) {
        match segment {
            Segment::Literal(lit) => {
                if lit != part {
                    return false;
                }
            }
            Segment::Variable { name, .. } => {
                bindings.insert(name.clone(), (*part).to_string());
            }
        }
    }
    true
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl FromStr for PathTemplate {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// An ordered set of candidate templates for one resource type.
///
/// # Example
///
/// ```
/// use gapic_core::PathTemplateSet;
///
/// let set = PathTemplateSet::compile([
///     "projects/{project}/databases/{database}",
///     "projects/{project}/databases/{database}/documents/{document_path=**}",
/// ])
/// .unwrap();
///
/// let (template, bindings) = set
///     .parse("projects/p/databases/d/documents/users/alice")
///     .unwrap();
/// assert_eq!(template.variables().count(), 3);
/// assert_eq!(bindings["document_path"], "users/alice");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathTemplateSet {
    templates: Vec<PathTemplate>,
}

impl PathTemplateSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile several patterns into a set, preserving order.
    pub fn compile<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self, PathError> {
        let mut set = Self::new();
        for pattern in patterns {
            set.push(PathTemplate::new(pattern)?);
        }
        Ok(set)
    }

    /// Add a template to the end of the candidate list.
    pub fn push(&mut self, template: PathTemplate) {
        self.templates.push(template);
    }

    /// Add a template, builder style.
    pub fn with(mut self, template: PathTemplate) -> Self {
        self.push(template);
        self
    }

    /// Parse a path against the candidates in order; the first match wins.
    ///
    /// Fails with [`PathError::NoMatchingTemplate`] only after every
    /// candidate has been tried.
    pub fn parse(
        &self,
        path: &str,
    ) -> Result<(&PathTemplate, HashMap<String, String>), PathError> {
        for template in &self.templates {
            if let Ok(bindings) = template.parse(path) {
                return Ok((template, bindings));
            }
        }
        Err(PathError::NoMatchingTemplate(path.to_string()))
    }

    /// Get the candidate templates in order.
    pub fn templates(&self) -> &[PathTemplate] {
        &self.templates
    }

    /// Number of candidate templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if the set has no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
