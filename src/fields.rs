//! Field requests
//!
//! A `FieldRequest` decides which dotted field paths a query selects. Rules are
//! kept in insertion order; the most specific matching rule wins, with the most
//! recently added rule breaking ties. A trailing wildcard (`repository.*`)
//! decides every subpath under its base and shadows deeper rules.

use crate::error::ApiError;
use std::fmt;

/// Depth used when a wildcard include leaves the selection depth open.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Child segment that no rule can name; used to probe "anything below".
const PROBE_SEGMENT: &str = "*";

/// A parsed field path such as `repository.master` or `videoMetadata.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
    wildcard: bool,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, ApiError> {
        let trimmed = path.trim();
        if trimmed == "*" {
            return Ok(Self {
                segments: Vec::new(),
                wildcard: true,
            });
        }
        if trimmed.is_empty() {
            return Err(ApiError::MalformedFieldPath(path.to_string()));
        }

        let mut segments: Vec<&str> = trimmed.split('.').collect();
        let wildcard = segments.last() == Some(&"*");
        if wildcard {
            segments.pop();
        }
        if segments.is_empty() || !segments.iter().all(|s| is_valid_segment(s)) {
            return Err(ApiError::MalformedFieldPath(path.to_string()));
        }

        Ok(Self {
            segments: segments.into_iter().map(str::to_string).collect(),
            wildcard,
        })
    }

    /// Segments of the base path (without the wildcard marker).
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Base path as a dotted string (`""` for the root wildcard).
    pub fn base(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.segments.is_empty(), self.wildcard) {
            (true, _) => f.write_str("*"),
            (false, true) => write!(f, "{}.*", self.base()),
            (false, false) => f.write_str(&self.base()),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    path: FieldPath,
    kind: RuleKind,
    seq: usize,
}

impl Rule {
    /// Whether the rule speaks for `candidate`.
    fn matches(&self, candidate: &[String]) -> bool {
        if self.path.wildcard {
            is_strict_prefix(&self.path.segments, candidate)
        } else {
            is_prefix(&self.path.segments, candidate)
        }
    }

    /// Whether the rule selects something strictly below `candidate`.
    fn targets_below(&self, candidate: &[String]) -> bool {
        if self.path.wildcard {
            is_prefix(candidate, &self.path.segments)
        } else {
            is_strict_prefix(candidate, &self.path.segments)
        }
    }

    /// A path the rule alone would decide: its base, or a child of its base
    /// for wildcard rules.
    fn probe(&self) -> Vec<String> {
        let mut probe = self.path.segments.clone();
        if self.path.wildcard {
            probe.push(PROBE_SEGMENT.to_string());
        }
        probe
    }
}

#[derive(Debug, Clone, Copy)]
struct Decision {
    kind: RuleKind,
    wildcard: bool,
}

fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(a, b)| a == b)
}

fn is_strict_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() < path.len() && is_prefix(prefix, path)
}

fn split_candidate(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('.').map(str::to_string).collect()
}

/// Ordered include/exclude rules for a query selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRequest {
    rules: Vec<Rule>,
    defaults: Vec<FieldPath>,
    depth: Option<usize>,
    next_seq: usize,
}

impl FieldRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request including every path in `paths`.
    pub fn create<I, S>(paths: I) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut request = Self::new();
        for path in paths {
            request.include(path.as_ref())?;
        }
        Ok(request)
    }

    /// Request selecting every declared field.
    pub fn all() -> Self {
        let mut request = Self::new();
        request.push_rule(
            FieldPath {
                segments: Vec::new(),
                wildcard: true,
            },
            RuleKind::Include,
        );
        request
    }

    pub fn include(&mut self, path: &str) -> Result<(), ApiError> {
        let path = FieldPath::parse(path)?;
        self.push_rule(path, RuleKind::Include);
        Ok(())
    }

    pub fn exclude(&mut self, path: &str) -> Result<(), ApiError> {
        let path = FieldPath::parse(path)?;
        self.push_rule(path, RuleKind::Exclude);
        Ok(())
    }

    /// Builder form of [`FieldRequest::include`].
    pub fn including(mut self, path: &str) -> Result<Self, ApiError> {
        self.include(path)?;
        Ok(self)
    }

    /// Builder form of [`FieldRequest::exclude`].
    pub fn excluding(mut self, path: &str) -> Result<Self, ApiError> {
        self.exclude(path)?;
        Ok(self)
    }

    /// Lowest-priority include set, consulted only when no rule matches.
    pub fn with_defaults(mut self, defaults: &[&str]) -> Result<Self, ApiError> {
        self.defaults = defaults
            .iter()
            .map(|d| FieldPath::parse(d))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    fn push_rule(&mut self, path: FieldPath, kind: RuleKind) {
        self.rules.push(Rule {
            path,
            kind,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Appends all rules of `other` after this request's rules.
    pub fn merged_with(&self, other: &FieldRequest) -> FieldRequest {
        let mut merged = self.clone();
        for rule in &other.rules {
            merged.push_rule(rule.path.clone(), rule.kind);
        }
        if merged.defaults.is_empty() {
            merged.defaults = other.defaults.clone();
        }
        merged.depth = match (self.depth, other.depth) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.defaults.is_empty()
    }

    /// Paths named by include rules, in insertion order.
    pub fn included_paths(&self) -> Vec<FieldPath> {
        self.rules
            .iter()
            .filter(|r| r.kind == RuleKind::Include)
            .map(|r| r.path.clone())
            .collect()
    }

    /// Paths named by exclude rules, in insertion order.
    pub fn excluded_paths(&self) -> Vec<FieldPath> {
        self.rules
            .iter()
            .filter(|r| r.kind == RuleKind::Exclude)
            .map(|r| r.path.clone())
            .collect()
    }

    /// Maximum selection depth below the root type.
    ///
    /// Explicit depth wins; otherwise the deepest include plus one level, so
    /// including `repository` selects the scalars of `repository`.
    pub fn depth(&self) -> usize {
        if let Some(depth) = self.depth {
            return depth;
        }
        let includes = self
            .rules
            .iter()
            .filter(|r| r.kind == RuleKind::Include)
            .map(|r| &r.path)
            .chain(self.defaults.iter());

        let mut depth = 1;
        for path in includes {
            if path.wildcard {
                return DEFAULT_MAX_DEPTH;
            }
            depth = depth.max(path.segments.len());
        }
        depth
    }

    fn decide(&self, candidate: &[String]) -> Option<Decision> {
        let wildcard = self
            .rules
            .iter()
            .filter(|r| r.path.wildcard && r.matches(candidate))
            .min_by(|a, b| {
                a.path
                    .segments
                    .len()
                    .cmp(&b.path.segments.len())
                    .then(b.seq.cmp(&a.seq))
            });
        if let Some(rule) = wildcard {
            return Some(Decision {
                kind: rule.kind,
                wildcard: true,
            });
        }

        self.rules
            .iter()
            .filter(|r| !r.path.wildcard && r.matches(candidate))
            .max_by_key(|r| (r.path.segments.len(), r.seq))
            .map(|rule| Decision {
                kind: rule.kind,
                wildcard: false,
            })
    }

    fn has_effective_below(&self, candidate: &[String], kind: RuleKind) -> bool {
        self.rules.iter().any(|r| {
            r.kind == kind
                && r.targets_below(candidate)
                && self.decide(&r.probe()).map(|d| d.kind) == Some(kind)
        })
    }

    fn default_covers(&self, candidate: &[String]) -> bool {
        self.defaults.iter().any(|d| {
            if d.wildcard {
                is_strict_prefix(&d.segments, candidate)
            } else {
                is_prefix(&d.segments, candidate)
            }
        })
    }

    fn default_below(&self, candidate: &[String]) -> bool {
        self.defaults.iter().any(|d| {
            if d.wildcard {
                is_prefix(candidate, &d.segments)
            } else {
                is_strict_prefix(candidate, &d.segments)
            }
        })
    }

    /// Returns `true` if this request selects `path`, either fully or as a
    /// container for a more specific include.
    pub fn should_include_path(&self, path: &str) -> bool {
        let candidate = split_candidate(path);
        if candidate.is_empty() {
            return false;
        }

        match self.decide(&candidate) {
            Some(d) if d.wildcard => d.kind == RuleKind::Include,
            Some(d) if d.kind == RuleKind::Include => true,
            Some(_) => self.has_effective_below(&candidate, RuleKind::Include),
            None => {
                self.has_effective_below(&candidate, RuleKind::Include)
                    || self.default_covers(&candidate)
                    || self.default_below(&candidate)
            }
        }
    }

    /// Returns `true` if every subpath of `path` is selected.
    pub fn should_include_all_subpaths(&self, path: &str) -> bool {
        let candidate = split_candidate(path);
        if candidate.is_empty() {
            return false;
        }

        match self.decide(&candidate) {
            Some(d) if d.wildcard => d.kind == RuleKind::Include,
            Some(d) if d.kind == RuleKind::Include => {
                !self.has_effective_below(&candidate, RuleKind::Exclude)
            }
            Some(_) => false,
            None => {
                self.default_covers(&candidate)
                    && !self.has_effective_below(&candidate, RuleKind::Exclude)
            }
        }
    }
}
