//! Declarative nested association specs.
//!
//! An [`AssociationSpec`] names the associations to bulk-load for a record set,
//! and recursively the associations to bulk-load on the records reached through
//! each of them:
//!
//! ```text
//! "author"                                  -> Name
//! ["author", "tags"]                        -> List of names
//! {"posts": {"comments": "author"}}         -> Map of name -> nested spec
//! ["author", {"posts": "comments"}]         -> List mixing names and maps
//! ```
//!
//! The same shapes deserialize from JSON, and [`AssociationSpec::from_paths`]
//! builds a spec from dotted paths such as `"posts.comments.author"`.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Association names are plain identifiers.
const NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn name_regex() -> Option<&'static Regex> {
    static NAME: OnceLock<Option<Regex>> = OnceLock::new();
    NAME.get_or_init(|| match Regex::new(NAME_PATTERN) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(
                pattern = NAME_PATTERN,
                error = %e,
                "Invalid association name pattern, name validation disabled"
            );
            None
        }
    })
    .as_ref()
}

/// Check that `name` is a valid association identifier.
pub fn is_valid_association_name(name: &str) -> bool {
    name_regex().is_none_or(|regex| regex.is_match(name))
}

/// A tree of association names to bulk-load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssociationSpec {
    /// A single association with nothing nested under it.
    Name(String),
    /// Several specs loaded side by side.
    List(Vec<AssociationSpec>),
    /// Associations with a nested spec for the records each one reaches.
    Map(IndexMap<String, AssociationSpec>),
}

impl Default for AssociationSpec {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for AssociationSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for AssociationSpec {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl AssociationSpec {
    /// A spec that loads nothing.
    pub fn empty() -> Self {
        Self::List(Vec::new())
    }

    /// A single association name.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// A list of association names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(names.into_iter().map(|n| Self::Name(n.into())).collect())
    }

    /// A mapping with a single `name -> nested` entry.
    pub fn nested(name: impl Into<String>, nested: impl Into<AssociationSpec>) -> Self {
        let mut map = IndexMap::new();
        map.insert(name.into(), nested.into());
        Self::Map(map)
    }

    /// Build a spec from dotted association paths.
    ///
    /// Paths sharing a prefix are merged: `["posts.comments", "posts.tags"]`
    /// becomes `{"posts": ["comments", "tags"]}`. Empty segments are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a segment is not a valid identifier.
    pub fn from_paths<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = PathTree::default();
        for path in paths {
            let parts: Vec<&str> = path
                .as_ref()
                .split('.')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            for part in &parts {
                if !is_valid_association_name(part) {
                    return Err(Error::config(format!(
                        "invalid association name '{}' in path '{}'",
                        part,
                        path.as_ref()
                    )));
                }
            }
            tree.insert(&parts);
        }
        Ok(tree.into_spec())
    }

    /// Parse a spec from its JSON form and validate every name in it.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check that every name in the tree is a valid identifier.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Name(name) => check_name(name),
            Self::List(items) => items.iter().try_for_each(Self::validate),
            Self::Map(map) => map.iter().try_for_each(|(name, nested)| {
                check_name(name)?;
                nested.validate()
            }),
        }
    }

    /// True if this spec loads nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Name(_) => false,
            Self::List(items) => items.iter().all(Self::is_empty),
            Self::Map(map) => map.is_empty(),
        }
    }

    /// Is `name` a direct child of this node?
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::Name(n) => n == name,
            Self::List(items) => items.iter().any(|item| item.includes(name)),
            Self::Map(map) => map.contains_key(name),
        }
    }

    /// Names of the direct children of this node, in declaration order, without duplicates.
    pub fn children(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.collect_children(&mut out);
        out
    }

    fn collect_children<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Name(n) => {
                if !out.contains(&n.as_str()) {
                    out.push(n);
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_children(out);
                }
            }
            Self::Map(map) => {
                for name in map.keys() {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
            }
        }
    }

    /// The nested spec declared under `name` at this node.
    ///
    /// Only mapping-shaped nodes carry nested specs; a bare name has none.
    pub fn descend(&self, name: &str) -> Option<&AssociationSpec> {
        match self {
            Self::Name(_) => None,
            Self::List(items) => items.iter().find_map(|item| item.descend(name)),
            Self::Map(map) => map.get(name),
        }
    }

    /// Walk `path` from this node.
    ///
    /// Returns `None` when the path leaves the declared tree, including when it
    /// steps past a bare name.
    pub fn node_at<S: AsRef<str>>(&self, path: &[S]) -> Option<&AssociationSpec> {
        path.iter()
            .try_fold(self, |node, segment| node.descend(segment.as_ref()))
    }

    /// Wrap `name` in the mappings named by `path`, outermost first.
    ///
    /// `scoped(&["posts", "comments"], "author")` is
    /// `{"posts": {"comments": "author"}}`.
    pub fn scoped<S: AsRef<str>>(path: &[S], name: &str) -> Self {
        path.iter()
            .rev()
            .fold(Self::name(name), |inner, segment| {
                Self::nested(segment.as_ref(), inner)
            })
    }
}

fn check_name(name: &str) -> Result<()> {
    if is_valid_association_name(name) {
        Ok(())
    } else {
        Err(Error::config(format!("invalid association name '{name}'")))
    }
}

/// Intermediate trie used by `from_paths`.
#[derive(Default)]
struct PathTree {
    children: IndexMap<String, PathTree>,
}

impl PathTree {
    fn insert(&mut self, parts: &[&str]) {
        if let Some((first, rest)) = parts.split_first() {
            self.children
                .entry((*first).to_string())
                .or_default()
                .insert(rest);
        }
    }

    fn into_spec(self) -> AssociationSpec {
        let leaves_only = self.children.values().all(|c| c.children.is_empty());
        if leaves_only {
            let mut names: Vec<AssociationSpec> = self
                .children
                .into_keys()
                .map(AssociationSpec::Name)
                .collect();
            if names.len() == 1 {
                return names.remove(0);
            }
            return AssociationSpec::List(names);
        }
        AssociationSpec::Map(
            self.children
                .into_iter()
                .map(|(name, child)| (name, child.into_spec()))
                .collect(),
        )
    }
}
