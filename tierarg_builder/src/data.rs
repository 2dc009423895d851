use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::parser::ConfigError;

/// One named source of values: canonical key to value, where `None` marks a known-but-unset argument.
pub type Bucket = BTreeMap<String, Option<Value>>;

/// The named sources of argument values.
///
/// [`Source::Override`] is always the highest priority, and [`Source::ArgDefault`] always the lowest.
/// The order of the middle four is configurable, see [`ArgumentData::set_precedence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// Values written through [`ArgumentData::set`], typically from callbacks.
    Override,
    /// Values from the command line.
    Cli,
    /// Values from environment variables.
    Environment,
    /// Values from the configuration object.
    Configuration,
    /// Static defaults, from arguments and nodes.
    Defaults,
    /// The node level "argument not supplied" policy.
    ArgDefault,
}

impl Source {
    /// The configurable sources, in their default order.
    pub const DEFAULT_PRECEDENCE: [Source; 4] = [
        Source::Cli,
        Source::Environment,
        Source::Configuration,
        Source::Defaults,
    ];

    const ALL: [Source; 6] = [
        Source::Override,
        Source::Cli,
        Source::Environment,
        Source::Configuration,
        Source::Defaults,
        Source::ArgDefault,
    ];

    /// The snake case name of this source.
    pub fn name(&self) -> &'static str {
        match self {
            Source::Override => "override",
            Source::Cli => "cli",
            Source::Environment => "environment",
            Source::Configuration => "configuration",
            Source::Defaults => "defaults",
            Source::ArgDefault => "arg_default",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.name() == value)
            .ok_or_else(|| ConfigError(format!("Unknown data source '{value}'")))
    }
}

/// The precedence store: every [`Source`] bucket, exposed as one merged view.
///
/// Reading a key returns the value of the highest priority bucket which contains it.
/// Writing through the merged view ([`ArgumentData::set`]) always targets [`Source::Override`].
///
/// ### Example
/// ```
/// # use tierarg_builder as tierarg;
/// use tierarg::{ArgumentData, Source};
/// use serde_json::json;
///
/// let mut data = ArgumentData::default();
/// data.bucket_mut(Source::Defaults).insert("port".to_string(), Some(json!(80)));
/// data.bucket_mut(Source::Configuration).insert("port".to_string(), Some(json!(8080)));
/// assert_eq!(data.get("port"), Some(&json!(8080)));
///
/// data.set_precedence(Some(&[Source::Cli, Source::Environment, Source::Defaults, Source::Configuration]))
///     .unwrap();
/// assert_eq!(data.get("port"), Some(&json!(80)));
///
/// data.set("port", 1);
/// assert_eq!(data.get("port"), Some(&json!(1)));
/// assert_eq!(data.source_of("port"), Some(Source::Override));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentData {
    buckets: [Bucket; 6],
    precedence: Vec<Source>,
}

impl Default for ArgumentData {
    fn default() -> Self {
        Self {
            buckets: Default::default(),
            precedence: full_chain(&Source::DEFAULT_PRECEDENCE),
        }
    }
}

impl ArgumentData {
    /// Create an empty store with the specified precedence (or the default when `None`).
    pub fn with_precedence(order: Option<&[Source]>) -> Result<Self, ConfigError> {
        let mut data = Self::default();
        data.set_precedence(order)?;
        Ok(data)
    }

    /// Change the order of the configurable sources, highest priority first.
    /// `None` restores [`Source::DEFAULT_PRECEDENCE`].
    ///
    /// The order must be a permutation of precisely [`Source::DEFAULT_PRECEDENCE`].
    pub fn set_precedence(&mut self, order: Option<&[Source]>) -> Result<(), ConfigError> {
        let order = order.unwrap_or(&Source::DEFAULT_PRECEDENCE);
        validate_precedence(order)?;
        self.precedence = full_chain(order);
        Ok(())
    }

    /// The complete bucket chain, highest priority first.
    pub fn precedence(&self) -> &[Source] {
        &self.precedence
    }

    /// The merged value for `key`.
    /// Both absent and unset keys produce `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.lookup(key).and_then(|(_, value)| value.as_ref())
    }

    /// Whether any bucket knows `key`, set or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Whether the merged value for `key` is set.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The bucket which supplies the merged value for `key`.
    pub fn source_of(&self, key: &str) -> Option<Source> {
        self.lookup(key).map(|(source, _)| source)
    }

    /// Write a value through the merged view.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.bucket_mut(Source::Override)
            .insert(key.into(), Some(value.into()));
    }

    /// Read a specific bucket.
    pub fn bucket(&self, source: Source) -> &Bucket {
        &self.buckets[source as usize]
    }

    /// Modify a specific bucket.
    pub fn bucket_mut(&mut self, source: Source) -> &mut Bucket {
        &mut self.buckets[source as usize]
    }

    /// Every key known to any bucket, set or not.
    pub fn keys(&self) -> BTreeSet<&str> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.keys().map(String::as_str))
            .collect()
    }

    /// A snapshot of the merged view, containing only the set keys.
    pub fn to_map(&self) -> Map<String, Value> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value.clone())))
            .collect()
    }

    fn lookup(&self, key: &str) -> Option<(Source, &Option<Value>)> {
        self.precedence.iter().find_map(|source| {
            self.bucket(*source)
                .get(key)
                .map(|value| (*source, value))
        })
    }
}

fn full_chain(order: &[Source]) -> Vec<Source> {
    let mut chain = Vec::with_capacity(order.len() + 2);
    chain.push(Source::Override);
    chain.extend_from_slice(order);
    chain.push(Source::ArgDefault);
    chain
}

fn validate_precedence(order: &[Source]) -> Result<(), ConfigError> {
    let expected: BTreeSet<Source> = Source::DEFAULT_PRECEDENCE.into_iter().collect();
    let actual: BTreeSet<Source> = order.iter().copied().collect();

    if expected.symmetric_difference(&actual).next().is_some()
        || order.len() != Source::DEFAULT_PRECEDENCE.len()
    {
        let names: Vec<&str> = Source::DEFAULT_PRECEDENCE
            .iter()
            .map(Source::name)
            .collect();
        return Err(ConfigError(format!(
            "Precedence must contain all and only these elements: [{}]",
            names.join(", ")
        )));
    }

    Ok(())
}
