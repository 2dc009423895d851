use std::sync::Arc;

use serde_json::Value;

/// The cardinality of inputs to match for an argument/option.
///
/// Inspired by argparse: <https://docs.python.org/3/library/argparse.html#nargs>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nargs {
    /// `N`: Precisely `N` values.
    Precisely(u8),
    /// `?`: Zero or one value.
    Optional,
    /// `*`: May be any number of values, including `0`.
    Any,
    /// `+`: At least one value must be specified.
    AtLeastOne,
}

impl Nargs {
    /// Whether this cardinality collects its values into a list.
    pub(crate) fn is_list(&self) -> bool {
        match self {
            Nargs::Precisely(n) => *n > 1,
            Nargs::Optional => false,
            Nargs::Any | Nargs::AtLeastOne => true,
        }
    }

    /// Whether this cardinality accepts an empty input.
    pub(crate) fn is_optional(&self) -> bool {
        matches!(self, Nargs::Optional | Nargs::Any)
    }
}

impl std::fmt::Display for Nargs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What the tokenizer does when it encounters an argument on the Cli.
///
/// Inspired by argparse: <https://docs.python.org/3/library/argparse.html#action>
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Action {
    /// Store the value(s).
    #[default]
    Store,
    /// Store `true` when present.
    StoreTrue,
    /// Store `false` when present.
    StoreFalse,
    /// Store the constant when present.
    StoreConst(Value),
    /// Collect the value(s) of every occurrence into a list.
    Append,
    /// Count the occurrences.
    Count,
}

/// The node level policy for arguments which were not supplied from any source.
///
/// This is what ends up in the `arg_default` bucket, the lowest precedence of them all.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArgumentDefault {
    /// Record the argument as known, but without a value.
    #[default]
    Unset,
    /// Do not record the argument at all.
    Suppress,
    /// Record the argument with this value.
    Value(Value),
}

type CoerceFn = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;

/// A value coercion function, applied to values from every source (Cli, environment, configuration, defaults).
///
/// Environment and Cli values always arrive as [`Value::String`].
/// Configuration and default values arrive as whatever the caller supplied.
///
/// ### Example
/// ```
/// # use tierarg_builder as tierarg;
/// use tierarg::Coerce;
/// use serde_json::json;
///
/// let integer = Coerce::integer();
/// assert_eq!(integer.apply(&json!("10")).unwrap(), json!(10));
/// assert_eq!(integer.apply(&json!(10)).unwrap(), json!(10));
/// assert!(integer.apply(&json!("ten")).is_err());
/// ```
#[derive(Clone)]
pub struct Coerce {
    name: &'static str,
    function: Arc<CoerceFn>,
}

impl Coerce {
    /// Create a coercion from an arbitrary function.
    pub fn new(
        name: &'static str,
        function: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            function: Arc::new(function),
        }
    }

    /// Pass values through untouched.
    pub fn identity() -> Self {
        Self::new("identity", |value| Ok(value.clone()))
    }

    /// Render scalars as strings.
    pub fn string() -> Self {
        Self::new("string", |value| match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(format!("cannot convert {value} to string")),
        })
    }

    /// Convert to a signed integer.
    pub fn integer() -> Self {
        Self::new("integer", |value| match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{s}' cannot convert to integer")),
            _ => Err(format!("{value} cannot convert to integer")),
        })
    }

    /// Convert to a floating point number.
    pub fn float() -> Self {
        Self::new("float", |value| match value {
            Value::Number(n) => n
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| format!("{value} cannot convert to float")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from)
                .ok_or_else(|| format!("'{s}' cannot convert to float")),
            _ => Err(format!("{value} cannot convert to float")),
        })
    }

    /// Convert to a boolean.
    ///
    /// True: `1`, `true`, `yes`, `y`, `on`.
    /// False: `0`, `false`, `no`, `n`, `off`, and the empty string.
    /// Matching is case insensitive.
    pub fn boolean() -> Self {
        Self::new("boolean", |value| match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(format!("{value} cannot convert to boolean")),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "y" | "on" => Ok(Value::Bool(true)),
                "0" | "false" | "no" | "n" | "off" | "" => Ok(Value::Bool(false)),
                _ => Err(format!("'{s}' cannot convert to boolean")),
            },
            _ => Err(format!("{value} cannot convert to boolean")),
        })
    }

    /// The name this coercion was registered under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Coerce a single value.
    pub fn apply(&self, value: &Value) -> Result<Value, String> {
        (self.function)(value)
    }

    /// Coerce a value, element-wise when it is a list.
    pub fn apply_each(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.apply(item))
                .collect::<Result<Vec<Value>, String>>()
                .map(Value::Array),
            _ => self.apply(value),
        }
    }
}

impl Default for Coerce {
    fn default() -> Self {
        Coerce::identity()
    }
}

impl std::fmt::Debug for Coerce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Coerce({})", self.name)
    }
}

/// The location of an argument's value inside a nested configuration mapping.
///
/// A path written as a single string is split on `/`.
/// Use `\/` for a key which itself contains a slash.
///
/// ### Example
/// ```
/// # use tierarg_builder as tierarg;
/// use tierarg::ConfigPath;
///
/// assert_eq!(ConfigPath::from("a/b").segments(), ["a", "b"]);
/// assert_eq!(ConfigPath::from(r"a\/b/c").segments(), ["a/b", "c"]);
/// assert_eq!(ConfigPath::from(vec!["a/b", "c"]).segments(), ["a/b", "c"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    /// The keys to walk, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Walk the path through nested mappings.
    /// Any missing segment (or a non-mapping along the way) yields `None`.
    pub fn lookup<'v>(&self, config: &'v Value) -> Option<&'v Value> {
        self.0
            .iter()
            .try_fold(config, |current, key| current.as_object()?.get(key))
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|segment| !segment.is_empty())
    }
}

impl From<&str> for ConfigPath {
    fn from(value: &str) -> Self {
        let mut segments = Vec::default();
        let mut current = String::default();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'/') => {
                    current.push('/');
                    chars.next();
                }
                '/' => segments.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }

        segments.push(current);
        ConfigPath(segments)
    }
}

impl From<String> for ConfigPath {
    fn from(value: String) -> Self {
        ConfigPath::from(value.as_str())
    }
}

impl<S: Into<String>> From<Vec<S>> for ConfigPath {
    fn from(value: Vec<S>) -> Self {
        ConfigPath(value.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped: Vec<String> = self.0.iter().map(|s| s.replace('/', r"\/")).collect();
        write!(f, "{}", escaped.join("/"))
    }
}
