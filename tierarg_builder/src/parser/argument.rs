use std::env;

use serde_json::Value;

#[cfg(feature = "tracing_debug")]
use tracing::debug;
use tracing::warn;

use crate::api::ArgumentSpec;
use crate::model::{Action, Coerce, Nargs};
use crate::parser::base::{ConfigError, ResolveError};

/// The prefix characters understood on the Cli.
pub(crate) const PREFIX_CHARS: &str = "-";

/// Ambient flags for constructing an [`Argument`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArgumentContext<'a> {
    pub(crate) subcommand: bool,
    pub(crate) prefix_chars: &'a str,
    pub(crate) show_warnings: bool,
}

impl<'a> ArgumentContext<'a> {
    pub(crate) fn root(show_warnings: bool) -> Self {
        Self {
            subcommand: false,
            prefix_chars: PREFIX_CHARS,
            show_warnings,
        }
    }

    pub(crate) fn subcommand(show_warnings: bool) -> Self {
        Self {
            subcommand: true,
            ..Self::root(show_warnings)
        }
    }
}

/// A predicate over the structural properties of an [`Argument`].
/// Unset fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Schema {
    pub(crate) global: Option<bool>,
    pub(crate) required: Option<bool>,
    pub(crate) positional: Option<bool>,
}

impl Schema {
    pub(crate) fn global(global: bool) -> Self {
        Self {
            global: Some(global),
            ..Self::default()
        }
    }
}

/// A validated argument/option, as registered on a command node.
#[derive(Debug, Clone)]
pub(crate) struct Argument {
    pub(crate) dest: String,
    pub(crate) positional: bool,
    pub(crate) longs: Vec<String>,
    pub(crate) shorts: Vec<char>,
    pub(crate) coerce: Coerce,
    pub(crate) spec: ArgumentSpec,
}

impl Argument {
    pub(crate) fn new(spec: ArgumentSpec, context: &ArgumentContext) -> Result<Self, ConfigError> {
        if spec.names.is_empty() || spec.names.iter().any(|name| name.is_empty()) {
            return Err(ConfigError("Argument 'names' missing or invalid".to_string()));
        }

        let prefixed = |name: &str| name.starts_with(|c| context.prefix_chars.contains(c));
        let positional = !prefixed(&spec.names[0]);
        let dest = derive_dest(&spec.names, context.prefix_chars);
        let mut longs = Vec::default();
        let mut shorts = Vec::default();

        if positional {
            if let Some(dest) = &spec.dest {
                return Err(ConfigError(format!(
                    "Positional arguments cannot have a 'dest', remove it from the definition: '{dest}'"
                )));
            }

            if spec.names.len() > 1 {
                return Err(ConfigError(format!(
                    "Positional arguments must have exactly one name: '{}'",
                    spec.names.join("', '")
                )));
            }
        } else {
            for name in &spec.names {
                let mut chars = name.chars();
                let first = chars.next();
                let second = chars.next();

                match (first, second) {
                    (Some(a), Some(b)) if prefixed(name) && a == b => {
                        let long = &name[a.len_utf8() + b.len_utf8()..];

                        if long.is_empty() {
                            return Err(ConfigError("Argument 'names' missing or invalid".to_string()));
                        }

                        longs.push(long.to_string());
                    }
                    (Some(_), Some(short)) if prefixed(name) => {
                        if chars.next().is_some() {
                            return Err(ConfigError(format!(
                                "Short option names must be a single character: '{name}'"
                            )));
                        }

                        shorts.push(short);
                    }
                    _ if prefixed(name) => {
                        return Err(ConfigError("Argument 'names' missing or invalid".to_string()));
                    }
                    _ => {
                        return Err(ConfigError(format!(
                            "Cannot mix positional and option names: '{}'",
                            spec.names.join("', '")
                        )));
                    }
                }
            }
        }

        if context.subcommand {
            if spec.global {
                return Err(ConfigError("Subcommands' arguments cannot be 'global'".to_string()));
            }
        } else if spec.global && positional {
            return Err(ConfigError(format!(
                "Positional arguments cannot be 'global': '{}'",
                spec.names[0]
            )));
        }

        let dest = match &spec.dest {
            Some(explicit) => explicit.clone(),
            None => dest,
        };

        validate_action(&spec, &dest, positional)?;

        if let Some(path) = &spec.config_path {
            if !path.is_valid() {
                return Err(ConfigError(format!(
                    "Invalid 'config_path' for argument '{dest}': '{path}'"
                )));
            }
        }

        if spec.help.is_none() && context.show_warnings {
            warn!(
                "Missing 'help' in '{dest}'. Please add something helpful, or set an empty help to hide this warning"
            );
        }

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Argument '{dest}': positional={positional}, longs={longs:?}, shorts={shorts:?}.");
        }

        Ok(Self {
            dest,
            positional,
            longs,
            shorts,
            coerce: spec.coerce.clone().unwrap_or_default(),
            spec,
        })
    }

    /// The cardinality, falling back to a single value.
    pub(crate) fn nargs(&self) -> Nargs {
        self.spec.nargs.unwrap_or(Nargs::Precisely(1))
    }

    /// Whether the tokenizer must see this argument.
    pub(crate) fn is_required(&self) -> bool {
        match self.spec.required {
            Some(required) => required,
            None => self.positional && !self.nargs().is_optional(),
        }
    }

    /// The help message, including the default when `show_default` is set.
    pub(crate) fn help_text(&self) -> Option<String> {
        match (&self.spec.default, self.spec.show_default) {
            (Some(default), true) => {
                let rendered = match default {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let suffix = format!("(default: {rendered})");

                Some(match &self.spec.help {
                    Some(help) if !help.is_empty() => format!("{help} {suffix}"),
                    _ => suffix,
                })
            }
            _ => self.spec.help.clone(),
        }
    }

    /// Read (and coerce) the environment variable, if configured and present.
    pub(crate) fn value_from_env(&self) -> Result<Option<Value>, ResolveError> {
        let Some(envvar) = &self.spec.envvar else {
            return Ok(None);
        };

        match env::var(envvar) {
            Ok(raw) => self
                .coerce
                .apply(&Value::String(raw))
                .map(Some)
                .map_err(|message| ResolveError::Environment {
                    dest: self.dest.clone(),
                    envvar: envvar.clone(),
                    message,
                }),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(ResolveError::Environment {
                dest: self.dest.clone(),
                envvar: envvar.clone(),
                message: "value is not valid unicode".to_string(),
            }),
        }
    }

    /// The static default, coerced (element-wise for lists) when `apply_type` is set.
    pub(crate) fn default_value(&self, apply_type: bool) -> Result<Option<Value>, ResolveError> {
        match &self.spec.default {
            None => Ok(None),
            Some(value) if !apply_type => Ok(Some(value.clone())),
            Some(value) => self
                .coerce
                .apply_each(value)
                .map(Some)
                .map_err(|message| ResolveError::Default {
                    dest: self.dest.clone(),
                    message,
                }),
        }
    }

    /// Read (and coerce) the value at the configuration path.
    /// A missing path is not a problem, it simply has no value.
    pub(crate) fn value_from_config(&self, config: &Value) -> Result<Option<Value>, ResolveError> {
        let Some(path) = &self.spec.config_path else {
            return Ok(None);
        };

        match path.lookup(config) {
            Some(value) => self
                .coerce
                .apply_each(value)
                .map(Some)
                .map_err(|message| ResolveError::Configuration {
                    dest: self.dest.clone(),
                    path: path.to_string(),
                    message,
                }),
            None => Ok(None),
        }
    }

    pub(crate) fn matches_schema(&self, schema: &Schema) -> bool {
        schema.global.map_or(true, |global| self.spec.global == global)
            && schema
                .required
                .map_or(true, |required| self.is_required() == required)
            && schema
                .positional
                .map_or(true, |positional| self.positional == positional)
    }
}

/// The canonical key: the first `--long` name, else the first `-s` name, else the bare name.
fn derive_dest(names: &[String], prefix_chars: &str) -> String {
    let prefixed = |c: char| prefix_chars.contains(c);
    let mut dest: Option<&str> = None;

    for name in names {
        let mut chars = name.chars();

        match (chars.next(), chars.next()) {
            (Some(a), _) if !prefixed(a) => {
                dest = Some(name);
                break;
            }
            (Some(a), Some(b)) if a == b => {
                dest = Some(&name[a.len_utf8() + b.len_utf8()..]);
                break;
            }
            (Some(a), _) if dest.is_none() => {
                dest = Some(&name[a.len_utf8()..]);
            }
            _ => {}
        }
    }

    dest.unwrap_or_default().replace('-', "_")
}

fn validate_action(spec: &ArgumentSpec, dest: &str, positional: bool) -> Result<(), ConfigError> {
    let flag = match &spec.action {
        Action::Store | Action::Append => None,
        Action::StoreTrue => Some("store_true"),
        Action::StoreFalse => Some("store_false"),
        Action::StoreConst(_) => Some("store_const"),
        Action::Count => Some("count"),
    };

    if let Some(action) = flag {
        if positional {
            return Err(ConfigError(format!(
                "Positional arguments cannot use the '{action}' action: '{dest}'"
            )));
        }

        if spec.nargs.is_some() {
            return Err(ConfigError(format!(
                "'nargs' is not allowed with the '{action}' action: '{dest}'"
            )));
        }

        if !spec.choices.is_empty() {
            return Err(ConfigError(format!(
                "'choices' are not allowed with the '{action}' action: '{dest}'"
            )));
        }
    }

    if spec.nargs == Some(Nargs::Precisely(0)) {
        return Err(ConfigError(format!(
            "'nargs' must be greater than 0 for '{dest}'"
        )));
    }

    if spec.constant.is_some() && (flag.is_some() || spec.nargs != Some(Nargs::Optional)) {
        return Err(ConfigError(format!(
            "'nargs' must be '{}' to supply a constant: '{dest}'",
            Nargs::Optional
        )));
    }

    Ok(())
}
