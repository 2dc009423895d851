use serde_json::Value;

use crate::model::{Action, Coerce, ConfigPath, Nargs};
use crate::prelude::Choices;

/// The declarative definition of one argument/option.
///
/// Names beginning with `-` define an option (`--long` or `-s`), otherwise an argument (positional).
/// The definition is validated when it is registered on a command, see [`Sarge::add_arguments`](crate::Sarge::add_arguments).
///
/// ### Example
/// ```
/// # use tierarg_builder as tierarg;
/// use tierarg::{ArgumentSpec, Coerce};
///
/// let spec = ArgumentSpec::new(["-p", "--port"])
///     .help("The port to listen on.")
///     .coerce(Coerce::integer())
///     .default(8080)
///     .envvar("APP_PORT")
///     .config_path("server/port");
/// # let _ = spec;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArgumentSpec {
    pub(crate) names: Vec<String>,
    pub(crate) dest: Option<String>,
    pub(crate) help: Option<String>,
    pub(crate) default: Option<Value>,
    pub(crate) coerce: Option<Coerce>,
    pub(crate) envvar: Option<String>,
    pub(crate) config_path: Option<ConfigPath>,
    pub(crate) group: Option<String>,
    pub(crate) mutex_group: Option<String>,
    pub(crate) global: bool,
    pub(crate) required: Option<bool>,
    pub(crate) nargs: Option<Nargs>,
    pub(crate) action: Action,
    pub(crate) constant: Option<Value>,
    pub(crate) metavar: Option<String>,
    pub(crate) choices: Vec<(String, Option<String>)>,
    pub(crate) show_default: bool,
    pub(crate) hidden: bool,
}

impl ArgumentSpec {
    /// Create an argument definition from its spellings.
    ///
    /// The canonical key (`dest`) is derived from the names:
    /// the first `--long` name, otherwise the first `-s` name, otherwise the bare positional name.
    /// Dashes are translated to underscores (`--dry-run` is keyed `dry_run`).
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..<Self as Default>::default()
        }
    }

    /// Override the derived canonical key.
    /// Only options may do this.
    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.dest.replace(dest.into());
        self
    }

    /// Document the help message for this argument.
    /// If repeated, only the final help message will apply.
    pub fn help(mut self, description: impl Into<String>) -> Self {
        self.help.replace(description.into());
        self
    }

    /// Set the static default, the value used when no other source supplies one.
    /// The coercion is applied to it (element-wise for lists).
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default.replace(value.into());
        self
    }

    /// Set the coercion applied to values from every source.
    /// Defaults to [`Coerce::identity`].
    pub fn coerce(mut self, coerce: Coerce) -> Self {
        self.coerce.replace(coerce);
        self
    }

    /// Read a value from this environment variable when present.
    pub fn envvar(mut self, name: impl Into<String>) -> Self {
        self.envvar.replace(name.into());
        self
    }

    /// Read a value from this path of the configuration object when present.
    ///
    /// ### Example
    /// ```
    /// # use tierarg_builder as tierarg;
    /// use tierarg::ArgumentSpec;
    ///
    /// // Equivalent.
    /// ArgumentSpec::new(["--barg"]).config_path("args/barg");
    /// ArgumentSpec::new(["--barg"]).config_path(vec!["args", "barg"]);
    /// ```
    pub fn config_path(mut self, path: impl Into<ConfigPath>) -> Self {
        self.config_path.replace(path.into());
        self
    }

    /// Place this argument under a titled section of the help.
    pub fn group(mut self, title: impl Into<String>) -> Self {
        self.group.replace(title.into());
        self
    }

    /// Make this argument mutually exclusive with every other argument of the same id.
    ///
    /// All members must agree on `required`, `global` and `group`.
    pub fn mutex_group(mut self, id: impl ToString) -> Self {
        self.mutex_group.replace(id.to_string());
        self
    }

    /// Make this option available to every sub-command.
    /// Only options of the root command may be global.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Alias of [`ArgumentSpec::global`].
    pub fn shared(self) -> Self {
        self.global()
    }

    /// Declare whether the tokenizer requires this argument on the Cli.
    pub fn required(mut self, required: bool) -> Self {
        self.required.replace(required);
        self
    }

    /// Set the cardinality of values.
    pub fn nargs(mut self, nargs: Nargs) -> Self {
        self.nargs.replace(nargs);
        self
    }

    /// Set the tokenizer action.
    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Set the value of an `Nargs::Optional` option which is present without a value.
    pub fn constant(mut self, value: impl Into<Value>) -> Self {
        self.constant.replace(value.into());
        self
    }

    /// Document the placeholder name for this argument's values.
    pub fn metavar(mut self, name: impl Into<String>) -> Self {
        self.metavar.replace(name.into());
        self
    }

    /// Restrict the Cli values to these choices.
    /// See also [`Choices::choice`] to document them.
    pub fn choices<S: Into<String>>(mut self, choices: impl IntoIterator<Item = S>) -> Self {
        for choice in choices {
            self.upsert_choice(choice.into(), None);
        }
        self
    }

    /// Append `(default: ..)` to the help message.
    pub fn show_default(mut self) -> Self {
        self.show_default = true;
        self
    }

    /// Hide this argument from the help.
    pub fn hide(mut self) -> Self {
        self.hidden = true;
        self
    }

    fn upsert_choice(&mut self, variant: String, description: Option<String>) {
        match self.choices.iter_mut().find(|(v, _)| v == &variant) {
            Some((_, existing)) => {
                if description.is_some() {
                    *existing = description;
                }
            }
            None => self.choices.push((variant, description)),
        }
    }
}

impl<T: std::fmt::Display> Choices<T> for ArgumentSpec {
    /// Document (and allow) a choice for this argument.
    /// If repeated for the same `variant`, only the final message will apply.
    ///
    /// ### Example
    /// ```
    /// # use tierarg_builder as tierarg;
    /// use tierarg::{prelude::*, ArgumentSpec};
    ///
    /// ArgumentSpec::new(["--level"])
    ///     .choice("low", "--this will get discarded--")
    ///     .choice("low", "Be gentle.")
    ///     .choice("high", "Be thorough.");
    /// ```
    fn choice(mut self, variant: T, description: impl Into<String>) -> Self {
        self.upsert_choice(variant.to_string(), Some(description.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder() {
        let spec = ArgumentSpec::new(["-a", "--arg"])
            .help("abc")
            .help("def")
            .default("x")
            .envvar("ARG")
            .config_path("args/arg")
            .group("G")
            .mutex_group(1)
            .required(false)
            .nargs(Nargs::Optional)
            .constant(3)
            .metavar("VALUE")
            .show_default()
            .hide()
            .shared();

        assert_eq!(spec.names, vec!["-a", "--arg"]);
        assert_eq!(spec.help, Some("def".to_string()));
        assert_eq!(spec.default, Some(json!("x")));
        assert_eq!(spec.envvar, Some("ARG".to_string()));
        assert_eq!(spec.config_path, Some(ConfigPath::from("args/arg")));
        assert_eq!(spec.group, Some("G".to_string()));
        assert_eq!(spec.mutex_group, Some("1".to_string()));
        assert_eq!(spec.required, Some(false));
        assert_eq!(spec.nargs, Some(Nargs::Optional));
        assert_eq!(spec.constant, Some(json!(3)));
        assert_eq!(spec.metavar, Some("VALUE".to_string()));
        assert!(spec.show_default);
        assert!(spec.hidden);
        assert!(spec.global);
        assert_eq!(spec.action, Action::Store);
    }

    #[test]
    fn new_without_default() {
        let spec = ArgumentSpec::new(["item"]);

        assert_eq!(spec.names, vec!["item"]);
        assert_eq!(spec.default, None);
        assert_eq!(spec.help, None);
        assert_eq!(spec.required, None);
        assert!(spec.choices.is_empty());
        assert!(!spec.global);
        assert_eq!(spec.action, Action::Store);
        assert_eq!(ArgumentSpec::new(["item"]).default(json!([1, 2])).default, Some(json!([1, 2])));
    }

    #[test]
    fn choices() {
        let spec = ArgumentSpec::new(["--level"])
            .choices(["low", "mid"])
            .choice("low", "--this will get discarded--")
            .choice("low", "Be gentle.")
            .choice(3, "Three.")
            .choices(["low"]);

        assert_eq!(
            spec.choices,
            vec![
                ("low".to_string(), Some("Be gentle.".to_string())),
                ("mid".to_string(), None),
                ("3".to_string(), Some("Three.".to_string())),
            ]
        );
    }
}
