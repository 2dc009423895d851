use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::api::ArgumentSpec;
use crate::data::Source;
use crate::dispatch::{Callback, Context, Flow};
use crate::model::ArgumentDefault;
use crate::parser::NodeSettings;

/// The declarative definition of a command: the root, or (via [`CommandSpec::subcommand`]) a subcommand.
///
/// `T` is the type of the object handed to the callbacks at dispatch time.
///
/// ### Example
/// ```
/// # use tierarg_builder as tierarg;
/// use tierarg::{ArgumentSpec, CommandSpec, Sarge};
///
/// let sarge: Sarge = Sarge::new(
///     CommandSpec::new()
///         .description("My program that does awesome stuff.")
///         .arguments([ArgumentSpec::new(["--verbose"]).help("Talk more.")])
///         .subcommands([CommandSpec::subcommand("run").help("Run it.")]),
/// )
/// .unwrap();
/// # let _ = sarge;
/// ```
pub struct CommandSpec<T = ()> {
    pub(crate) settings: NodeSettings,
    pub(crate) arguments: Vec<ArgumentSpec>,
    pub(crate) subcommands: Vec<CommandSpec<T>>,
    pub(crate) callback: Option<Callback<T>>,
    pub(crate) print_help_and_exit_if_last: bool,
    pub(crate) defaults: Map<String, Value>,
    pub(crate) group_descriptions: BTreeMap<String, String>,
    pub(crate) help_subcommand: Option<bool>,
    pub(crate) precedence: Option<Vec<Source>>,
    pub(crate) show_warnings: Option<bool>,
}

impl<T> std::fmt::Debug for CommandSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("settings", &self.settings)
            .field("arguments", &self.arguments)
            .field("subcommands", &self.subcommands)
            .field("callback", &self.callback)
            .finish()
    }
}

impl<T> Default for CommandSpec<T> {
    fn default() -> Self {
        Self {
            settings: NodeSettings::default(),
            arguments: Vec::default(),
            subcommands: Vec::default(),
            callback: None,
            print_help_and_exit_if_last: false,
            defaults: Map::default(),
            group_descriptions: BTreeMap::default(),
            help_subcommand: None,
            precedence: None,
            show_warnings: None,
        }
    }
}

impl<T> CommandSpec<T> {
    /// Create the definition of a root command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the definition of a subcommand, invoked by `name` on the Cli.
    pub fn subcommand(name: impl Into<String>) -> Self {
        let mut spec = Self::default();
        spec.settings.name.replace(name.into());
        spec
    }

    /// Set the program name shown in the help and usage.
    /// Defaults to the file name of the running executable.
    /// Root only.
    pub fn prog(mut self, prog: impl Into<String>) -> Self {
        self.settings.prog.replace(prog.into());
        self
    }

    /// Document this command in full sentence/paragraph format.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.settings.description.replace(description.into());
        self
    }

    /// Document this subcommand in the listing of its parent.
    /// Subcommands only.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.settings.help.replace(help.into());
        self
    }

    /// List the usage of this subcommand in the description of its parent.
    /// Subcommands only.
    pub fn add_usage_to_parent_command_desc(mut self) -> Self {
        self.settings.add_usage_to_parent_command_desc = true;
        self
    }

    /// Text shown after the arguments in the help.
    pub fn epilog(mut self, epilog: impl Into<String>) -> Self {
        self.settings.epilog.replace(epilog.into());
        self
    }

    /// Alternative names of this subcommand.
    /// Subcommands only.
    pub fn aliases<S: Into<String>>(mut self, aliases: impl IntoIterator<Item = S>) -> Self {
        self.settings
            .aliases
            .extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Whether to offer `-h`/`--help`.
    /// Defaults to `true`.
    pub fn add_help(mut self, add_help: bool) -> Self {
        self.settings.add_help = add_help;
        self
    }

    /// What to record for the arguments of this command which no source supplies.
    pub fn argument_default(mut self, argument_default: ArgumentDefault) -> Self {
        self.settings.argument_default = argument_default;
        self
    }

    /// The heading of the subcommand listing in the help.
    pub fn subcommand_title(mut self, title: impl Into<String>) -> Self {
        self.settings.subcommand_title = title.into();
        self
    }

    /// The placeholder for the subcommand in the usage.
    pub fn subcommand_metavar(mut self, metavar: impl Into<String>) -> Self {
        self.settings.subcommand_metavar = metavar.into();
        self
    }

    /// Add arguments to this command.
    pub fn arguments(mut self, arguments: impl IntoIterator<Item = ArgumentSpec>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    /// Add subcommands to this command.
    pub fn subcommands(mut self, subcommands: impl IntoIterator<Item = CommandSpec<T>>) -> Self {
        self.subcommands.extend(subcommands);
        self
    }

    /// Set the callback run when this command is on the invoked path.
    /// See [`Callback`] for what the closure may return.
    pub fn callback<F, R>(mut self, function: F) -> Self
    where
        T: 'static,
        F: Fn(&mut Context<'_, T>) -> R + 'static,
        R: Into<Flow> + 'static,
    {
        self.callback.replace(Callback::new(function));
        self
    }

    /// Print the help and exit with `0` when this is the most specific command invoked.
    /// Exclusive with [`CommandSpec::callback`].
    pub fn print_help_and_exit_if_last(mut self) -> Self {
        self.print_help_and_exit_if_last = true;
        self
    }

    /// Add static defaults, which need not belong to any argument.
    pub fn defaults<K: Into<String>, V: Into<Value>>(
        mut self,
        defaults: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.defaults
            .extend(defaults.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Describe the groups (see [`ArgumentSpec::group`]) of this command.
    pub fn group_descriptions<K: Into<String>, V: Into<String>>(
        mut self,
        descriptions: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.group_descriptions
            .extend(descriptions.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Whether to offer `help <subcommand>..` as a synonym of `<subcommand>.. --help`.
    /// Defaults to `true`.
    /// Root only.
    pub fn help_subcommand(mut self, enabled: bool) -> Self {
        self.help_subcommand.replace(enabled);
        self
    }

    /// Set the order of the four configurable sources.
    /// See [`ArgumentData::set_precedence`](crate::ArgumentData::set_precedence).
    /// Root only.
    pub fn precedence(mut self, order: impl IntoIterator<Item = Source>) -> Self {
        self.precedence.replace(order.into_iter().collect());
        self
    }

    /// Whether to log configuration smells (via `tracing::warn!`).
    /// Defaults to `true`.
    /// Root only.
    pub fn show_warnings(mut self, show_warnings: bool) -> Self {
        self.show_warnings.replace(show_warnings);
        self
    }
}
