use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::rc::Rc;

use serde_json::{Map, Value};

#[cfg(feature = "tracing_debug")]
use tracing::debug;

use crate::api::{ArgumentSpec, CommandSpec};
use crate::data::{ArgumentData, Source};
use crate::dispatch::{CallbackChain, Parsed};
use crate::parser::{
    CommandTree, ConfigError, ConsoleInterface, Middleware, NodeId, RawParse, ResolveError,
    UserInterface,
};
use crate::resolve::{kind_of, Resolver};

/// The root of a declarative command line.
///
/// Holds the command tree, which may be extended between parses, and produces a [`Parsed`] per parse.
///
/// ### Example
/// ```
/// # use tierarg_builder as tierarg;
/// use tierarg::{ArgumentSpec, CommandSpec, Sarge};
/// use serde_json::json;
///
/// let sarge: Sarge = Sarge::new(
///     CommandSpec::new()
///         .arguments([ArgumentSpec::new(["--name"]).default("world").config_path("greeting/name")]),
/// )
/// .unwrap();
///
/// let parsed = sarge.parse_tokens(&[]).unwrap();
/// assert_eq!(parsed.get("name"), Some(&json!("world")));
///
/// let parsed = sarge
///     .parse_tokens_with_config(&[], |_| Some(json!({"greeting": {"name": "you"}})))
///     .unwrap();
/// assert_eq!(parsed.get("name"), Some(&json!("you")));
/// ```
pub struct Sarge<T = ()> {
    tree: CommandTree<T>,
    precedence: Option<Vec<Source>>,
    user_interface: Rc<dyn UserInterface>,
}

impl<T> std::fmt::Debug for Sarge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sarge")
            .field("tree", &self.tree)
            .field("precedence", &self.precedence)
            .finish()
    }
}

impl<T: 'static> Sarge<T> {
    /// Build the command tree from the root definition.
    ///
    /// Every part of the definition is validated here, including the `precedence`.
    pub fn new(spec: CommandSpec<T>) -> Result<Self, ConfigError> {
        let precedence = spec.precedence.clone();
        ArgumentData::with_precedence(precedence.as_deref())?;
        let tree = CommandTree::new(spec)?;

        Ok(Self {
            tree,
            precedence,
            user_interface: Rc::new(ConsoleInterface::default()),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_interface(mut self, user_interface: Rc<dyn UserInterface>) -> Self {
        self.user_interface = user_interface;
        self
    }

    /// The id of the root command.
    pub fn root_id(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Add arguments to the root command.
    /// Nothing is added when any of them is invalid.
    pub fn add_arguments(
        &mut self,
        arguments: impl IntoIterator<Item = ArgumentSpec>,
    ) -> Result<(), ConfigError> {
        self.tree.register_arguments(NodeId::ROOT, arguments)
    }

    /// Add a subcommand to the root command, producing its id.
    pub fn add_subcommand(&mut self, subcommand: CommandSpec<T>) -> Result<NodeId, ConfigError> {
        self.tree.register_subcommand(NodeId::ROOT, subcommand)
    }

    /// Add subcommands to the root command, producing their ids.
    /// Stops at the first invalid subcommand, keeping the ones before it.
    pub fn add_subcommands(
        &mut self,
        subcommands: impl IntoIterator<Item = CommandSpec<T>>,
    ) -> Result<Vec<NodeId>, ConfigError> {
        subcommands
            .into_iter()
            .map(|subcommand| self.add_subcommand(subcommand))
            .collect()
    }

    /// Add static defaults to the root command.
    pub fn add_defaults<K: Into<String>, V: Into<Value>>(
        &mut self,
        defaults: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), ConfigError> {
        self.tree.add_defaults(NodeId::ROOT, to_map(defaults))
    }

    /// Describe the groups of the root command.
    pub fn add_group_descriptions<K: Into<String>, V: Into<String>>(
        &mut self,
        descriptions: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), ConfigError> {
        self.tree
            .add_group_descriptions(NodeId::ROOT, to_descriptions(descriptions))
    }

    /// Access a command of the tree, to extend it.
    ///
    /// ### Example
    /// ```
    /// # use tierarg_builder as tierarg;
    /// use tierarg::{ArgumentSpec, CommandSpec, Sarge};
    ///
    /// let mut sarge: Sarge = Sarge::new(CommandSpec::new()).unwrap();
    /// let id = sarge.add_subcommand(CommandSpec::subcommand("run")).unwrap();
    /// sarge
    ///     .command_mut(id)
    ///     .unwrap()
    ///     .add_arguments([ArgumentSpec::new(["--fast"])])
    ///     .unwrap();
    /// ```
    pub fn command_mut(&mut self, id: NodeId) -> Option<CommandMut<'_, T>> {
        self.tree.node(id)?;
        Some(CommandMut {
            tree: &mut self.tree,
            id,
        })
    }

    /// The order of the configurable sources, when not the default.
    pub fn precedence(&self) -> Option<&[Source]> {
        self.precedence.as_deref()
    }

    /// Change the order of the configurable sources for the subsequent parses.
    /// See [`ArgumentData::set_precedence`].
    pub fn set_precedence(&mut self, order: Option<&[Source]>) -> Result<(), ConfigError> {
        ArgumentData::with_precedence(order)?;
        self.precedence = order.map(<[Source]>::to_vec);
        Ok(())
    }

    /// Check the whole tree.
    /// Registration already checks each addition, so this only fails when the tree was left inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tree.validate()
    }

    /// Parse `tokens` (excluding the program name), without a configuration.
    ///
    /// Help requests produce `Err(0)`, usage errors `Err(2)`, after printing to standard error.
    pub fn parse_tokens(&self, tokens: &[&str]) -> Result<Parsed<T>, i32> {
        self.parse_tokens_with_config(tokens, |_| None)
    }

    /// Parse `tokens` (excluding the program name).
    ///
    /// `read_config` is called once, with everything resolved so far.
    /// It either returns the configuration mapping, or writes into the
    /// [`Source::Configuration`] bucket itself and returns `None`.
    ///
    /// Help requests produce `Err(0)`, usage errors `Err(2)`, after printing to standard error.
    /// A `read_config` producing something other than a mapping is `Err(1)`.
    pub fn parse_tokens_with_config<F>(&self, tokens: &[&str], read_config: F) -> Result<Parsed<T>, i32>
    where
        F: FnOnce(&mut ArgumentData) -> Option<Value>,
    {
        let mut data = ArgumentData::with_precedence(self.precedence.as_deref())
            .and_then(|data| self.tree.validate().map(|_| data))
            .map_err(|error| {
                self.user_interface.print_error(error.to_string());
                1
            })?;
        let RawParse {
            cli,
            node_defaults,
            invoked,
            parser_data,
        } = Middleware::new(&self.tree, default_prog()).tokenize(tokens, &*self.user_interface)?;
        let usage = parser_data
            .last()
            .map(|parser| parser.usage.clone())
            .unwrap_or_default();

        *data.bucket_mut(Source::Cli) = cli;
        let resolver = Resolver::new(&self.tree, invoked);
        resolver.strip_unset_from_cli(&mut data);
        resolver.move_node_level_defaults(&mut data, node_defaults);
        resolver
            .resolve_env_and_defaults(&mut data)
            .map_err(|error| self.fail(error, &usage))?;

        match read_config(&mut data) {
            Some(config @ Value::Object(_)) => resolver
                .resolve_config(&mut data, &config)
                .map_err(|error| self.fail(error, &usage))?,
            Some(other) => return Err(self.fail(ResolveError::InvalidConfig(kind_of(&other)), &usage)),
            None => {}
        }

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Resolved {:?}.", data.to_map());
        }

        let chain = CallbackChain::build(&self.tree, resolver.invoked(), parser_data);
        Ok(Parsed::new(data, chain, self.user_interface.clone()))
    }

    /// Parse the Cli [`env::args`], without a configuration.
    ///
    /// Exits the program (via [`std::process::exit`]) on help requests and usage errors.
    pub fn parse(&self) -> Parsed<T> {
        self.parse_with_config(|_| None)
    }

    /// Parse the Cli [`env::args`].
    /// See [`Sarge::parse_tokens_with_config`].
    ///
    /// Exits the program (via [`std::process::exit`]) on help requests and usage errors.
    pub fn parse_with_config<F>(&self, read_config: F) -> Parsed<T>
    where
        F: FnOnce(&mut ArgumentData) -> Option<Value>,
    {
        let command_input: Vec<String> = env::args().skip(1).collect();

        match self.parse_tokens_with_config(
            command_input
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<&str>>()
                .as_slice(),
            read_config,
        ) {
            Ok(parsed) => parsed,
            Err(exit_code) => std::process::exit(exit_code),
        }
    }

    fn fail(&self, error: ResolveError, usage: &str) -> i32 {
        self.user_interface
            .print_error(format!("error: {error}\n\n{usage}"));
        error.exit_code()
    }
}

/// Mutable access to one command of a [`Sarge`] tree.
pub struct CommandMut<'a, T> {
    tree: &'a mut CommandTree<T>,
    id: NodeId,
}

impl<'a, T: 'static> CommandMut<'a, T> {
    /// The id of this command.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Add arguments to this command.
    /// Nothing is added when any of them is invalid.
    pub fn add_arguments(
        &mut self,
        arguments: impl IntoIterator<Item = ArgumentSpec>,
    ) -> Result<(), ConfigError> {
        self.tree.register_arguments(self.id, arguments)
    }

    /// Add a subcommand to this command, producing its id.
    pub fn add_subcommand(&mut self, subcommand: CommandSpec<T>) -> Result<NodeId, ConfigError> {
        self.tree.register_subcommand(self.id, subcommand)
    }

    /// Add subcommands to this command, producing their ids.
    pub fn add_subcommands(
        &mut self,
        subcommands: impl IntoIterator<Item = CommandSpec<T>>,
    ) -> Result<Vec<NodeId>, ConfigError> {
        subcommands
            .into_iter()
            .map(|subcommand| self.add_subcommand(subcommand))
            .collect()
    }

    /// Add static defaults to this command.
    pub fn add_defaults<K: Into<String>, V: Into<Value>>(
        &mut self,
        defaults: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), ConfigError> {
        self.tree.add_defaults(self.id, to_map(defaults))
    }

    /// Describe the groups of this command.
    pub fn add_group_descriptions<K: Into<String>, V: Into<String>>(
        &mut self,
        descriptions: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), ConfigError> {
        self.tree
            .add_group_descriptions(self.id, to_descriptions(descriptions))
    }
}

fn to_map<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

fn to_descriptions<K: Into<String>, V: Into<String>>(
    pairs: impl IntoIterator<Item = (K, V)>,
) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// The file name of the running executable.
fn default_prog() -> String {
    env::args_os()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::stop;
    use crate::model::{Action, Coerce};
    use crate::parser::util::channel_interface;
    use crate::test::assert_contains;
    use rstest::rstest;
    use serde_json::json;

    fn quiet<T>() -> CommandSpec<T> {
        CommandSpec::new().show_warnings(false).prog("program")
    }

    #[test]
    fn empty_parse() {
        // Setup
        let sarge: Sarge = Sarge::new(quiet()).unwrap();

        // Execute
        let parsed = sarge.parse_tokens(&[]).unwrap();

        // Verify
        assert_eq!(parsed.data().to_map(), Map::default());
        assert_eq!(parsed.callbacks(), vec![NodeId::ROOT]);
    }

    #[rstest]
    #[case(vec![Source::Cli, Source::Environment, Source::Configuration])]
    #[case(vec![Source::Environment, Source::Cli, Source::Configuration, Source::Defaults, Source::ArgDefault])]
    #[case(vec![Source::Cli, Source::Cli, Source::Configuration, Source::Defaults])]
    fn new_invalid_precedence(#[case] order: Vec<Source>) {
        // Execute
        let result = Sarge::<()>::new(quiet().precedence(order));

        // Verify
        let error = result.unwrap_err();
        assert_contains!(error.message(), "[cli, environment, configuration, defaults]");
    }

    #[rstest]
    #[case(vec!["--c", "cli"], json!("cli"), Source::Cli)]
    #[case(vec![], json!("config"), Source::Configuration)]
    fn parse_precedence(#[case] tokens: Vec<&str>, #[case] expected: Value, #[case] expected_source: Source) {
        // Setup
        let sarge: Sarge = Sarge::new(quiet().arguments([
            ArgumentSpec::new(["--c"]).default("default").config_path("c"),
        ]))
        .unwrap();

        // Execute
        let parsed = sarge
            .parse_tokens_with_config(&tokens, |_| Some(json!({"c": "config"})))
            .unwrap();

        // Verify
        assert_eq!(parsed.get("c"), Some(&expected));
        assert_eq!(parsed.data().source_of("c"), Some(expected_source));
    }

    #[test]
    fn set_precedence() {
        // Setup
        let mut sarge: Sarge = Sarge::new(quiet().arguments([
            ArgumentSpec::new(["--c"]).default("default").config_path("c"),
        ]))
        .unwrap();

        // Execute
        sarge
            .set_precedence(Some(&[Source::Cli, Source::Environment, Source::Defaults, Source::Configuration]))
            .unwrap();
        let parsed = sarge
            .parse_tokens_with_config(&[], |_| Some(json!({"c": "config"})))
            .unwrap();

        // Verify
        assert_eq!(parsed.get("c"), Some(&json!("default")));
        assert_eq!(
            sarge.precedence(),
            Some(&[Source::Cli, Source::Environment, Source::Defaults, Source::Configuration][..])
        );
        assert_matches!(sarge.set_precedence(Some(&[Source::Cli])), Err(ConfigError(_)));
        sarge.set_precedence(None).unwrap();
        assert_eq!(sarge.precedence(), None);
    }

    #[test]
    fn parse_read_config_sees_resolved() {
        // Setup
        let sarge: Sarge = Sarge::new(quiet().arguments([
            ArgumentSpec::new(["--config-file"]).default("app.json"),
            ArgumentSpec::new(["--level"]).coerce(Coerce::integer()),
        ]))
        .unwrap();

        // Execute
        let parsed = sarge
            .parse_tokens_with_config(&["--config-file", "other.json"], |data| {
                let file = data.get("config_file").cloned().unwrap_or_default();
                data.bucket_mut(Source::Configuration)
                    .insert("level".to_string(), Some(json!(3)));
                data.bucket_mut(Source::Configuration)
                    .insert("file".to_string(), Some(file));
                None
            })
            .unwrap();

        // Verify
        assert_eq!(parsed.get("level"), Some(&json!(3)));
        assert_eq!(parsed.get("file"), Some(&json!("other.json")));
    }

    #[rstest]
    #[case(json!([1]), 1, "a list")]
    #[case(json!("x"), 1, "a string")]
    #[case(json!({"level": "high"}), 2, "configuration path 'level'")]
    fn parse_read_config_invalid(#[case] config: Value, #[case] expected_code: i32, #[case] expected: &str) {
        // Setup
        let (sender, receiver) = channel_interface();
        let sarge: Sarge = Sarge::new(quiet().arguments([
            ArgumentSpec::new(["--level"]).coerce(Coerce::integer()).config_path("level"),
        ]))
        .unwrap()
        .with_interface(Rc::new(sender));

        // Execute
        let result = sarge
            .parse_tokens_with_config(&[], |_| Some(config))
            .map(|_| ());
        drop(sarge);

        // Verify
        assert_eq!(result, Err(expected_code));
        let (help, error) = receiver.consume();
        assert_eq!(help, None);
        let error = error.unwrap();
        assert_contains!(error, expected);
        assert_contains!(error, "Usage: program");
    }

    #[test]
    fn parse_environment_invalid() {
        // Setup
        env::set_var("TIERARG_TEST_CORE_LEVEL", "high");
        let (sender, receiver) = channel_interface();
        let sarge: Sarge = Sarge::new(quiet().arguments([
            ArgumentSpec::new(["--level"]).coerce(Coerce::integer()).envvar("TIERARG_TEST_CORE_LEVEL"),
        ]))
        .unwrap()
        .with_interface(Rc::new(sender));

        // Execute
        let result = sarge.parse_tokens(&[]);
        let code = result.map(|_| ()).unwrap_err();
        drop(sarge);

        // Verify
        assert_eq!(code, 2);
        let (_, error) = receiver.consume();
        let error = error.unwrap();
        assert_contains!(error, "TIERARG_TEST_CORE_LEVEL");
    }

    #[rstest]
    #[case(vec!["--help"], 0)]
    #[case(vec!["--unknown"], 2)]
    fn parse_exit(#[case] tokens: Vec<&str>, #[case] expected: i32) {
        // Setup
        let (sender, receiver) = channel_interface();
        let sarge: Sarge = Sarge::new(quiet().description("Does things."))
            .unwrap()
            .with_interface(Rc::new(sender));

        // Execute
        let result = sarge.parse_tokens(&tokens).map(|_| ());
        drop(sarge);

        // Verify
        assert_eq!(result, Err(expected));
        let (help, error) = receiver.consume();
        assert_eq!(help.is_some(), expected == 0);
        assert_eq!(error.is_some(), expected != 0);
    }

    #[test]
    fn parse_subcommand_filtering() {
        // Setup
        let sarge: Sarge = Sarge::new(
            quiet()
                .arguments([ArgumentSpec::new(["--arg1"]).default("A1")])
                .subcommands([
                    CommandSpec::subcommand("sub").arguments([ArgumentSpec::new(["--in-sub"]).default("S")]),
                    CommandSpec::subcommand("other")
                        .arguments([ArgumentSpec::new(["--in-other"]).default("O")])
                        .defaults([("other_default", 1)]),
                ]),
        )
        .unwrap();

        // Execute
        let parsed = sarge.parse_tokens(&["sub"]).unwrap();

        // Verify
        assert_eq!(parsed.callbacks(), vec![NodeId(0), NodeId(1)]);
        assert_eq!(
            Value::Object(parsed.data().to_map()),
            json!({"arg1": "A1", "in_sub": "S"})
        );
        assert!(!parsed.data().contains_key("in_other"));
        assert!(!parsed.data().contains_key("other_default"));
    }

    #[test]
    fn parse_idempotent() {
        // Setup
        let sarge: Sarge = Sarge::new(quiet().arguments([
            ArgumentSpec::new(["--a"]).default(1),
            ArgumentSpec::new(["--b"]).action(Action::Count),
        ]))
        .unwrap();

        // Execute
        let first = sarge.parse_tokens(&["--b", "--b"]).unwrap().into_data();
        let second = sarge.parse_tokens(&["--b", "--b"]).unwrap().into_data();

        // Verify
        assert_eq!(first.to_map(), second.to_map());
        assert_eq!(first, second);
    }

    #[test]
    fn extend_between_parses() {
        // Setup
        let mut sarge: Sarge = Sarge::new(quiet()).unwrap();
        let before = sarge.parse_tokens(&[]).unwrap();

        // Execute
        sarge.add_arguments([ArgumentSpec::new(["--x"]).default("x")]).unwrap();
        sarge.add_defaults([("d", 4)]).unwrap();
        sarge.add_group_descriptions([("G", "g")]).unwrap();
        let ids = sarge
            .add_subcommands([CommandSpec::subcommand("a"), CommandSpec::subcommand("b")])
            .unwrap();
        let mut command = sarge.command_mut(ids[1]).unwrap();
        command.add_arguments([ArgumentSpec::new(["--y"]).default("y")]).unwrap();
        command.add_defaults([("e", 5)]).unwrap();
        let nested = command.add_subcommand(CommandSpec::subcommand("c")).unwrap();
        let after = sarge.parse_tokens(&["b", "c"]).unwrap();

        // Verify
        assert_eq!(before.data().to_map(), Map::default());
        assert_eq!(ids, vec![NodeId(1), NodeId(2)]);
        assert_eq!(nested, NodeId(3));
        assert_eq!(
            Value::Object(after.data().to_map()),
            json!({"d": 4, "e": 5, "x": "x", "y": "y"})
        );
        assert_eq!(after.callbacks(), vec![NodeId(0), NodeId(2), NodeId(3)]);
        assert!(sarge.command_mut(NodeId(9)).is_none());
        sarge.validate().unwrap();
    }

    #[test]
    fn extend_invalid() {
        // Setup
        let mut sarge: Sarge = Sarge::new(quiet().arguments([ArgumentSpec::new(["--x"])])).unwrap();

        // Execute
        let arguments = sarge.add_arguments([ArgumentSpec::new(["--y"]), ArgumentSpec::new(["--x"])]);
        let subcommand = sarge.add_subcommand(CommandSpec::new());

        // Verify
        assert_matches!(arguments, Err(ConfigError(message)) => {
            assert_contains!(message, "Conflicting");
        });
        assert_matches!(subcommand, Err(ConfigError(_)));
        let parsed = sarge.parse_tokens(&["--x", "1"]).unwrap();
        assert_eq!(parsed.data().keys(), ["x"].into_iter().collect());
    }

    #[test]
    fn parse_then_dispatch() {
        // Setup
        let sarge: Sarge<Vec<String>> = Sarge::new(
            quiet::<Vec<String>>()
                .arguments([ArgumentSpec::new(["--name"]).default("n")])
                .callback(|ctx| {
                    ctx.obj.push(format!("root {}", ctx.parser.prog));
                })
                .subcommands([CommandSpec::<Vec<String>>::subcommand("go").callback(|ctx| {
                    ctx.obj.push(format!("go {}", ctx.parser.prog));
                    stop(ctx.data.get("name").cloned().unwrap_or_default())
                })]),
        )
        .unwrap();
        let mut parsed = sarge.parse_tokens(&["go"]).unwrap();
        let mut trace = Vec::default();

        // Execute
        let result = parsed.try_dispatch(&mut trace);

        // Verify
        assert_eq!(result, Ok(Some(json!("n"))));
        assert_eq!(trace, vec!["root program", "go program go"]);
    }

    #[test]
    fn default_prog_present() {
        assert!(!default_prog().is_empty());
    }
}
