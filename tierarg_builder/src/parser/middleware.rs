use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;

use clap::builder::{PossibleValue, TypedValueParser};
use clap::error::ErrorKind;
use clap::parser::{MatchesError, ValueSource};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use serde_json::{Map, Value};
use terminal_size::{terminal_size, Width};

#[cfg(feature = "tracing_debug")]
use tracing::debug;

use crate::data::Bucket;
use crate::dispatch::ParserData;
use crate::model::{Action, Coerce, Nargs};
use crate::parser::argument::{Argument, Schema};
use crate::parser::base::ConfigError;
use crate::parser::command::{CommandNode, CommandTree, Entry, NodeId};
use crate::parser::interface::UserInterface;
use crate::resolve::InvokedPath;

const MINIMUM_HELP_WIDTH: usize = 120;
const HELP_SUBCOMMAND: &str = "help";

/// What the tokenizer made of the Cli.
#[derive(Debug)]
pub(crate) struct RawParse {
    /// Every argument of the invoked nodes: `Some` when it appeared on the Cli, otherwise an unset placeholder.
    pub(crate) cli: Bucket,
    /// The node level defaults of the invoked nodes.
    pub(crate) node_defaults: BTreeMap<NodeId, Map<String, Value>>,
    pub(crate) invoked: InvokedPath,
    /// One per invoked node, in the same order.
    pub(crate) parser_data: Vec<ParserData>,
}

/// Translates a [`CommandTree`] into a `clap::Command`, and its matches back into tree terms.
pub(crate) struct Middleware<'t, T> {
    tree: &'t CommandTree<T>,
    prog: String,
}

impl<'t, T> Middleware<'t, T> {
    pub(crate) fn new(tree: &'t CommandTree<T>, prog: impl Into<String>) -> Self {
        Self {
            tree,
            prog: tree
                .root()
                .settings
                .prog
                .clone()
                .unwrap_or_else(|| prog.into()),
        }
    }

    pub(crate) fn build_command(&self) -> Result<Command, ConfigError> {
        let width = match terminal_size() {
            Some((Width(width), _)) => std::cmp::max(usize::from(width), MINIMUM_HELP_WIDTH),
            None => MINIMUM_HELP_WIDTH,
        };
        let mut command = self
            .build_node(self.tree.root(), &self.prog)?
            .no_binary_name(true)
            .bin_name(self.prog.clone())
            .term_width(width);

        if self.help_subcommand_enabled() {
            command = command.subcommand(
                Command::new(HELP_SUBCOMMAND).about("Print the help of the given subcommand(s)"),
            );
        }

        Ok(command)
    }

    /// Run the tokenizer over `tokens`.
    ///
    /// Help requests and usage errors are printed through the `user_interface`,
    /// producing the exit code instead.
    pub(crate) fn tokenize(
        &self,
        tokens: &[&str],
        user_interface: &dyn UserInterface,
    ) -> Result<RawParse, i32> {
        let mut command = self.build_command().map_err(|error| {
            user_interface.print_error(error.to_string());
            1
        })?;
        let tokens = self.rewrite_help_subcommand(tokens);

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Tokenizing {tokens:?}.");
        }

        let matches = match command.try_get_matches_from_mut(tokens.iter().copied()) {
            Ok(matches) => matches,
            Err(error) => {
                return Err(match error.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                        user_interface.print_help(error.render().to_string());
                        0
                    }
                    _ => {
                        user_interface.print_error(error.render().to_string());
                        2
                    }
                });
            }
        };

        let mut cli = Bucket::default();
        let mut node_defaults = BTreeMap::default();
        let mut path = Vec::default();
        let mut names: Vec<String> = Vec::default();
        let mut current = Some((self.tree.root(), &matches));

        while let Some((node, node_matches)) = current.take() {
            path.push(node.parser_key());
            node_defaults.insert(node.parser_key(), node.defaults.clone());

            for argument in &node.arguments {
                let value = read_value(node_matches, argument).map_err(|error| {
                    user_interface.print_error(format!("error: {error}"));
                    2
                })?;

                match value {
                    Some(value) => {
                        cli.insert(argument.dest.clone(), Some(value));
                    }
                    None => {
                        cli.entry(argument.dest.clone()).or_insert(None);
                    }
                }
            }

            if let Some((name, sub_matches)) = node_matches.subcommand() {
                current = self
                    .child_named(node, name)
                    .map(|child| (child, sub_matches));
                names.push(name.to_string());
            }
        }

        let parser_data = collect_parser_data(&mut command, &names);

        let violation = match self.missing_required_global(&matches) {
            Some(missing) => Some(format!(
                "error: the following required arguments were not provided:\n  {missing}"
            )),
            None => self.global_mutex_violation(&matches).map_err(|error| {
                user_interface.print_error(error.to_string());
                1
            })?,
        };

        if let Some(violation) = violation {
            let usage = parser_data
                .last()
                .map(|data| data.usage.clone())
                .unwrap_or_default();
            user_interface.print_error(format!("{violation}\n\n{usage}"));
            return Err(2);
        }

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Invoked {path:?} with Cli values {cli:?}.");
        }

        Ok(RawParse {
            cli,
            node_defaults,
            invoked: InvokedPath::new(path),
            parser_data,
        })
    }

    fn help_subcommand_enabled(&self) -> bool {
        let root = self.tree.root();
        self.tree.help_subcommand() && root.settings.add_help && !root.children.is_empty()
    }

    /// `help a b` reads as `a b --help`.
    fn rewrite_help_subcommand<'a>(&self, tokens: &[&'a str]) -> Vec<&'a str> {
        match tokens.split_first() {
            Some((&HELP_SUBCOMMAND, rest)) if self.help_subcommand_enabled() => {
                let mut rewritten = rest.to_vec();
                rewritten.push("--help");
                rewritten
            }
            _ => tokens.to_vec(),
        }
    }

    fn child_named(&self, node: &CommandNode<T>, name: &str) -> Option<&'t CommandNode<T>> {
        node.children
            .iter()
            .filter_map(|id| self.tree.node(*id))
            .find(|child| child.settings.name.as_deref() == Some(name))
    }

    /// The tokenizer cannot require a global argument, so it is checked here.
    fn missing_required_global(&self, matches: &ArgMatches) -> Option<String> {
        self.tree
            .root()
            .arguments
            .iter()
            .filter(|argument| argument.matches_schema(&Schema::global(true)) && argument.is_required())
            .find(|argument| !on_command_line(matches, argument))
            .map(display_name)
    }

    /// A mutex group of global arguments is not seen by the tokenizer once a subcommand
    /// is invoked, so both its exclusivity and its required-ness are checked here.
    fn global_mutex_violation(&self, matches: &ArgMatches) -> Result<Option<String>, ConfigError> {
        let entries = self
            .tree
            .compile_argument_list(NodeId::ROOT, &Schema::global(true))?;
        let mut mutexes = Vec::default();
        collect_mutexes(entries, &mut mutexes);

        for (required, members) in mutexes {
            let present: Vec<&Argument> = members
                .iter()
                .copied()
                .filter(|member| on_command_line(matches, member))
                .collect();

            match present[..] {
                [first, second, ..] => {
                    return Ok(Some(format!(
                        "error: the argument '{}' cannot be used with '{}'",
                        display_name(first),
                        display_name(second)
                    )));
                }
                [] if required => {
                    let names: Vec<String> = members.into_iter().map(display_name).collect();
                    return Ok(Some(format!(
                        "error: the following required arguments were not provided:\n  <{}>",
                        names.join("|")
                    )));
                }
                _ => {}
            }
        }

        Ok(None)
    }

    fn build_node(&self, node: &CommandNode<T>, bin_name: &str) -> Result<Command, ConfigError> {
        let settings = &node.settings;
        let name = match &settings.name {
            Some(name) => name.clone(),
            None => self.prog.clone(),
        };
        let mut children = Vec::default();
        let mut usages = Vec::default();

        for child in &node.children {
            if let Some(child) = self.tree.node(*child) {
                let child_bin_name = match &child.settings.name {
                    Some(child_name) => format!("{bin_name} {child_name}"),
                    None => bin_name.to_string(),
                };
                let subcommand = self.build_node(child, &child_bin_name)?;

                if child.settings.add_usage_to_parent_command_desc {
                    let usage = subcommand
                        .clone()
                        .bin_name(child_bin_name)
                        .render_usage()
                        .to_string();
                    let usage = usage.strip_prefix("Usage: ").unwrap_or(&usage).trim_end();
                    usages.push(format!("  {usage}"));
                }

                children.push(subcommand);
            }
        }

        let description = match (&settings.description, usages.is_empty()) {
            (description, true) => description.clone(),
            (Some(description), false) if !description.is_empty() => {
                Some(format!("{description}\n\nusage:\n{}", usages.join("\n")))
            }
            (_, false) => Some(format!("usage:\n{}", usages.join("\n"))),
        };
        let mut command = Command::new(name)
            .disable_help_subcommand(true)
            .disable_version_flag(true)
            .disable_help_flag(!settings.add_help)
            .args_override_self(true)
            .allow_negative_numbers(true)
            .subcommand_help_heading(settings.subcommand_title.clone())
            .subcommand_value_name(settings.subcommand_metavar.clone());

        if let Some(about) = settings.help.as_ref().or(description.as_ref()) {
            command = command.about(about.clone());
        }

        if let Some(description) = description {
            command = command.long_about(description);
        }

        if !settings.aliases.is_empty() {
            command = command.visible_aliases(settings.aliases.clone());
        }

        let positions: HashMap<&str, usize> = node
            .arguments
            .iter()
            .filter(|argument| argument.positional)
            .enumerate()
            .map(|(index, argument)| (argument.dest.as_str(), index + 1))
            .collect();
        let entries = self
            .tree
            .compile_argument_list(node.parser_key(), &Schema::default())?;
        let mut after_help: Vec<String> = Vec::default();
        collect_group_descriptions(&entries, &mut after_help);
        command = add_entries(command, entries, None, &positions);

        if let Some(epilog) = &settings.epilog {
            after_help.push(epilog.clone());
        }

        if !after_help.is_empty() {
            command = command.after_help(after_help.join("\n\n"));
        }

        Ok(command.subcommands(children))
    }
}

fn add_entries(
    command: Command,
    entries: Vec<Entry<'_>>,
    heading: Option<&str>,
    positions: &HashMap<&str, usize>,
) -> Command {
    entries
        .into_iter()
        .fold(command, |command, entry| match entry {
            Entry::Argument(argument) => command.arg(build_arg(argument, heading, positions, false)),
            Entry::Group { title, members, .. } => add_entries(command, members, Some(title), positions),
            Entry::Mutex {
                id,
                required,
                members,
            } => {
                let global = members.iter().any(|member| member.spec.global);
                let group = ArgGroup::new(format!("mutex:{id}"))
                    .args(members.iter().map(|member| member.dest.clone()))
                    .multiple(false)
                    .required(required);
                let command = members.into_iter().fold(command, |command, member| {
                    command.arg(build_arg(member, heading, positions, true))
                });

                // Global groups are checked by `global_mutex_violation`.
                if global {
                    command
                } else {
                    command.group(group)
                }
            }
        })
}

fn collect_mutexes<'a>(entries: Vec<Entry<'a>>, mutexes: &mut Vec<(bool, Vec<&'a Argument>)>) {
    for entry in entries {
        match entry {
            Entry::Argument(_) => {}
            Entry::Group { members, .. } => collect_mutexes(members, mutexes),
            Entry::Mutex { required, members, .. } => mutexes.push((required, members)),
        }
    }
}

fn on_command_line(matches: &ArgMatches, argument: &Argument) -> bool {
    matches.value_source(&argument.dest) == Some(ValueSource::CommandLine)
}

fn display_name(argument: &Argument) -> String {
    match (argument.longs.first(), argument.shorts.first()) {
        (Some(long), _) => format!("--{long}"),
        (None, Some(short)) => format!("-{short}"),
        (None, None) => argument.dest.clone(),
    }
}

fn collect_group_descriptions(entries: &[Entry<'_>], lines: &mut Vec<String>) {
    for entry in entries {
        if let Entry::Group {
            title,
            description,
            members,
        } = entry
        {
            if let Some(description) = description {
                lines.push(format!("{title}:\n  {description}"));
            }

            collect_group_descriptions(members, lines);
        }
    }
}

fn build_arg(
    argument: &Argument,
    heading: Option<&str>,
    positions: &HashMap<&str, usize>,
    in_mutex: bool,
) -> Arg {
    let spec = &argument.spec;
    let mut arg = Arg::new(argument.dest.clone())
        .hide(spec.hidden)
        .global(spec.global);

    if let Some(heading) = heading {
        arg = arg.help_heading(heading.to_string());
    }

    if let Some(help) = argument.help_text() {
        arg = arg.help(help);
    }

    if let Some(index) = positions.get(argument.dest.as_str()) {
        arg = arg.index(*index);
    }

    let mut longs = argument.longs.iter();

    if let Some(long) = longs.next() {
        arg = arg
            .long(long.clone())
            .visible_aliases(longs.cloned().collect::<Vec<String>>());
    }

    let mut shorts = argument.shorts.iter();

    if let Some(short) = shorts.next() {
        arg = arg
            .short(*short)
            .visible_short_aliases(shorts.copied().collect::<Vec<char>>());
    }

    // Required globals and mutex members are enforced outside of the argument itself.
    if !in_mutex && !spec.global {
        arg = arg.required(argument.is_required());
    }

    match &spec.action {
        Action::Store | Action::Append => {
            let value_name = match &spec.metavar {
                Some(metavar) => metavar.clone(),
                None if argument.positional => argument.dest.clone(),
                None => argument.dest.to_uppercase(),
            };
            let action = if spec.action == Action::Append {
                ArgAction::Append
            } else {
                ArgAction::Set
            };
            let arg = arg
                .action(action)
                .value_name(value_name)
                .value_parser(CoerceParser {
                    coerce: argument.coerce.clone(),
                    choices: spec.choices.clone(),
                });

            match argument.nargs() {
                Nargs::Precisely(n) => arg.num_args(usize::from(n)),
                Nargs::Optional => arg.num_args(0..=1),
                Nargs::Any => arg.num_args(0..),
                Nargs::AtLeastOne => arg.num_args(1..),
            }
        }
        Action::StoreTrue | Action::StoreFalse | Action::StoreConst(_) => arg.action(ArgAction::SetTrue),
        Action::Count => arg.action(ArgAction::Count),
    }
}

/// The value of `argument` when it appeared on the Cli.
fn read_value(matches: &ArgMatches, argument: &Argument) -> Result<Option<Value>, MatchesError> {
    let dest = argument.dest.as_str();

    if matches.value_source(dest) != Some(ValueSource::CommandLine) {
        return Ok(None);
    }

    let spec = &argument.spec;
    let nargs = argument.nargs();
    let missing = || spec.constant.clone().unwrap_or(Value::Null);

    let value = match &spec.action {
        Action::StoreTrue => Value::Bool(true),
        Action::StoreFalse => Value::Bool(false),
        Action::StoreConst(constant) => constant.clone(),
        Action::Count => Value::from(matches.try_get_one::<u8>(dest)?.copied().unwrap_or_default()),
        Action::Store if nargs.is_list() => Value::Array(
            matches
                .try_get_many::<Value>(dest)?
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        ),
        Action::Store => matches
            .try_get_one::<Value>(dest)?
            .cloned()
            .unwrap_or_else(missing),
        Action::Append => Value::Array(
            matches
                .try_get_occurrences::<Value>(dest)?
                .map(|occurrences| {
                    occurrences
                        .map(|occurrence| {
                            let values: Vec<Value> = occurrence.cloned().collect();

                            if nargs.is_list() {
                                Value::Array(values)
                            } else {
                                values.into_iter().next().unwrap_or_else(missing)
                            }
                        })
                        .collect()
                })
                .unwrap_or_default(),
        ),
    };

    Ok(Some(value))
}

fn collect_parser_data(command: &mut Command, names: &[String]) -> Vec<ParserData> {
    command.build();
    let mut parser_data = vec![parser_data_of(command)];
    let mut current = command;

    for name in names {
        let Some(next) = current.find_subcommand_mut(name) else {
            break;
        };

        parser_data.push(parser_data_of(next));
        current = next;
    }

    parser_data
}

fn parser_data_of(command: &mut Command) -> ParserData {
    ParserData {
        prog: command
            .get_bin_name()
            .unwrap_or_else(|| command.get_name())
            .to_string(),
        help: command.render_help().to_string(),
        usage: command.render_usage().to_string(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Applies the argument's coercion and choices to a Cli value.
#[derive(Clone)]
struct CoerceParser {
    coerce: Coerce,
    choices: Vec<(String, Option<String>)>,
}

impl TypedValueParser for CoerceParser {
    type Value = Value;

    fn parse_ref(
        &self,
        cmd: &Command,
        arg: Option<&Arg>,
        value: &OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let name = arg
            .map(ToString::to_string)
            .unwrap_or_else(|| "...".to_string());
        let raw = value
            .to_str()
            .ok_or_else(|| clap::Error::new(ErrorKind::InvalidUtf8).with_cmd(cmd))?;
        let coerced = self
            .coerce
            .apply(&Value::String(raw.to_string()))
            .map_err(|reason| {
                invalid_value(cmd, format!("invalid value '{raw}' for '{name}': {reason}"))
            })?;

        if !self.choices.is_empty() {
            let rendered = render(&coerced);

            if !self
                .choices
                .iter()
                .any(|(choice, _)| choice == raw || *choice == rendered)
            {
                let choices = self
                    .choices
                    .iter()
                    .map(|(choice, _)| format!("'{choice}'"))
                    .collect::<Vec<String>>()
                    .join(", ");
                return Err(invalid_value(
                    cmd,
                    format!("invalid choice '{raw}' for '{name}' (choose from {choices})"),
                ));
            }
        }

        Ok(coerced)
    }

    fn possible_values(&self) -> Option<Box<dyn Iterator<Item = PossibleValue> + '_>> {
        if self.choices.is_empty() {
            return None;
        }

        Some(Box::new(self.choices.iter().map(|(choice, description)| {
            let possible = PossibleValue::new(choice.clone());

            match description {
                Some(description) => possible.help(description.clone()),
                None => possible,
            }
        })))
    }
}

fn invalid_value(cmd: &Command, message: String) -> clap::Error {
    clap::Error::raw(ErrorKind::ValueValidation, format!("{message}\n")).with_cmd(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ArgumentSpec, CommandSpec};
    use crate::parser::util::InMemoryInterface;
    use crate::test::assert_contains;
    use rstest::rstest;
    use serde_json::json;

    fn quiet() -> CommandSpec {
        CommandSpec::new().show_warnings(false)
    }

    fn tokenize(tree: &CommandTree<()>, tokens: &[&str]) -> (Result<RawParse, i32>, InMemoryInterface) {
        let interface = InMemoryInterface::default();
        let result = Middleware::new(tree, "prog").tokenize(tokens, &interface);
        (result, interface)
    }

    fn cli_of(tree: &CommandTree<()>, tokens: &[&str]) -> Bucket {
        let (result, interface) = tokenize(tree, tokens);
        assert_eq!(interface.consume(), (None, None));
        result.unwrap().cli
    }

    #[test]
    fn tokenize_empty() {
        // Setup
        let tree = CommandTree::new(quiet().arguments([ArgumentSpec::new(["--port"])])).unwrap();

        // Execute
        let cli = cli_of(&tree, &[]);

        // Verify
        assert_eq!(cli, Bucket::from([("port".to_string(), None)]));
    }

    #[rstest]
    #[case(vec!["--port", "10"], json!(10))]
    #[case(vec!["--port=10"], json!(10))]
    #[case(vec!["-p", "10"], json!(10))]
    #[case(vec!["-p", "1", "--port", "2"], json!(2))]
    #[case(vec!["--listen", "-3"], json!(-3))]
    fn tokenize_store(#[case] tokens: Vec<&str>, #[case] expected: Value) {
        // Setup
        let tree = CommandTree::new(quiet().arguments([
            ArgumentSpec::new(["-p", "--port", "--listen"]).coerce(Coerce::integer()),
        ]))
        .unwrap();

        // Execute
        let cli = cli_of(&tree, &tokens);

        // Verify
        assert_eq!(cli, Bucket::from([("port".to_string(), Some(expected))]));
    }

    #[rstest]
    #[case(vec!["--yes"], "yes", json!(true))]
    #[case(vec!["--no"], "no", json!(false))]
    #[case(vec!["--mode"], "mode", json!("fast"))]
    #[case(vec!["-vvv"], "v", json!(3))]
    #[case(vec!["-v", "-v"], "v", json!(2))]
    fn tokenize_flags(#[case] tokens: Vec<&str>, #[case] dest: &str, #[case] expected: Value) {
        // Setup
        let tree = CommandTree::new(quiet().arguments([
            ArgumentSpec::new(["--yes"]).action(Action::StoreTrue),
            ArgumentSpec::new(["--no"]).action(Action::StoreFalse),
            ArgumentSpec::new(["--mode"]).action(Action::StoreConst(json!("fast"))),
            ArgumentSpec::new(["-v"]).action(Action::Count),
        ]))
        .unwrap();

        // Execute
        let cli = cli_of(&tree, &tokens);

        // Verify
        assert_eq!(cli.get(dest), Some(&Some(expected)));
        assert_eq!(cli.values().filter(|value| value.is_some()).count(), 1);
    }

    #[rstest]
    #[case(vec!["--pair", "1", "2"], "pair", json!([1, 2]))]
    #[case(vec!["--any"], "any", json!([]))]
    #[case(vec!["--any", "1", "2", "3"], "any", json!([1, 2, 3]))]
    #[case(vec!["--maybe"], "maybe", json!(9))]
    #[case(vec!["--maybe", "4"], "maybe", json!(4))]
    #[case(vec!["--many", "1", "--many", "2"], "many", json!([1, 2]))]
    #[case(vec!["--pairs", "1", "2", "--pairs", "3", "4"], "pairs", json!([[1, 2], [3, 4]]))]
    #[case(vec!["5", "6"], "rest", json!([5, 6]))]
    fn tokenize_nargs(#[case] tokens: Vec<&str>, #[case] dest: &str, #[case] expected: Value) {
        // Setup
        let tree = CommandTree::new(quiet().arguments([
            ArgumentSpec::new(["--pair"]).nargs(Nargs::Precisely(2)).coerce(Coerce::integer()),
            ArgumentSpec::new(["--any"]).nargs(Nargs::Any).coerce(Coerce::integer()),
            ArgumentSpec::new(["--maybe"]).nargs(Nargs::Optional).constant(9).coerce(Coerce::integer()),
            ArgumentSpec::new(["--many"]).action(Action::Append).coerce(Coerce::integer()),
            ArgumentSpec::new(["--pairs"])
                .action(Action::Append)
                .nargs(Nargs::Precisely(2))
                .coerce(Coerce::integer()),
            ArgumentSpec::new(["rest"]).nargs(Nargs::Any).coerce(Coerce::integer()),
        ]))
        .unwrap();

        // Execute
        let cli = cli_of(&tree, &tokens);

        // Verify
        assert_eq!(cli.get(dest), Some(&Some(expected)));
    }

    #[rstest]
    #[case(vec!["a", "--x", "1"], vec![NodeId(0), NodeId(1)], "prog a")]
    #[case(vec!["alpha", "--x", "1"], vec![NodeId(0), NodeId(1)], "prog a")]
    #[case(vec!["--top", "b", "c"], vec![NodeId(0), NodeId(2), NodeId(3)], "prog b c")]
    fn tokenize_subcommands(#[case] tokens: Vec<&str>, #[case] expected_path: Vec<NodeId>, #[case] expected_prog: &str) {
        // Setup
        let tree = CommandTree::new(
            quiet()
                .arguments([ArgumentSpec::new(["--top"]).action(Action::StoreTrue)])
                .defaults([("root_default", json!(1))])
                .subcommands([
                    CommandSpec::subcommand("a")
                        .aliases(["alpha"])
                        .arguments([ArgumentSpec::new(["--x"])]),
                    CommandSpec::subcommand("b")
                        .defaults([("b_default", json!(2))])
                        .subcommands([CommandSpec::subcommand("c")]),
                ]),
        )
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &tokens);

        // Verify
        assert_eq!(interface.consume(), (None, None));
        let raw = result.unwrap();
        assert_eq!(raw.invoked.iter().collect::<Vec<_>>(), expected_path);
        assert_eq!(raw.parser_data.len(), expected_path.len());
        assert_eq!(raw.parser_data[0].prog, "prog");
        assert_eq!(raw.parser_data.last().unwrap().prog, expected_prog);
        let usage = &raw.parser_data.last().unwrap().usage;
        assert_contains!(usage, expected_prog);
        assert_eq!(raw.node_defaults.len(), expected_path.len());
        assert_eq!(raw.node_defaults[&NodeId(0)], json!({"root_default": 1}).as_object().unwrap().clone());
        assert!(raw.cli.contains_key("top"));
        assert_eq!(raw.cli.contains_key("x"), expected_path.contains(&NodeId(1)));
    }

    #[test]
    fn tokenize_global() {
        // Setup
        let tree = CommandTree::new(
            quiet()
                .arguments([ArgumentSpec::new(["--verbose"]).action(Action::StoreTrue).global()])
                .subcommands([CommandSpec::subcommand("a")]),
        )
        .unwrap();

        // Execute
        let before = cli_of(&tree, &["--verbose", "a"]);
        let after = cli_of(&tree, &["a", "--verbose"]);
        let absent = cli_of(&tree, &["a"]);

        // Verify
        assert_eq!(before.get("verbose"), Some(&Some(json!(true))));
        assert_eq!(after.get("verbose"), Some(&Some(json!(true))));
        assert_eq!(absent.get("verbose"), Some(&None));
    }

    #[test]
    fn tokenize_global_required() {
        // Setup
        let tree = CommandTree::new(
            quiet()
                .arguments([ArgumentSpec::new(["--token"]).global().required(true)])
                .subcommands([CommandSpec::subcommand("a")]),
        )
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &["a"]);

        // Verify
        assert_matches!(result, Err(2));
        let (help, error) = interface.consume();
        assert_eq!(help, None);
        let error = error.unwrap();
        assert_contains!(error, "--token");
    }

    #[rstest]
    #[case(vec!["--help"])]
    #[case(vec!["-h"])]
    #[case(vec!["--port", "1", "--help"])]
    fn tokenize_help(#[case] tokens: Vec<&str>) {
        // Setup
        let tree = CommandTree::new(
            quiet()
                .description("A program.")
                .epilog("The end.")
                .arguments([
                    ArgumentSpec::new(["--port"]).help("The port.").group("Network"),
                    ArgumentSpec::new(["--mode"]).choices(["fast", "slow"]),
                    ArgumentSpec::new(["--level"]).default(3).show_default(),
                    ArgumentSpec::new(["--secret"]).hide(),
                ])
                .group_descriptions([("Network", "Where to listen.")]),
        )
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &tokens);

        // Verify
        assert_matches!(result, Err(0));
        let message = interface.consume_message();
        assert_contains!(message, "Usage: prog");
        assert_contains!(message, "A program.");
        assert_contains!(message, "Network:");
        assert_contains!(message, "--port <PORT>");
        assert_contains!(message, "The port.");
        assert_contains!(message, "Where to listen.");
        assert_contains!(message, "fast");
        assert_contains!(message, "(default: 3)");
        assert_contains!(message, "The end.");
        assert!(!message.contains("--secret"));
    }

    #[rstest]
    #[case(vec!["help"], "Usage: prog")]
    #[case(vec!["help", "a"], "Usage: prog a")]
    #[case(vec!["a", "--help"], "Usage: prog a")]
    fn tokenize_help_subcommand(#[case] tokens: Vec<&str>, #[case] expected: &str) {
        // Setup
        let tree = CommandTree::new(
            quiet().subcommands([CommandSpec::subcommand("a").help("The a command.")]),
        )
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &tokens);

        // Verify
        assert_matches!(result, Err(0));
        let message = interface.consume_message();
        assert_contains!(message, expected);
    }

    #[test]
    fn tokenize_help_subcommand_listed() {
        // Setup
        let tree = CommandTree::new(
            quiet()
                .subcommand_title("commands")
                .subcommands([CommandSpec::subcommand("a").help("The a command.")]),
        )
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &["--help"]);

        // Verify
        assert_matches!(result, Err(0));
        let message = interface.consume_message();
        assert_contains!(message, "commands:");
        assert_contains!(message, "The a command.");
        assert_contains!(message, "help");
    }

    #[rstest]
    #[case(Some("Top level."))]
    #[case(None)]
    fn tokenize_help_usage_in_parent(#[case] description: Option<&str>) {
        // Setup
        let mut root = quiet();

        if let Some(description) = description {
            root = root.description(description);
        }

        let tree = CommandTree::new(root.subcommands([
            CommandSpec::subcommand("a")
                .help("The a command.")
                .arguments([ArgumentSpec::new(["item"]).help("An item.")])
                .add_usage_to_parent_command_desc(),
            CommandSpec::subcommand("b").help("The b command."),
        ]))
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &["--help"]);

        // Verify
        assert_matches!(result, Err(0));
        let message = interface.consume_message();
        assert_contains!(message, "usage:\n");
        assert_contains!(message, "prog a");
        assert_contains!(message, "<item>");
        assert!(!message.contains("prog b"), "{message}");

        if let Some(description) = description {
            assert_contains!(message, &format!("{description}\n\nusage:"));
        }
    }

    #[rstest]
    #[case(vec!["--port", "http"], "invalid value 'http'")]
    #[case(vec!["--mode", "medium"], "invalid choice 'medium'")]
    #[case(vec!["--unknown"], "--unknown")]
    #[case(vec!["--left", "--right"], "--right")]
    #[case(vec![], "--left")]
    #[case(vec!["--left", "--port"], "--port")]
    fn tokenize_invalid(#[case] tokens: Vec<&str>, #[case] expected: &str) {
        // Setup
        let tree = CommandTree::new(quiet().arguments([
            ArgumentSpec::new(["--port"]).coerce(Coerce::integer()),
            ArgumentSpec::new(["--mode"]).choices(["fast", "slow"]),
            ArgumentSpec::new(["--left"]).action(Action::StoreTrue).mutex_group("side"),
            ArgumentSpec::new(["--right"]).action(Action::StoreTrue).mutex_group("side"),
        ]))
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &tokens);

        // Verify
        assert_matches!(result, Err(2));
        let (help, error) = interface.consume();
        assert_eq!(help, None);
        let error = error.unwrap();
        assert_contains!(error, expected);
    }

    fn global_format(required: bool) -> CommandTree<()> {
        CommandTree::new(
            quiet()
                .arguments([
                    ArgumentSpec::new(["--json"])
                        .action(Action::StoreTrue)
                        .global()
                        .mutex_group("format")
                        .required(required),
                    ArgumentSpec::new(["--plain"])
                        .action(Action::StoreTrue)
                        .global()
                        .mutex_group("format")
                        .required(required),
                ])
                .subcommands([CommandSpec::subcommand("a")]),
        )
        .unwrap()
    }

    #[rstest]
    #[case(vec!["--json", "a"], "json")]
    #[case(vec!["a", "--json"], "json")]
    #[case(vec!["a", "--plain"], "plain")]
    #[case(vec!["--plain"], "plain")]
    fn tokenize_global_mutex(#[case] tokens: Vec<&str>, #[case] expected: &str) {
        // Setup
        let tree = global_format(true);

        // Execute
        let cli = cli_of(&tree, &tokens);

        // Verify
        assert_eq!(cli.get(expected), Some(&Some(json!(true))));
        assert_eq!(cli.values().filter(|value| value.is_some()).count(), 1);
    }

    #[rstest]
    #[case(true, vec!["a", "--json", "--plain"], "'--json' cannot be used with '--plain'")]
    #[case(true, vec!["--json", "a", "--plain"], "'--json' cannot be used with '--plain'")]
    #[case(false, vec!["a", "--plain", "--json"], "'--json' cannot be used with '--plain'")]
    #[case(false, vec!["--json", "--plain", "a"], "'--json' cannot be used with '--plain'")]
    #[case(true, vec!["a"], "<--json|--plain>")]
    #[case(true, vec![], "<--json|--plain>")]
    fn tokenize_global_mutex_invalid(#[case] required: bool, #[case] tokens: Vec<&str>, #[case] expected: &str) {
        // Setup
        let tree = global_format(required);

        // Execute
        let (result, interface) = tokenize(&tree, &tokens);

        // Verify
        assert_matches!(result, Err(2));
        let (help, error) = interface.consume();
        assert_eq!(help, None);
        let error = error.unwrap();
        assert_contains!(error, expected);
        assert_contains!(error, "Usage:");
    }

    #[test]
    fn tokenize_global_mutex_optional() {
        // Setup
        let tree = global_format(false);

        // Execute
        let cli = cli_of(&tree, &["a"]);

        // Verify
        assert_eq!(cli.get("json"), Some(&None));
        assert_eq!(cli.get("plain"), Some(&None));
    }

    #[test]
    fn tokenize_mutex_optional() {
        // Setup
        let tree = CommandTree::new(quiet().arguments([
            ArgumentSpec::new(["--left"]).action(Action::StoreTrue).mutex_group("side").required(false),
            ArgumentSpec::new(["--right"]).action(Action::StoreTrue).mutex_group("side").required(false),
        ]))
        .unwrap();

        // Execute
        let cli = cli_of(&tree, &[]);

        // Verify
        assert_eq!(
            cli,
            Bucket::from([("left".to_string(), None), ("right".to_string(), None)])
        );
    }

    #[test]
    fn tokenize_help_disabled() {
        // Setup
        let tree = CommandTree::new(
            quiet()
                .add_help(false)
                .arguments([ArgumentSpec::new(["-h", "--host"])]),
        )
        .unwrap();

        // Execute
        let cli = cli_of(&tree, &["-h", "local"]);

        // Verify
        assert_eq!(cli.get("host"), Some(&Some(json!("local"))));
    }

    #[rstest]
    #[case(vec!["a"], vec![NodeId(0)])]
    #[case(vec!["a", "b"], vec![NodeId(0)])]
    fn tokenize_positional(#[case] tokens: Vec<&str>, #[case] expected_path: Vec<NodeId>) {
        // Setup
        let tree = CommandTree::new(quiet().arguments([
            ArgumentSpec::new(["first"]),
            ArgumentSpec::new(["second"]).nargs(Nargs::Optional),
        ]))
        .unwrap();

        // Execute
        let (result, interface) = tokenize(&tree, &tokens);

        // Verify
        assert_eq!(interface.consume(), (None, None));
        let raw = result.unwrap();
        assert_eq!(raw.invoked.iter().collect::<Vec<_>>(), expected_path);
        assert_eq!(raw.cli.get("first"), Some(&Some(json!("a"))));
        assert_eq!(raw.cli.get("second").cloned().flatten(), tokens.get(1).map(|t| json!(t)));
    }
}
