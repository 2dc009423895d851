use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{Map, Value};

#[cfg(feature = "tracing_debug")]
use tracing::debug;
use tracing::warn;

use crate::api::{ArgumentSpec, CommandSpec};
use crate::dispatch::Callback;
use crate::model::{ArgumentDefault, Nargs};
use crate::parser::argument::{Argument, ArgumentContext, Schema};
use crate::parser::base::ConfigError;

/// The stable identity of a command node.
///
/// Assigned at registration; the root is always [`NodeId::ROOT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root command.
    pub const ROOT: NodeId = NodeId(0);
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// The descriptive options of a command node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeSettings {
    pub(crate) name: Option<String>,
    pub(crate) prog: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) help: Option<String>,
    pub(crate) epilog: Option<String>,
    pub(crate) aliases: Vec<String>,
    pub(crate) add_help: bool,
    pub(crate) argument_default: ArgumentDefault,
    pub(crate) subcommand_title: String,
    pub(crate) subcommand_metavar: String,
    pub(crate) add_usage_to_parent_command_desc: bool,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: None,
            prog: None,
            description: None,
            help: None,
            epilog: None,
            aliases: Vec::default(),
            add_help: true,
            argument_default: ArgumentDefault::default(),
            subcommand_title: "subcommands".to_string(),
            subcommand_metavar: "SUBCOMMAND".to_string(),
            add_usage_to_parent_command_desc: false,
        }
    }
}

pub(crate) struct CommandNode<T> {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) settings: NodeSettings,
    pub(crate) arguments: Vec<Argument>,
    pub(crate) callback: Option<Callback<T>>,
    pub(crate) print_help_and_exit_if_last: bool,
    pub(crate) group_descriptions: BTreeMap<String, String>,
    pub(crate) defaults: Map<String, Value>,
}

impl<T> std::fmt::Debug for CommandNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandNode")
            .field("id", &self.id)
            .field("name", &self.settings.name)
            .field("children", &self.children)
            .field("arguments", &self.arguments.len())
            .finish()
    }
}

impl<T> CommandNode<T> {
    /// The identity used to correlate tokenizer output back to this node.
    pub(crate) fn parser_key(&self) -> NodeId {
        self.id
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn has_positional(&self) -> bool {
        self.arguments.iter().any(|argument| argument.positional)
    }

    fn display_name(&self) -> String {
        match &self.settings.name {
            Some(name) => format!("subcommand '{name}'"),
            None => "the main command".to_string(),
        }
    }
}

/// One entry of a compiled argument list.
#[derive(Debug)]
pub(crate) enum Entry<'a> {
    Argument(&'a Argument),
    Group {
        title: &'a str,
        description: Option<&'a str>,
        members: Vec<Entry<'a>>,
    },
    Mutex {
        id: &'a str,
        required: bool,
        members: Vec<&'a Argument>,
    },
}

enum Slot<'a> {
    Argument(&'a Argument),
    Group(&'a str),
    Mutex(&'a str),
}

/// The arena of command nodes.
pub(crate) struct CommandTree<T> {
    nodes: Vec<CommandNode<T>>,
    show_warnings: bool,
    help_subcommand: bool,
}

impl<T> std::fmt::Debug for CommandTree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTree")
            .field("nodes", &self.nodes)
            .field("show_warnings", &self.show_warnings)
            .field("help_subcommand", &self.help_subcommand)
            .finish()
    }
}

impl<T> CommandTree<T> {
    /// Build the tree from the root definition.
    pub(crate) fn new(spec: CommandSpec<T>) -> Result<Self, ConfigError> {
        let CommandSpec {
            settings,
            arguments,
            subcommands,
            callback,
            print_help_and_exit_if_last,
            defaults,
            group_descriptions,
            help_subcommand,
            precedence: _,
            show_warnings,
        } = spec;

        if settings.name.is_some() {
            return Err(ConfigError(
                "'name' parameter applies only to subcommands".to_string(),
            ));
        }

        if settings.help.is_some() {
            return Err(ConfigError(
                "'help' parameter applies only to subcommands".to_string(),
            ));
        }

        if !settings.aliases.is_empty() {
            return Err(ConfigError(
                "'aliases' parameter applies only to subcommands".to_string(),
            ));
        }

        if settings.add_usage_to_parent_command_desc {
            return Err(ConfigError(
                "'add_usage_to_parent_command_desc' parameter applies only to subcommands".to_string(),
            ));
        }

        let show_warnings = show_warnings.unwrap_or(true);

        if settings.description.is_none() && show_warnings {
            warn!("Missing 'description' in the main command. Please add something helpful, or set an empty description to hide this warning");
        }

        let root = new_node(
            NodeId::ROOT,
            None,
            settings,
            callback,
            print_help_and_exit_if_last,
            defaults,
            group_descriptions,
        )?;
        let mut tree = Self {
            nodes: vec![root],
            show_warnings,
            help_subcommand: help_subcommand.unwrap_or(true),
        };

        tree.register_arguments(NodeId::ROOT, arguments)?;

        for subcommand in subcommands {
            tree.register_subcommand(NodeId::ROOT, subcommand)?;
        }

        Ok(tree)
    }

    pub(crate) fn root(&self) -> &CommandNode<T> {
        &self.nodes[NodeId::ROOT.0]
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&CommandNode<T>> {
        self.nodes.get(id.0)
    }

    pub(crate) fn help_subcommand(&self) -> bool {
        self.help_subcommand
    }

    fn node_or_error(&self, id: NodeId) -> Result<&CommandNode<T>, ConfigError> {
        self.node(id)
            .ok_or_else(|| ConfigError(format!("Unknown command node '{id}'")))
    }

    fn node_mut_or_error(&mut self, id: NodeId) -> Result<&mut CommandNode<T>, ConfigError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| ConfigError(format!("Unknown command node '{id}'")))
    }

    fn argument_context(&self, id: NodeId) -> Result<ArgumentContext<'static>, ConfigError> {
        let node = self.node_or_error(id)?;

        Ok(if node.is_root() {
            ArgumentContext::root(self.show_warnings)
        } else {
            ArgumentContext::subcommand(self.show_warnings)
        })
    }

    /// Validate and append arguments to a node.
    /// Nothing is appended when any of them is invalid.
    pub(crate) fn register_arguments(
        &mut self,
        id: NodeId,
        specs: impl IntoIterator<Item = ArgumentSpec>,
    ) -> Result<(), ConfigError> {
        let context = self.argument_context(id)?;
        let arguments = specs
            .into_iter()
            .map(|spec| Argument::new(spec, &context))
            .collect::<Result<Vec<Argument>, ConfigError>>()?;
        let node = self.node_mut_or_error(id)?;
        let checkpoint = node.arguments.len();
        node.arguments.extend(arguments);

        if let Err(error) = self.validate() {
            self.nodes[id.0].arguments.truncate(checkpoint);
            return Err(error);
        }

        self.warn_positional_with_subcommands(id);
        Ok(())
    }

    /// Attach a subcommand (and, recursively, its subcommands) under `parent`.
    /// Nothing is attached when any part of it is invalid.
    pub(crate) fn register_subcommand(
        &mut self,
        parent: NodeId,
        spec: CommandSpec<T>,
    ) -> Result<NodeId, ConfigError> {
        self.node_or_error(parent)?;
        let checkpoint = self.nodes.len();
        let result = self
            .insert_subcommand(parent, spec)
            .and_then(|id| self.validate().map(|_| id));

        match result {
            Ok(id) => {
                self.warn_positional_with_subcommands(parent);
                Ok(id)
            }
            Err(error) => {
                self.nodes.truncate(checkpoint);

                for node in &mut self.nodes {
                    node.children.retain(|child| child.0 < checkpoint);
                }

                Err(error)
            }
        }
    }

    pub(crate) fn add_defaults(&mut self, id: NodeId, defaults: Map<String, Value>) -> Result<(), ConfigError> {
        self.node_mut_or_error(id)?.defaults.extend(defaults);
        Ok(())
    }

    pub(crate) fn add_group_descriptions(
        &mut self,
        id: NodeId,
        descriptions: BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        self.node_mut_or_error(id)?
            .group_descriptions
            .extend(descriptions);
        Ok(())
    }

    fn insert_subcommand(&mut self, parent: NodeId, spec: CommandSpec<T>) -> Result<NodeId, ConfigError> {
        let CommandSpec {
            settings,
            arguments,
            subcommands,
            callback,
            print_help_and_exit_if_last,
            defaults,
            group_descriptions,
            help_subcommand,
            precedence,
            show_warnings,
        } = spec;

        let name = match &settings.name {
            Some(name) if !name.is_empty() && !name.starts_with('-') => name.clone(),
            _ => {
                return Err(ConfigError(
                    "Subcommand 'name' missing or invalid".to_string(),
                ))
            }
        };

        for (parameter, present) in [
            ("prog", settings.prog.is_some()),
            ("help_subcommand", help_subcommand.is_some()),
            ("precedence", precedence.is_some()),
            ("show_warnings", show_warnings.is_some()),
        ] {
            if present {
                return Err(ConfigError(format!(
                    "'{parameter}' parameter applies only to the main command"
                )));
            }
        }

        let parent_node = self.node_or_error(parent)?;
        let mut taken: BTreeSet<&str> = BTreeSet::default();

        for child in &parent_node.children {
            let sibling = &self.nodes[child.0].settings;
            taken.extend(sibling.name.as_deref());
            taken.extend(sibling.aliases.iter().map(String::as_str));
        }

        if parent_node.is_root() && self.help_subcommand {
            taken.insert("help");
        }

        for candidate in std::iter::once(&name).chain(settings.aliases.iter()) {
            if taken.contains(candidate.as_str()) {
                return Err(ConfigError(format!(
                    "Conflicting subcommand name '{candidate}' in {}",
                    parent_node.display_name()
                )));
            }
        }

        if settings.help.is_none() && self.show_warnings {
            warn!("Missing 'help' in subcommand '{name}'. Please add something helpful, or set an empty help to hide this warning");
        }

        let id = NodeId(self.nodes.len());
        let node = new_node(
            id,
            Some(parent),
            settings,
            callback,
            print_help_and_exit_if_last,
            defaults,
            group_descriptions,
        )?;
        let context = ArgumentContext::subcommand(self.show_warnings);
        let arguments = arguments
            .into_iter()
            .map(|spec| Argument::new(spec, &context))
            .collect::<Result<Vec<Argument>, ConfigError>>()?;

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Registering subcommand '{name}' as {id} under {parent}.");
        }

        self.nodes.push(CommandNode { arguments, ..node });
        self.nodes[parent.0].children.push(id);

        for subcommand in subcommands {
            self.insert_subcommand(id, subcommand)?;
        }

        Ok(id)
    }

    /// Check every node, and the global arguments against every subcommand.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for node in &self.nodes {
            validate_mutex_groups(node)?;
            validate_names(node)?;
            validate_positionals(node)?;
        }

        let globals: Vec<&Argument> = self
            .root()
            .arguments
            .iter()
            .filter(|argument| argument.matches_schema(&Schema::global(true)))
            .collect();

        for node in self.nodes.iter().filter(|node| !node.is_root()) {
            for argument in &node.arguments {
                for global in &globals {
                    let conflict = if let Some(long) = argument.longs.iter().find(|l| global.longs.contains(l)) {
                        Some(format!("'--{long}'"))
                    } else if let Some(short) = argument.shorts.iter().find(|s| global.shorts.contains(s)) {
                        Some(format!("'-{short}'"))
                    } else if argument.dest == global.dest {
                        Some(format!("'{}'", global.dest))
                    } else {
                        None
                    };

                    if let Some(conflict) = conflict {
                        return Err(ConfigError(format!(
                            "Global argument {conflict} conflicts with an argument of {}",
                            node.display_name()
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Produce the ordered argument list of a node, arranging grouped and mutually exclusive arguments.
    pub(crate) fn compile_argument_list(
        &self,
        id: NodeId,
        schema: &Schema,
    ) -> Result<Vec<Entry<'_>>, ConfigError> {
        let node = self.node_or_error(id)?;
        validate_mutex_groups(node)?;

        let mut top: Vec<Slot> = Vec::default();
        let mut groups: HashMap<&str, Vec<Slot>> = HashMap::default();
        let mut mutexes: HashMap<&str, Vec<&Argument>> = HashMap::default();

        for argument in node
            .arguments
            .iter()
            .filter(|argument| argument.matches_schema(schema))
        {
            let slot = match argument.spec.mutex_group.as_deref() {
                Some(mutex) => {
                    let first = !mutexes.contains_key(mutex);
                    mutexes.entry(mutex).or_default().push(argument);
                    first.then_some(Slot::Mutex(mutex))
                }
                None => Some(Slot::Argument(argument)),
            };

            if let Some(slot) = slot {
                match argument.spec.group.as_deref() {
                    Some(group) => {
                        if !groups.contains_key(group) {
                            top.push(Slot::Group(group));
                        }

                        groups.entry(group).or_default().push(slot);
                    }
                    None => top.push(slot),
                }
            }
        }

        Ok(top
            .into_iter()
            .map(|slot| assemble_slot(slot, node, &mut groups, &mut mutexes))
            .collect())
    }

    fn warn_positional_with_subcommands(&self, id: NodeId) {
        if let Some(node) = self.node(id) {
            if self.show_warnings && node.has_positional() && !node.children.is_empty() {
                warn!("Having subcommands and positional arguments simultaneously is probably a bad idea");
            }
        }
    }
}

fn new_node<T>(
    id: NodeId,
    parent: Option<NodeId>,
    settings: NodeSettings,
    callback: Option<Callback<T>>,
    print_help_and_exit_if_last: bool,
    defaults: Map<String, Value>,
    group_descriptions: BTreeMap<String, String>,
) -> Result<CommandNode<T>, ConfigError> {
    if callback.is_some() && print_help_and_exit_if_last {
        return Err(ConfigError(
            "'callback' and 'print_help_and_exit_if_last' are mutually exclusive".to_string(),
        ));
    }

    Ok(CommandNode {
        id,
        parent,
        children: Vec::default(),
        settings,
        arguments: Vec::default(),
        callback,
        print_help_and_exit_if_last,
        group_descriptions,
        defaults,
    })
}

fn assemble_slot<'a, T>(
    slot: Slot<'a>,
    node: &'a CommandNode<T>,
    groups: &mut HashMap<&'a str, Vec<Slot<'a>>>,
    mutexes: &mut HashMap<&'a str, Vec<&'a Argument>>,
) -> Entry<'a> {
    match slot {
        Slot::Argument(argument) => Entry::Argument(argument),
        Slot::Mutex(id) => {
            let members = mutexes.remove(id).unwrap_or_default();
            // Required, unless every member explicitly opts out.
            let required = !members
                .iter()
                .all(|member| member.spec.required == Some(false));

            Entry::Mutex {
                id,
                required,
                members,
            }
        }
        Slot::Group(title) => {
            let members = groups
                .remove(title)
                .unwrap_or_default()
                .into_iter()
                .map(|slot| assemble_slot(slot, node, groups, mutexes))
                .collect();

            Entry::Group {
                title,
                description: node.group_descriptions.get(title).map(String::as_str),
                members,
            }
        }
    }
}

fn validate_mutex_groups<T>(node: &CommandNode<T>) -> Result<(), ConfigError> {
    let mut properties: BTreeMap<&str, (BTreeSet<bool>, BTreeSet<bool>, BTreeSet<Option<&str>>)> =
        BTreeMap::default();

    for argument in &node.arguments {
        if let Some(mutex) = argument.spec.mutex_group.as_deref() {
            let (required, global, group) = properties.entry(mutex).or_default();
            required.insert(argument.spec.required == Some(true));
            global.insert(argument.spec.global);
            group.insert(argument.spec.group.as_deref());
        }
    }

    for (required, global, group) in properties.values() {
        for (property, distinct) in [
            ("required", required.len()),
            ("global", global.len()),
            ("group", group.len()),
        ] {
            if distinct > 1 {
                return Err(ConfigError(format!(
                    "'{property}' property must have the same value in all mutex group arguments"
                )));
            }
        }
    }

    Ok(())
}

fn validate_names<T>(node: &CommandNode<T>) -> Result<(), ConfigError> {
    let mut dests: BTreeSet<&str> = BTreeSet::default();
    let mut longs: BTreeSet<&str> = BTreeSet::default();
    let mut shorts: BTreeSet<char> = BTreeSet::default();

    if node.settings.add_help {
        dests.insert("help");
        longs.insert("help");
        shorts.insert('h');
    }

    for argument in &node.arguments {
        if !dests.insert(argument.dest.as_str()) {
            return Err(ConfigError(format!(
                "Conflicting 'dest' in {}: '{}'",
                node.display_name(),
                argument.dest
            )));
        }

        for long in &argument.longs {
            if !longs.insert(long.as_str()) {
                return Err(ConfigError(format!(
                    "Conflicting option name in {}: '--{long}'",
                    node.display_name()
                )));
            }
        }

        for short in &argument.shorts {
            if !shorts.insert(*short) {
                return Err(ConfigError(format!(
                    "Conflicting option name in {}: '-{short}'",
                    node.display_name()
                )));
            }
        }
    }

    Ok(())
}

fn validate_positionals<T>(node: &CommandNode<T>) -> Result<(), ConfigError> {
    let mut previous: Option<&Argument> = None;

    for argument in node.arguments.iter().filter(|argument| argument.positional) {
        if let Some(previous) = previous {
            if matches!(previous.nargs(), Nargs::Any | Nargs::AtLeastOne) {
                return Err(ConfigError(format!(
                    "Only the last positional argument may take a variable number of values: '{}'",
                    previous.dest
                )));
            }

            if argument.is_required() && !previous.is_required() {
                return Err(ConfigError(format!(
                    "Required positional argument '{}' cannot follow an optional one",
                    argument.dest
                )));
            }
        }

        previous.replace(argument);
    }

    Ok(())
}
