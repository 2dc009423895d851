use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

#[cfg(feature = "tracing_debug")]
use tracing::debug;

use crate::data::{ArgumentData, Source};
use crate::model::ArgumentDefault;
use crate::parser::{CommandNode, CommandTree, NodeId, ResolveError};

/// The nodes selected by the Cli, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct InvokedPath {
    order: Vec<NodeId>,
    members: HashSet<NodeId>,
}

impl InvokedPath {
    pub(crate) fn new(order: Vec<NodeId>) -> Self {
        let members = order.iter().copied().collect();
        Self { order, members }
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }
}

/// Fills the buckets of an [`ArgumentData`] from the nodes on the invoked path.
pub(crate) struct Resolver<'t, T> {
    tree: &'t CommandTree<T>,
    invoked: InvokedPath,
}

impl<'t, T> Resolver<'t, T> {
    pub(crate) fn new(tree: &'t CommandTree<T>, invoked: InvokedPath) -> Self {
        Self { tree, invoked }
    }

    pub(crate) fn invoked(&self) -> &InvokedPath {
        &self.invoked
    }

    /// Drop the placeholders of the arguments which were not on the Cli.
    pub(crate) fn strip_unset_from_cli(&self, data: &mut ArgumentData) {
        data.bucket_mut(Source::Cli).retain(|_, value| value.is_some());
    }

    /// Move the static defaults of every invoked node into the `defaults` bucket.
    pub(crate) fn move_node_level_defaults(
        &self,
        data: &mut ArgumentData,
        mut node_defaults: BTreeMap<NodeId, Map<String, Value>>,
    ) {
        for node in self.invoked_nodes() {
            if let Some(defaults) = node_defaults.remove(&node.parser_key()) {
                let bucket = data.bucket_mut(Source::Defaults);

                for (key, value) in defaults {
                    bucket.insert(key, Some(value));
                }
            }
        }
    }

    /// Populate `environment`, `defaults` and `arg_default` from the arguments of the invoked nodes.
    pub(crate) fn resolve_env_and_defaults(&self, data: &mut ArgumentData) -> Result<(), ResolveError> {
        for node in self.invoked_nodes() {
            for argument in &node.arguments {
                let dest = &argument.dest;

                if let Some(value) = argument.value_from_env()? {
                    #[cfg(feature = "tracing_debug")]
                    {
                        debug!("Resolved '{dest}' from the environment: {value}.");
                    }

                    data.bucket_mut(Source::Environment)
                        .insert(dest.clone(), Some(value));
                }

                if let Some(value) = argument.default_value(true)? {
                    data.bucket_mut(Source::Defaults)
                        .insert(dest.clone(), Some(value));
                }

                match &node.settings.argument_default {
                    ArgumentDefault::Unset => {
                        data.bucket_mut(Source::ArgDefault)
                            .insert(dest.clone(), None);
                    }
                    ArgumentDefault::Suppress => {}
                    ArgumentDefault::Value(value) => {
                        data.bucket_mut(Source::ArgDefault)
                            .insert(dest.clone(), Some(value.clone()));
                    }
                }
            }
        }

        Ok(())
    }

    /// Populate `configuration` from the arguments of the invoked nodes.
    pub(crate) fn resolve_config(&self, data: &mut ArgumentData, config: &Value) -> Result<(), ResolveError> {
        for node in self.invoked_nodes() {
            for argument in &node.arguments {
                if let Some(value) = argument.value_from_config(config)? {
                    #[cfg(feature = "tracing_debug")]
                    {
                        debug!("Resolved '{}' from the configuration: {value}.", argument.dest);
                    }

                    data.bucket_mut(Source::Configuration)
                        .insert(argument.dest.clone(), Some(value));
                }
            }
        }

        Ok(())
    }

    /// The invoked nodes, parents before children.
    /// Subtrees which were not invoked are skipped entirely.
    fn invoked_nodes(&self) -> Vec<&'t CommandNode<T>> {
        let mut nodes = Vec::default();
        let mut pending = vec![NodeId::ROOT];

        while let Some(id) = pending.pop() {
            if !self.invoked.contains(id) {
                continue;
            }

            if let Some(node) = self.tree.node(id) {
                nodes.push(node);
                pending.extend(node.children.iter().rev().copied());
            }
        }

        nodes
    }
}

/// Describe a non-mapping configuration.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
