use std::rc::Rc;

use serde_json::Value;

#[cfg(feature = "tracing_debug")]
use tracing::debug;

use crate::data::ArgumentData;
use crate::parser::{CommandTree, NodeId, UserInterface};
use crate::resolve::InvokedPath;

/// What a callback asks of the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Continue to the next callback, which sees this as its `return_value`.
    Next(Option<Value>),
    /// Halt the chain, making this the result of the dispatch.
    Stop(Option<Value>),
    /// Halt the chain, and exit the program with this code.
    Die(i32),
}

impl From<()> for Flow {
    fn from(_: ()) -> Self {
        Flow::Next(None)
    }
}

impl From<Value> for Flow {
    fn from(value: Value) -> Self {
        Flow::Next(Some(value))
    }
}

impl From<Option<Value>> for Flow {
    fn from(value: Option<Value>) -> Self {
        Flow::Next(value)
    }
}

/// Halt the callback chain, yielding `value` as the result of the dispatch.
///
/// ### Example
/// ```
/// # use tierarg_builder as tierarg;
/// use tierarg::{prelude::*, Flow};
/// use serde_json::json;
///
/// assert_eq!(stop(42), Flow::Stop(Some(json!(42))));
/// ```
pub fn stop(value: impl Into<Value>) -> Flow {
    Flow::Stop(Some(value.into()))
}

/// Halt the callback chain, and exit the program with `code`.
pub fn die(code: i32) -> Flow {
    Flow::Die(code)
}

/// The descriptive data of the command which a callback belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserData {
    /// The program name, including the names of the parent commands.
    pub prog: String,
    /// The rendered help message.
    pub help: String,
    /// The rendered usage line.
    pub usage: String,
}

impl ParserData {
    /// A placeholder, for testing callbacks in isolation.
    #[cfg(any(test, feature = "unit_test"))]
    pub fn test_dummy() -> Self {
        Self {
            prog: "program".to_string(),
            help: "Usage: program".to_string(),
            usage: "Usage: program".to_string(),
        }
    }
}

/// What each callback of the chain sees.
pub struct Context<'a, T> {
    /// The merged view of the resolved values.
    /// Writes ([`ArgumentData::set`]) are visible to the subsequent callbacks.
    pub data: &'a mut ArgumentData,
    /// The object supplied to the dispatch.
    pub obj: &'a mut T,
    /// The command this callback belongs to.
    pub parser: &'a ParserData,
    /// Whether this is the final callback of the chain.
    pub last: bool,
    /// What the previous callback returned.
    pub return_value: Option<Value>,
}

type CallbackFn<T> = dyn Fn(&mut Context<'_, T>) -> Flow;

/// The callback of a command.
///
/// Any closure over a [`Context`] may be used, as long as its result converts into a [`Flow`]:
/// `()`, [`Value`], `Option<Value>`, or the `Flow` itself (see [`stop`] and [`die`]).
pub struct Callback<T>(Rc<CallbackFn<T>>);

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Callback(self.0.clone())
    }
}

impl<T> std::fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callback")
    }
}

impl<T: 'static> Callback<T> {
    /// Wrap a closure as a callback.
    pub fn new<F, R>(function: F) -> Self
    where
        F: Fn(&mut Context<'_, T>) -> R + 'static,
        R: Into<Flow> + 'static,
    {
        Callback(Rc::new(move |context: &mut Context<'_, T>| -> Flow {
            function(context).into()
        }))
    }

    /// Forward the previous `return_value` untouched.
    pub fn identity() -> Self {
        Callback::new(|context: &mut Context<'_, T>| context.return_value.take())
    }

    /// Invoke the callback.
    pub fn call(&self, context: &mut Context<'_, T>) -> Flow {
        (self.0)(context)
    }
}

enum Step<T> {
    Call(Callback<T>),
    PrintHelpAndExitIfLast,
}

struct Link<T> {
    node: NodeId,
    step: Step<T>,
    parser: ParserData,
}

/// The callbacks of the invoked commands, root first.
pub(crate) struct CallbackChain<T> {
    links: Vec<Link<T>>,
}

impl<T: 'static> CallbackChain<T> {
    /// Pair every node on the invoked path with its callback.
    /// Nodes without a callback forward the previous return value.
    pub(crate) fn build(
        tree: &CommandTree<T>,
        invoked: &InvokedPath,
        parser_data: Vec<ParserData>,
    ) -> Self {
        let links = invoked
            .iter()
            .zip(parser_data)
            .filter_map(|(id, parser)| {
                let node = tree.node(id)?;
                let step = if node.print_help_and_exit_if_last {
                    Step::PrintHelpAndExitIfLast
                } else {
                    Step::Call(node.callback.clone().unwrap_or_else(Callback::identity))
                };

                Some(Link {
                    node: node.parser_key(),
                    step,
                    parser,
                })
            })
            .collect();

        Self { links }
    }

    pub(crate) fn nodes(&self) -> Vec<NodeId> {
        self.links.iter().map(|link| link.node).collect()
    }
}

/// The result of a successful parse: the resolved values, ready to be dispatched.
pub struct Parsed<T = ()> {
    data: ArgumentData,
    chain: CallbackChain<T>,
    user_interface: Rc<dyn UserInterface>,
}

impl<T> std::fmt::Debug for Parsed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parsed")
            .field("data", &self.data)
            .field("chain", &self.chain.links.iter().map(|l| l.node).collect::<Vec<_>>())
            .finish()
    }
}

impl<T: 'static> Parsed<T> {
    pub(crate) fn new(
        data: ArgumentData,
        chain: CallbackChain<T>,
        user_interface: Rc<dyn UserInterface>,
    ) -> Self {
        Self {
            data,
            chain,
            user_interface,
        }
    }

    /// The merged view.
    pub fn data(&self) -> &ArgumentData {
        &self.data
    }

    /// The merged view, for modification before dispatching.
    pub fn data_mut(&mut self) -> &mut ArgumentData {
        &mut self.data
    }

    /// Take the merged view, discarding the callbacks.
    pub fn into_data(self) -> ArgumentData {
        self.data
    }

    /// Shorthand for `data().get(key)`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The commands whose callbacks will run, root first.
    pub fn callbacks(&self) -> Vec<NodeId> {
        self.chain.nodes()
    }

    /// Run the callback chain.
    ///
    /// Produces the result of the final callback, or the value of a [`stop`].
    /// A [`die`] produces `Err(code)`.
    pub fn try_dispatch(&mut self, obj: &mut T) -> Result<Option<Value>, i32> {
        let mut return_value = None;
        let final_index = self.chain.links.len().saturating_sub(1);

        for (index, link) in self.chain.links.iter().enumerate() {
            let mut context = Context {
                data: &mut self.data,
                obj: &mut *obj,
                parser: &link.parser,
                last: index == final_index,
                return_value: return_value.take(),
            };

            let flow = match &link.step {
                Step::Call(callback) => callback.call(&mut context),
                Step::PrintHelpAndExitIfLast => {
                    if context.last {
                        self.user_interface.print_help(link.parser.help.clone());
                        Flow::Die(0)
                    } else {
                        Flow::Next(None)
                    }
                }
            };

            #[cfg(feature = "tracing_debug")]
            {
                debug!("Callback of {} produced {flow:?}.", link.node);
            }

            match flow {
                Flow::Next(value) => return_value = value,
                Flow::Stop(value) => return Ok(value),
                Flow::Die(code) => return Err(code),
            }
        }

        Ok(return_value)
    }

    /// Run the callback chain, exiting the program on a [`die`].
    pub fn dispatch(&mut self, obj: &mut T) -> Option<Value> {
        match self.try_dispatch(obj) {
            Ok(value) => value,
            Err(exit_code) => std::process::exit(exit_code),
        }
    }
}
