//! `tierarg` is a declarative command line builder for Rust, that resolves every setting from several layered sources.
//!
//! Command line parsers answer one question: what did the user type?
//! Most programs need the answer to a different question: what value should this setting take?
//! That value may come from the command line, an environment variable, a configuration file, or a default.
//! `tierarg` answers the second question "out of the box".
//! Specifically, it prioritizes the following design concerns:
//! * *Declarative definitions*:
//! The whole command hierarchy (arguments, groups, mutually exclusive groups, subcommands) is described as data, via [`CommandSpec`] and [`ArgumentSpec`].
//! * *Layered values*:
//! Each argument declares where else its value may come from (`envvar`, `config_path`, `default`).
//! All sources are merged into one precedence ordered view ([`ArgumentData`]).
//! * *Callback chains*:
//! Each command on the invoked path may observe and modify the resolved values before the next one runs.
//!
//! Tokenizing and help rendering are delegated to [`clap`](https://docs.rs/clap).
//!
//! # Usage
//! ```no_run
#![doc = include_str!("../demos/demo_layered.rs")]
//! ```
//!
//! ```console
//! $ layered
//! host: "localhost" (from defaults)
//! port: 8080 (from defaults)
//! retries: 3 (from defaults)
//!
//! $ LAYERED_PORT=10 layered --host example.com
//! host: "example.com" (from cli)
//! port: 10 (from environment)
//! retries: 3 (from defaults)
//!
//! $ layered --json --plain
//! error: the argument '--json' cannot be used with '--plain'
//! ```
//!
//! # Sources
//! The merged view reads each key from the highest priority [`Source`] which contains it:
//! 1. `override`: values written during dispatch, via [`ArgumentData::set`].
//! 2. `cli`: values supplied on the command line.
//! 3. `environment`: values of the arguments' `envvar`s.
//! 4. `configuration`: values found at the arguments' `config_path`s, in the object produced by `read_config` (see [`Sarge::parse_with_config`]).
//! 5. `defaults`: the arguments' `default`s, and the commands' static [`CommandSpec::defaults`].
//! 6. `arg_default`: the command's [`ArgumentDefault`] policy, for arguments which no other source supplies.
//!
//! The order of the middle four is configurable via [`CommandSpec::precedence`].
//! `override` is always first, and `arg_default` always last.
//!
//! Only the commands on the invoked path contribute: the arguments of a subcommand which was not invoked are absent from the merged view.
//! Values from the environment, the configuration and the defaults pass through the argument's [`Coerce`] function, just like the command line values do.
//! For example, with `.coerce(Coerce::integer()).envvar("PORT")`, the environment `PORT=10` resolves to the number `10`.
//!
//! # Sub-commands & Callbacks
//! Each [`CommandSpec`] may carry a callback.
//! After a parse, [`Parsed::dispatch`] runs the callbacks of the invoked path, root first.
//! Each one sees the merged view, the object supplied to the dispatch, and what the previous callback returned.
//! A callback may halt the chain with [`stop`] (producing a result) or [`die`] (exiting the program).
//!
//! ```no_run
#![doc = include_str!("../demos/demo_sub_command.rs")]
//! ```
//!
//! ```console
//! $ sub-command -v add 1 2 3
//! Visited: root -> add
//! Result: 6
//!
//! $ sub-command mode strict --level high
//! Result: "high"
//!
//! $ sub-command help mode strict
//! Usage: sub-command mode strict [OPTIONS]
//! <truncated>
//!
//! $ sub-command mode
//! Usage: sub-command mode [OPTIONS] [SUBCOMMAND]
//! <truncated>
//! ```
//!
//! # Features
//! * `unit_test`: For features that help with unit testing.
//! * `tracing_debug`: Emit `tracing::debug!` events while resolving and dispatching.
pub use tierarg_builder::*;
