use serde_json::json;
use tierarg::prelude::*;
use tierarg::{Action, ArgumentSpec, CommandSpec, Nargs, Sarge};

#[derive(Debug, Default)]
struct Tally {
    visited: Vec<String>,
}

fn main() {
    let sarge = Sarge::new(
        CommandSpec::<Tally>::new()
            .prog("sub-command")
            .description("Demonstrates a callback chain across sub-commands.")
            .arguments([ArgumentSpec::new(["-v", "--verbose"])
                .help("Talk more.")
                .action(Action::StoreTrue)
                .global()])
            .callback(|ctx| {
                ctx.obj.visited.push("root".to_string());
            })
            .subcommands([
                CommandSpec::<Tally>::subcommand("add")
                    .help("Add up the items.")
                    .description("Add up the items.")
                    .arguments([ArgumentSpec::new(["item"])
                        .help("The items to add.")
                        .nargs(Nargs::AtLeastOne)
                        .coerce(tierarg::Coerce::integer())])
                    .callback(|ctx| {
                        ctx.obj.visited.push("add".to_string());
                        let sum: i64 = ctx
                            .data
                            .get("item")
                            .and_then(|items| items.as_array())
                            .map(|items| items.iter().filter_map(|item| item.as_i64()).sum())
                            .unwrap_or_default();
                        json!(sum)
                    }),
                CommandSpec::subcommand("mode")
                    .help("Pick a mode.")
                    .print_help_and_exit_if_last()
                    .subcommands([CommandSpec::<Tally>::subcommand("strict")
                        .help("Fail on the first problem.")
                        .arguments([ArgumentSpec::new(["--level"])
                            .help("How strict to be.")
                            .choice("low", "let most things slide")
                            .choice("high", "let nothing slide")
                            .default("low")
                            .show_default()])
                        .callback(|ctx| {
                            ctx.obj.visited.push("strict".to_string());
                            stop(ctx.data.get("level").cloned().unwrap_or_default())
                        })]),
            ]),
    )
    .expect("Invalid command line configuration");

    let mut tally = Tally::default();
    let mut parsed = sarge.parse();
    let verbose = parsed.get("verbose") == Some(&json!(true));
    let result = parsed.dispatch(&mut tally);

    if verbose {
        println!("Visited: {}", tally.visited.join(" -> "));
    }
    match result {
        Some(value) => println!("Result: {value}"),
        None => println!("No result."),
    }
}
