use serde_json::{json, Value};
use tierarg::{ArgumentSpec, Coerce, CommandSpec, Sarge, Source};

fn main() {
    let sarge: Sarge = Sarge::new(
        CommandSpec::new()
            .prog("layered")
            .description("Resolves each setting from the cli, environment, configuration or defaults.")
            .arguments([
                ArgumentSpec::new(["-c", "--config"])
                    .help("A json configuration file.")
                    .group("Input"),
                ArgumentSpec::new(["--host"])
                    .help("The host to connect to.")
                    .envvar("LAYERED_HOST")
                    .config_path("server/host")
                    .default("localhost")
                    .show_default()
                    .group("Connection"),
                ArgumentSpec::new(["-p", "--port"])
                    .help("The port to connect to.")
                    .coerce(Coerce::integer())
                    .envvar("LAYERED_PORT")
                    .config_path("server/port")
                    .default(8080)
                    .show_default()
                    .group("Connection"),
                ArgumentSpec::new(["--json"])
                    .help("Print the settings as json.")
                    .action(tierarg::Action::StoreTrue)
                    .mutex_group("format")
                    .required(false),
                ArgumentSpec::new(["--plain"])
                    .help("Print the settings as text.")
                    .action(tierarg::Action::StoreTrue)
                    .mutex_group("format")
                    .required(false),
            ])
            .group_descriptions([("Connection", "Where to connect.")])
            .defaults([("retries", 3)]),
    )
    .expect("Invalid command line configuration");

    let parsed = sarge.parse_with_config(|data| {
        let path = data.get("config")?.as_str()?.to_string();
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str::<Value>(&content).ok()
    });

    let keys = ["host", "port", "retries"];
    if parsed.get("json") == Some(&json!(true)) {
        let settings: serde_json::Map<String, Value> = keys
            .iter()
            .map(|key| (key.to_string(), parsed.get(key).cloned().unwrap_or(Value::Null)))
            .collect();
        println!("{}", Value::Object(settings));
    } else {
        for key in keys {
            let source = parsed.data().source_of(key).unwrap_or(Source::ArgDefault);
            match parsed.get(key) {
                Some(value) => println!("{key}: {value} (from {source})"),
                None => println!("{key}: <unset>"),
            }
        }
    }
}
