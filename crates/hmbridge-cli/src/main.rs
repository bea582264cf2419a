//! Command-line entry point of the Homematic to MQTT bridge.

mod app;
mod config;
mod shutdown;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use crate::config::{Overrides, Settings};

/// Environment variable that switches log output to JSON lines.
const LOG_JSON_ENV: &str = "HM_MQTT_BRIDGE_LOG_JSON";

/// Bridge Homematic devices on a CCU to Home Assistant over MQTT.
#[derive(Parser, Debug)]
#[command(name = "hm-mqtt-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// What to run. Defaults to the bridge.
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// MQTT broker URL (mqtt:// or mqtts://).
    #[arg(short, long, global = true)]
    broker: Option<String>,

    /// Address the CCU calls back, as xmlrpc://host[:port].
    #[arg(short, long, global = true)]
    listen: Option<String>,

    /// XML-RPC endpoint of the CCU, as xmlrpc://[user:pass@]host:port[/path].
    #[arg(long, global = true)]
    connect: Option<String>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Topic prefix for Home Assistant discovery documents.
    #[arg(long, global = true)]
    discovery_prefix: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Announce devices to Home Assistant and relay state and commands.
    Bridge,
    /// Print an anonymized list of devices and events to stdout.
    Inventory,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let settings = settings.with_overrides(Overrides {
        broker: args.broker,
        listen: args.listen,
        connect: args.connect,
        debug: args.debug,
        discovery_prefix: args.discovery_prefix,
    });

    init_logging(settings.debug);

    let result = match args.command.unwrap_or(Command::Bridge) {
        Command::Bridge => app::run_bridge(settings).await,
        Command::Inventory => app::run_inventory(settings).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so the inventory on stdout stays clean.
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let json_logging = std::env::var(LOG_JSON_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_are_global() {
        let args = Args::parse_from([
            "hm-mqtt-bridge",
            "inventory",
            "--connect",
            "xmlrpc://ccu:2010",
            "-d",
        ]);
        assert_eq!(args.command, Some(Command::Inventory));
        assert_eq!(args.connect.as_deref(), Some("xmlrpc://ccu:2010"));
        assert!(args.debug);
    }

    #[test]
    fn test_bridge_is_default() {
        let args = Args::parse_from(["hm-mqtt-bridge", "--broker", "mqtts://broker"]);
        assert!(args.command.is_none());
        assert_eq!(args.broker.as_deref(), Some("mqtts://broker"));
    }
}
