// SPDX-License-Identifier: MIT OR Apache-2.0
//! `shadegraph` - command-line host for shader node graphs.
//!
//! ```text
//! shadegraph init    [settings]
//! shadegraph apply   <script.ron> [settings]
//! shadegraph check   [settings]
//! shadegraph compile [settings]
//! ```
//!
//! The settings path defaults to `shadegraph.ron` in the working directory.

mod commands;
mod settings;

use settings::SETTINGS_FILE_NAME;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const USAGE: &str = "usage: shadegraph <init|apply <script.ron>|check|compile> [settings]";

fn settings_path(arg: Option<&String>) -> PathBuf {
    arg.map_or_else(|| PathBuf::from(SETTINGS_FILE_NAME), PathBuf::from)
}

fn run(args: &[String]) -> Result<(), String> {
    let command = args.first().ok_or(USAGE)?;
    let rest = &args[1..];

    let result = match command.as_str() {
        "init" => commands::init(&settings_path(rest.first())),
        "apply" => {
            let script = rest.first().ok_or(USAGE)?;
            commands::apply(&PathBuf::from(script), &settings_path(rest.get(1)))
        }
        "check" => commands::check(&settings_path(rest.first())).map(|report| println!("{report}")),
        "compile" => commands::compile(&settings_path(rest.first())),
        _ => return Err(USAGE.to_string()),
    };
    result.map_err(|e| e.to_string())
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "shadegraph=debug"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::DEBUG.into()),
    );

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting shadegraph v{}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
