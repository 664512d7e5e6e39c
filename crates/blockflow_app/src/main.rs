// SPDX-License-Identifier: MIT OR Apache-2.0
//! `BlockFlow` headless runner
//!
//! Loads a project file, builds a session, plays the project's scenario
//! script on a fixed-timestep clock and logs every engine event.
//!
//! ```text
//! blockflow [PROJECT_FILE]
//! blockflow --init PROJECT_FILE
//! ```
//!
//! Without a project file the built-in demo project runs.

mod clock;
mod project;
mod runner;
mod script;

use project::ProjectSettings;
use runner::ScenarioRunner;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    // RUST_LOG overrides the default directives
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("blockflow_app=debug,blockflow_graph=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BlockFlow v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(std::env::args().skip(1).collect()) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let project = match args.as_slice() {
        [flag, path] if flag == "--init" => {
            let mut path = PathBuf::from(path);
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Untitled Flow")
                .to_string();
            if path.is_dir() {
                path = ProjectSettings::project_file_path(&path);
            }
            ProjectSettings::new(name).save(&path)?;
            return Ok(());
        }
        [path] => ProjectSettings::load(&PathBuf::from(path))?,
        [] => {
            tracing::info!("no project file given, running the demo project");
            ProjectSettings::default()
        }
        _ => return Err("usage: blockflow [PROJECT_FILE] | blockflow --init PROJECT_FILE".into()),
    };

    let runner = ScenarioRunner::from_project(&project)?;
    let report = runner.run(&project.script)?;

    for (index, token) in report.tokens.values().enumerate() {
        let path = token.path.join(" -> ");
        match token.fate {
            Some(fate) => {
                tracing::info!(index, source = %token.source, %path, values = ?token.values, ?fate, "token summary");
            }
            None => tracing::warn!(index, source = %token.source, %path, "token never finished"),
        }
    }
    tracing::info!(
        tokens = report.tokens.len(),
        transitions = report.transitions,
        steps = report.steps,
        elapsed = report.elapsed,
        "scenario finished"
    );
    Ok(())
}
