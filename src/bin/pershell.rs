// src/bin/pershell.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pershell::{
    Environment, Shell,
    cli::Cli,
    system::shells_config::{self, ConfigError},
};
use std::env;
use std::io::{self, BufRead};
use std::path::{MAIN_SEPARATOR, PathBuf};
use std::time::Duration;

/// The main entry point of the `pershell` binary.
/// Sets up logging, runs the session, and handles every error in one place.
fn main() {
    env_logger::init();

    match run_cli(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Runs every command in one session and returns the exit code of the last one.
fn run_cli(cli: Cli) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);

    let shell_path = resolve_shell_path(&cli.shell)?;
    let dir = match cli.dir {
        Some(dir) => dir,
        None => env::current_dir().context("Could not determine the current directory")?,
    };

    let mut builder = Shell::builder(&shell_path)
        .current_dir(dir)
        .environment(build_environment(cli.clean_env, &cli.env));
    if !cli.no_stdout {
        builder = builder.stdout(io::stdout());
    }
    if !cli.no_stderr {
        builder = builder.stderr(io::stderr());
    }
    if let Some(secs) = cli.timeout {
        let timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid timeout '{}'", secs))?;
        builder = builder.timeout(timeout);
    }
    let mut shell = builder
        .build()
        .with_context(|| format!("Could not prepare shell '{}'", shell_path.display()))?;

    let commands: Box<dyn Iterator<Item = io::Result<String>>> = if cli.commands.is_empty() {
        Box::new(io::stdin().lock().lines())
    } else {
        Box::new(cli.commands.into_iter().map(Ok))
    };

    let mut last_code = 0;
    for line in commands {
        let line = line.context("Failed to read a command from standard input")?;
        if line.trim().is_empty() {
            continue;
        }
        last_code = shell
            .exec(&line)
            .with_context(|| format!("Failed to execute '{}'", line))?;
        if last_code != 0 {
            eprintln!("{}", format!("[exit {}]", last_code).red().dimmed());
        }
    }

    shell.stop().context("Failed to stop the shell")?;
    Ok(last_code)
}

/// Paths are used as given; names go through shells.toml.
fn resolve_shell_path(name_or_path: &str) -> Result<PathBuf> {
    let config = if name_or_path.contains(MAIN_SEPARATOR) {
        Default::default()
    } else {
        shells_config::load_shells_config().context("Could not load shells.toml")?
    };
    shells_config::resolve_shell(&config, name_or_path).map_err(|e| match e {
        ConfigError::ShellNotDefined(_) => anyhow::anyhow!(
            "{} Add it to shells.toml or pass a path with --shell.",
            e
        ),
        other => other.into(),
    })
}

/// Overrides from `--env` are applied on top of the inherited environment,
/// unless `--clean-env` asks for them alone.
fn build_environment(clean: bool, overrides: &[String]) -> Environment {
    if clean {
        return Environment::from_entries(Some(overrides));
    }
    if overrides.is_empty() {
        return Environment::Inherit;
    }
    let inherited = env::vars_os().filter_map(|(key, value)| {
        let key = key.into_string().ok()?;
        let value = value.into_string().ok()?;
        Some(format!("{}={}", key, value))
    });
    Environment::from_entries(Some(inherited.chain(overrides.iter().cloned())))
}
