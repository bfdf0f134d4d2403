//! kubelogin CLI entrypoint.

use clap::ArgMatches;
use kubelogin_core::flags::{self, Command, FlagId};
use kubelogin_core::{Error, ProcessEnv, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod exec_credential;
mod handlers;
mod pipeline;


#[tokio::main]
async fn main() -> ExitCode {
    let matches = commands::build().get_matches();
    let Some((name, sub)) = matches.subcommand() else {
        return ExitCode::FAILURE;
    };
    init_logging(commands::verbosity(sub));

    let result = tokio::select! {
        result = run(name, sub) => result,
        _ = tokio::signal::ctrl_c() => Err(Error::Cancelled),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(name: &str, matches: &ArgMatches) -> Result<()> {
    let env = ProcessEnv;
    let home = home_dir();
    let home = home.as_deref();

    match name {
        commands::GET_TOKEN => {
            let options =
                commands::options_from_matches(matches, &commands::specs_for(Command::GetToken))?;
            let credential = handlers::get_token(options, &env, home).await?;
            credential.write_to(&mut std::io::stdout().lock())
        }
        commands::CONVERT_KUBECONFIG => {
            let options =
                commands::options_from_matches(matches, &commands::specs_for(Command::Convert))?;
            handlers::convert(options, &env, home)
        }
        commands::REMOVE_CACHE_DIR => {
            let options =
                commands::options_from_matches(matches, &[flags::spec(FlagId::CacheDir)])?;
            handlers::remove_cache_dir(options, &env, home)
        }
        commands::REMOVE_TOKENS => {
            let options =
                commands::options_from_matches(matches, &[flags::spec(FlagId::TokenCacheDir)])?;
            handlers::remove_tokens(options, &env, home)
        }
        other => Err(Error::config(format!("unknown command {:?}", other))),
    }
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Log to stderr; stdout carries the ExecCredential.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1..=3 => "info",
        4 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
