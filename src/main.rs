use anyhow::Result;
use ssh_relay::{cli::Cli, config::SessionConfig, run};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let outcome = SessionConfig::from_cli(&cli).and_then(run);

    if let Err(e) = outcome {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
