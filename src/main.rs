mod app;
mod cli;

use clap::Parser;
use cli::{CheckArgs, Cli, Command, RunArgs};
use keymeter_core::config::Config;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => cmd_run(args),
        Command::CheckConfig(args) => cmd_check_config(args),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    // Peek at the logging section before the subscriber exists
    let peeked = Config::load(&args.config).ok();
    let to_file = peeked.as_ref().is_some_and(|c| c.logging_to_file);
    let log_dir = peeked.as_ref().and_then(|c| c.log_dir.clone());
    let _guard = keymeter_core::lifecycle::logging::init_logging(
        &args.log_level,
        to_file,
        log_dir.as_deref(),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let application = app::Application::build(&args)?;
        application.serve().await
    })
}

fn cmd_check_config(args: CheckArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let active = config.api_keys.iter().filter(|k| k.is_active()).count();
    println!("{}: OK", args.config);
    println!("  listen:       {}:{}", config.host, config.port);
    println!("  timezone:     {}", config.timezone);
    println!(
        "  api keys:     {} ({active} active)",
        config.api_keys.len()
    );
    println!("  admin tokens: {}", config.admin_tokens.len());
    println!("  ledger size:  {}", config.usage.capacity);
    Ok(())
}
