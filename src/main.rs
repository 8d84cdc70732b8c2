mod cli;
mod config;
mod error;
mod probe;
mod quote;
mod report;
mod runner;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use runner::RunResult;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let mut cfg = Config::load();
    if let Some(flavor) = cli.interpreter {
        if flavor != cfg.interpreter {
            cfg.program = None;
        }
        cfg.interpreter = flavor;
    }

    match cli.command {
        Commands::Info => {
            print_info(&cfg);
            ExitCode::SUCCESS
        }
        Commands::Init { global } => create_config(global),
        Commands::Check => {
            let runner = cfg.runner();
            let command = runner.interpreter().self_test_command();
            let result = runner.execute_command(command, None).await;
            let status =
                report::status_message("interpreter is working", "interpreter test failed", &result);
            println!("[gtm] {status}");
            if result.succeeded {
                println!("  {}", result.stdout.trim());
            }
            exit_code(&result)
        }
        Commands::Ping { hosts } => {
            let probes = probe::probe_all(&cfg.runner(), &hosts, cfg.max_parallel).await;
            for p in &probes {
                let state = if p.reachable { "reachable" } else { "unreachable" };
                println!("{}: {state}", p.host);
            }
            println!("[ping] {}", probe::summary(&probes));
            if probes.iter().all(|p| p.reachable) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Exec { timeout, command } => {
            let command = command.join(" ");
            let result = cfg
                .runner()
                .execute_command(&command, timeout.map(Duration::from_secs))
                .await;
            println!("{}", report::render("exec", &result, &cfg));
            exit_code(&result)
        }
        Commands::Script {
            timeout,
            path,
            args,
        } => {
            let result = cfg
                .runner()
                .execute_script(&path, &args, timeout.map(Duration::from_secs))
                .await;
            println!("{}", report::render("script", &result, &cfg));
            exit_code(&result)
        }
    }
}

/// Log to stderr so diagnostics never mix with captured output. `GTM_LOG`
/// takes an `EnvFilter` directive, default `warn`.
fn init_logging() {
    let filter = EnvFilter::try_from_env("GTM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(result: &RunResult) -> ExitCode {
    ExitCode::from(exit_status(result))
}

/// Mirror the child's exit status; reserved negative codes become 1.
fn exit_status(result: &RunResult) -> u8 {
    if result.succeeded {
        return 0;
    }
    match u8::try_from(result.exit_code) {
        Ok(code) if code != 0 => code,
        _ => 1,
    }
}

fn print_info(cfg: &Config) {
    let interp = cfg.interpreter();
    println!("[gtm info]");
    println!("  version: {}", env!("CARGO_PKG_VERSION"));
    println!("  interpreter: {} ({})", interp.flavor, interp.program);
    println!("  timeout_secs: {}", cfg.timeout_secs);
    println!("  max_parallel: {}", cfg.max_parallel);
    println!("  max_lines: {}", cfg.max_lines);
    println!("  max_line_len: {}", cfg.max_line_len);
    println!("  show_footer: {}", cfg.show_footer);
}

fn create_config(global: bool) -> ExitCode {
    let path = if global {
        let Some(file) = config::global_config_path() else {
            eprintln!("[gtm] error: could not determine config directory");
            return ExitCode::FAILURE;
        };
        if let Some(parent) = file.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            eprintln!("[gtm] error: could not create {}: {e}", parent.display());
            return ExitCode::FAILURE;
        }
        file
    } else {
        std::path::PathBuf::from(config::PROJECT_FILE)
    };

    if path.exists() {
        println!("[gtm] config already exists: {}", path.display());
        return ExitCode::SUCCESS;
    }

    match std::fs::write(&path, Config::default_toml()) {
        Ok(()) => {
            println!("[gtm] created {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("[gtm] error: could not write {}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
