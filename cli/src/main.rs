mod commands;
mod verify;

use std::env;
use std::path::PathBuf;

use cipherpay_config::CipherPayConfig;

/// Options shared by every command.
#[derive(Debug, Default)]
struct GlobalOptions {
    config_path: Option<PathBuf>,
    json: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let (options, rest) = parse_global_args(&args[1..]);
    let Some(cmd) = rest.first() else {
        print_usage();
        return;
    };

    if matches!(cmd.as_str(), "help" | "--help" | "-h") {
        print_usage();
        return;
    }
    if cmd == "config" {
        if let Err(e) = run_config(&options, &rest[1..]) {
            eprintln!("❌ Error: {e:#}");
            std::process::exit(1);
        }
        return;
    }
    if cmd == "verify" {
        let Some(path) = rest.get(1) else {
            println!("Usage: verify <proof.json>");
            return;
        };
        match verify::verify_file(path.as_ref()) {
            Ok(true) => println!("✅ Proof is valid"),
            Ok(false) => {
                println!("❌ Proof is invalid");
                std::process::exit(2);
            }
            Err(e) => {
                eprintln!("❌ Error verifying proof: {e:#}");
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error loading configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cmd.as_str() {
        "status" => commands::status(config, options.json).await,
        "notes" => commands::notes(config, options.json).await,
        "view-key" => commands::view_key(config).await,
        "transfer" => match (rest.get(1), rest.get(2)) {
            (Some(recipient), Some(amount)) => {
                let submit = rest[3..].iter().any(|a| a == "--submit");
                commands::transfer(config, recipient, amount, submit).await
            }
            _ => {
                println!("Usage: transfer <recipient> <amount> [--submit]");
                return;
            }
        },
        "deposit" => match rest.get(1) {
            Some(amount) => commands::deposit(config, amount).await,
            None => {
                println!("Usage: deposit <amount>");
                return;
            }
        },
        "demo" => commands::demo(config).await,
        _ => {
            println!("❌ Unknown command: {cmd}");
            println!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

/// Split leading global flags from the command and its arguments.
fn parse_global_args(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut options = GlobalOptions::default();
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.get(i + 1) {
                    options.config_path = Some(PathBuf::from(path));
                    i += 1;
                }
            }
            "--json" => options.json = true,
            other => rest.push(other.to_string()),
        }
        i += 1;
    }

    (options, rest)
}

fn load_config(options: &GlobalOptions) -> anyhow::Result<CipherPayConfig> {
    match &options.config_path {
        Some(path) => CipherPayConfig::load_from(path),
        None => CipherPayConfig::load(),
    }
}

fn run_config(options: &GlobalOptions, args: &[String]) -> anyhow::Result<()> {
    match args.first().map(String::as_str) {
        Some("sample") => {
            print!("{}", CipherPayConfig::generate_sample());
            Ok(())
        }
        Some("show") | None => {
            let config = load_config(options)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some("path") => {
            match CipherPayConfig::default_config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("(no home directory)"),
            }
            Ok(())
        }
        Some(other) => anyhow::bail!("unknown config subcommand: {other}"),
    }
}

fn print_usage() {
    println!("CipherPay CLI - privacy wallet developer tool");
    println!();
    println!("USAGE:");
    println!("  cipherpay [--config <file>] [--json] <command> [args]");
    println!();
    println!("WALLET COMMANDS:");
    println!("  status                          Service, session and balance summary");
    println!("  notes                           List every known note");
    println!("  transfer <to> <amount> [--submit]");
    println!("                                  Prove a transfer, optionally submit it");
    println!("  deposit <amount>                Deposit public funds into the pool");
    println!("  view-key                        Print the wallet view key");
    println!("  demo                            Run a full transfer on the simulated backend");
    println!();
    println!("PROOF COMMANDS:");
    println!("  verify <proof.json>             Verify {{proof, publicSignals, verifierKey}}");
    println!();
    println!("CONFIG COMMANDS:");
    println!("  config sample                   Print a sample config.toml");
    println!("  config show                     Print the effective configuration");
    println!("  config path                     Print the default config location");
    println!();
    println!("EXAMPLES:");
    println!("  cipherpay config sample > config.toml");
    println!("  cipherpay demo");
    println!("  cipherpay transfer 0x52908400098527886E0F7030069857D2E4169EE7 1000 --submit");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  CP_CONFIG            Config file path");
    println!("  CP_BACKEND           real | simulated");
    println!("  CP_RELAYER_URL       Relay service endpoint");
    println!("  CP_PROVER_URL        Prover service endpoint");
    println!("  RUST_LOG             Log level (debug/info/warn/error)");
}
