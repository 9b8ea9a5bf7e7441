//! Decode the `name` section of a module and print it as JSON.
//!
//! Usage: wasm-boundary <module.wasm> [--config FILE] [--strategy NAME] [-v...]

use std::env;
use std::fs;
use std::process::ExitCode;

use tracing::warn;
use tracing_subscriber::EnvFilter;
use wasm_boundary::config::Config;
use wasm_boundary::parser;
use wasm_boundary::utf8::Strategy;

/// Bytes shown either side of a diagnostic offset.
const CONTEXT_BYTES: usize = 8;

fn print_help(prog: &str) {
    eprintln!("Usage: {} <module.wasm> [options]", prog);
    eprintln!();
    eprintln!("Decodes the name section of a module and prints it as JSON.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config FILE     JSON configuration file");
    eprintln!("  --strategy NAME   UTF-8 validation strategy (scalar, swar, vector)");
    eprintln!("  -v                Increase log verbosity (repeatable)");
    eprintln!("  -h, --help        Show this help message");
}

struct Options {
    module: String,
    config: Option<String>,
    strategy: Option<Strategy>,
    verbose: u8,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut module = None;
    let mut config = None;
    let mut strategy = None;
    let mut verbose = 0u8;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config = Some(args.get(i).ok_or("--config requires a file")?.clone());
            }
            "--strategy" => {
                i += 1;
                let name = args.get(i).ok_or("--strategy requires a name")?;
                let parsed = serde_json::from_value(serde_json::Value::String(name.clone()))
                    .map_err(|_| format!("unknown strategy: {}", name))?;
                strategy = Some(parsed);
            }
            flag if flag.len() > 1 && flag.starts_with('-') && flag[1..].chars().all(|c| c == 'v') => {
                verbose = verbose.saturating_add((flag.len() - 1) as u8);
            }
            other if other.starts_with('-') => return Err(format!("Unknown option: {}", other)),
            other => {
                if module.replace(other.to_string()).is_some() {
                    return Err("only one module may be given".to_string());
                }
            }
        }
        i += 1;
    }

    Ok(Options {
        module: module.ok_or("no module given")?,
        config,
        strategy,
        verbose,
    })
}

fn context(bytes: &[u8], offset: usize) -> String {
    let start = offset.saturating_sub(CONTEXT_BYTES).min(bytes.len());
    let end = offset.saturating_add(CONTEXT_BYTES).min(bytes.len());
    hex::encode(&bytes[start..end])
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("wasm-boundary");

    if args.len() < 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_help(prog);
        return if args.len() < 2 { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            print_help(prog);
            return ExitCode::FAILURE;
        }
    };

    let log_level = match options.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wasm_boundary={}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &options.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if options.strategy.is_some() {
        config.utf8 = options.strategy;
    }

    let bytes = match fs::read(&options.module) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {}", options.module, e);
            return ExitCode::FAILURE;
        }
    };

    let names = match parser::parse_names(&bytes, &config.name_decoder()) {
        Ok(names) => names,
        Err(e) => {
            eprintln!("Error parsing {}: {}", options.module, e);
            return ExitCode::FAILURE;
        }
    };

    for diagnostic in &names.diagnostics {
        warn!(
            offset = diagnostic.offset,
            context = %context(&bytes, diagnostic.offset),
            "{}",
            diagnostic.kind
        );
    }

    match serde_json::to_string_pretty(&names) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if names.diagnostics.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(&args(&["prog", "m.wasm", "-vv", "--strategy", "swar"])).unwrap();
        assert_eq!(options.module, "m.wasm");
        assert_eq!(options.verbose, 2);
        assert_eq!(options.strategy, Some(Strategy::Swar));
        assert!(options.config.is_none());

        assert!(parse_args(&args(&["prog", "m.wasm", "--strategy", "avx"])).is_err());
        assert!(parse_args(&args(&["prog", "--config"])).is_err());
        assert!(parse_args(&args(&["prog", "a.wasm", "b.wasm"])).is_err());
    }

    #[test]
    fn test_context() {
        let bytes: Vec<u8> = (0..32).collect();
        assert_eq!(context(&bytes, 0), "0001020304050607");
        assert_eq!(context(&bytes, 31), "1718191a1b1c1d1e1f");
        assert_eq!(context(&bytes, 100), "");
    }
}
