use std::{env, env::VarError};

/// Environment variables that are safe to print.
const DISPLAY_ENVS: [&str; 11] = [
    "RUST_LOG",
    "ESC_HOST",
    "ESC_PORT",
    "ESC_DATABASE_URL",
    "ESC_AUTO_RELEASE_ENABLED",
    "ESC_AUTO_RELEASE_INTERVAL",
    "ESC_MAX_CONCURRENT_RELEASES",
    "ESC_RELEASE_CLAIM_TIMEOUT",
    "ESC_BANK_API_URL",
    "ESC_BANK_CURRENCY",
    "ESC_GATEWAY_TIMEOUT",
];

/// Environment variables holding secrets. Only their presence is reported.
const SECRET_ENVS: [&str; 2] = ["ESC_JWT_SECRET", "ESC_BANK_SECRET_KEY"];

/// The server takes no arguments. Any argument at all prints the help text and the current configuration, and the
/// caller should exit.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    });
    SECRET_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) if !s.trim().is_empty() => "Set (hidden)",
            _ => "Not set",
        };
        println!("  {name:<35} {val:<15}");
    });
}
