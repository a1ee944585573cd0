use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};
use std::path::PathBuf;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_JSON: &str = "log-json";
pub const ARG_API_BASE_URL: &str = "api-base-url";
pub const ARG_STORE_DIR: &str = "store-dir";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

fn email_arg() -> Arg {
    Arg::new("email")
        .long("email")
        .short('e')
        .help("Account email address")
        .env("TRIPKEY_EMAIL")
        .required(true)
}

fn otp() -> Command {
    Command::new("otp")
        .about("Sign in with an emailed one-time code")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("verify")
                .about("Exchange a code for a session")
                .arg(email_arg())
                .arg(
                    Arg::new("code")
                        .long("code")
                        .short('c')
                        .help("The code from the email")
                        .env("TRIPKEY_OTP_CODE")
                        .hide_env_values(true)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("resend")
                .about("Ask the server to email a new code")
                .arg(email_arg()),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("tripkey")
        .about("Passwordless session client for the trip dashboard")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_API_BASE_URL)
                .long("api-base-url")
                .short('u')
                .help("Backend base URL, example: https://api.trips.example/v1")
                .env("TRIPKEY_API_BASE_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_STORE_DIR)
                .long("store-dir")
                .short('s')
                .help("Directory holding the stored session (default: $XDG_CONFIG_HOME/tripkey)")
                .env("TRIPKEY_STORE_DIR")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_LOG_JSON)
                .long("log-json")
                .help("Write log lines as JSON")
                .env("TRIPKEY_LOG_JSON")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("TRIPKEY_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(Command::new("status").about("Show the stored session"))
        .subcommand(Command::new("whoami").about("Show the signed-in identity"))
        .subcommand(Command::new("refresh").about("Rotate the token pair now"))
        .subcommand(Command::new("logout").about("Forget the stored session"))
        .subcommand(
            Command::new("can")
                .about("Check whether the signed-in user may perform an action")
                .arg(Arg::new("resource").help("Resource name, example: trips").required(true))
                .arg(Arg::new("action").help("Action name, example: create").required(true))
                .arg(
                    Arg::new("rules")
                        .long("rules")
                        .help("JSON rule table replacing the built-in dashboard rules")
                        .env("TRIPKEY_RULES")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(otp())
        .subcommand(
            Command::new("get")
                .about("GET a backend path with the stored session")
                .arg(Arg::new("path").help("Path relative to the base URL").required(true)),
        )
}
