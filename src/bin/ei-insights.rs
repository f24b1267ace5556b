use std::path::Path;

use chrono::{Duration, Local, NaiveDate, TimeZone, Utc};
use ei_insights::{
    logging, settings, storage::SecureStorage, ElectricIrelandScraper, PortalSettings,
    UsageDatapoint,
};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug)]
struct CliArgs {
    command: String,
    format: OutputFormat,
    pretty: bool,
    date: Option<String>,
    granular: bool,
    username: Option<String>,
    account: Option<String>,
    password: Option<String>,
    verbose: bool,
    log_file: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsagePayload {
    date: String,
    granular: bool,
    total_consumption: f64,
    total_cost: f64,
    datapoints: Vec<UsageDatapoint>,
}

#[tokio::main]
async fn main() {
    let args = parse_args(std::env::args().skip(1).collect());
    if args.command == "--help" || args.command == "-h" {
        print_help();
        return;
    }
    if args.command == "--version" || args.command == "-V" {
        println!("ei-insights {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    ei_insights::init_logging(args.verbose);

    let result = match args.command.as_str() {
        "usage" => run_usage(&args).await,
        "bill" => run_bill(&args).await,
        "login" => run_login(&args),
        "logout" => run_logout(),
        _ => Err(format!(
            "Unknown command: {}. Use --help for usage.",
            args.command
        )),
    };

    if let Err(message) = result {
        tracing::debug!("Command {} failed: {}", args.command, message);
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn parse_args(mut argv: Vec<String>) -> CliArgs {
    let mut args = CliArgs {
        command: String::new(),
        format: OutputFormat::Text,
        pretty: false,
        date: None,
        granular: false,
        username: None,
        account: None,
        password: None,
        verbose: false,
        log_file: false,
    };

    if let Some(first) = argv.first() {
        if !first.starts_with('-') {
            args.command = argv.remove(0);
        }
    }

    if args.command.is_empty() {
        args.command = "usage".to_string();
    }

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => {
                if let Some(value) = iter.next() {
                    if value == "json" {
                        args.format = OutputFormat::Json;
                    } else if value == "text" {
                        args.format = OutputFormat::Text;
                    }
                }
            }
            "--json" => args.format = OutputFormat::Json,
            "--pretty" => args.pretty = true,
            "--date" => args.date = iter.next(),
            "--granular" | "--hourly" => args.granular = true,
            "--username" => args.username = iter.next(),
            "--account" => args.account = iter.next(),
            "--password" => args.password = iter.next(),
            "--log-file" => args.log_file = true,
            "-v" | "--verbose" => args.verbose = true,
            "--help" | "-h" | "--version" | "-V" => {
                args.command = arg;
                break;
            }
            _ => {}
        }
    }

    args
}

async fn run_usage(args: &CliArgs) -> Result<(), String> {
    let date = target_date(args.date.as_deref())?;
    let mut scraper = connect(args)?;

    scraper
        .ensure_authenticated()
        .await
        .map_err(|err| format!("Login failed: {err}"))?;
    let datapoints = scraper
        .fetch_usage(date, args.granular)
        .await
        .map_err(|err| format!("Failed to get usage for {date}: {err}"))?;

    let payload = UsagePayload {
        date: date.format("%Y-%m-%d").to_string(),
        granular: args.granular,
        total_consumption: datapoints.iter().map(|point| point.consumption).sum(),
        total_cost: datapoints.iter().map(|point| point.cost).sum(),
        datapoints,
    };

    match args.format {
        OutputFormat::Text => println!("{}", render_usage_text(&payload)),
        OutputFormat::Json => print_json(&payload, args.pretty)?,
    }

    Ok(())
}

async fn run_bill(args: &CliArgs) -> Result<(), String> {
    let mut scraper = connect(args)?;

    scraper
        .ensure_authenticated()
        .await
        .map_err(|err| format!("Login failed: {err}"))?;
    let projection = scraper
        .fetch_bill_projection()
        .await
        .map_err(|err| format!("Failed to get bill projection: {err}"))?;

    match args.format {
        OutputFormat::Text => println!("{}", render_bill_text(&projection)),
        OutputFormat::Json => print_json(&projection, args.pretty)?,
    }

    Ok(())
}

fn run_login(args: &CliArgs) -> Result<(), String> {
    let path = settings::settings_path().map_err(|err| format!("{err:#}"))?;
    let portal_settings = login_settings(args, &path)?;

    let password = args
        .password
        .clone()
        .or_else(|| std::env::var(settings::PASSWORD_ENV).ok())
        .filter(|password| !password.is_empty());
    if let Some(password) = password {
        SecureStorage::new()
            .store_password(&portal_settings.username, &password)
            .map_err(|err| format!("Failed to store password: {err}"))?;
        println!("Stored password for {} in the system keyring", portal_settings.username);
    }

    portal_settings
        .save_to(&path)
        .map_err(|err| format!("{err:#}"))?;
    println!("Saved settings to {}", path.display());
    Ok(())
}

/// The settings file as stored, without environment overrides, updated
/// from the login flags
fn login_settings(args: &CliArgs, path: &Path) -> Result<PortalSettings, String> {
    let mut portal_settings =
        PortalSettings::load_from(path).map_err(|err| format!("{err:#}"))?;

    if let Some(username) = args.username.as_ref() {
        portal_settings.username = username.trim().to_string();
    }
    if let Some(account) = args.account.as_ref() {
        portal_settings.account_number = account.trim().to_string();
    }
    if portal_settings.username.is_empty() || portal_settings.account_number.is_empty() {
        return Err("login needs --username and --account".to_string());
    }

    Ok(portal_settings)
}

fn run_logout() -> Result<(), String> {
    let portal_settings = PortalSettings::load().map_err(|err| format!("{err:#}"))?;
    if portal_settings.username.is_empty() {
        return Err("No username configured".to_string());
    }

    SecureStorage::new()
        .delete_password(&portal_settings.username)
        .map_err(|err| format!("Failed to remove password: {err}"))?;
    println!("Removed stored password for {}", portal_settings.username);
    Ok(())
}

fn connect(args: &CliArgs) -> Result<ElectricIrelandScraper, String> {
    let portal_settings = PortalSettings::load().map_err(|err| format!("{err:#}"))?;
    logging::set_file_logging(args.log_file || portal_settings.log_to_file);

    let password = settings::resolve_password(&portal_settings.username)
        .map_err(|err| format!("{err:#}"))?;
    let credentials = portal_settings
        .credentials(password)
        .map_err(|err| format!("{err:#}"))?;

    ElectricIrelandScraper::new(credentials)
        .with_timeout(portal_settings.request_timeout())
        .with_base_url(&portal_settings.base_url)
        .map_err(|err| err.to_string())
}

fn target_date(value: Option<&str>) -> Result<NaiveDate, String> {
    match value {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|_| format!("Invalid date {text}; expected YYYY-MM-DD")),
        None => Ok(Local::now().date_naive() - Duration::days(1)),
    }
}

fn render_usage_text(payload: &UsagePayload) -> String {
    let mut lines = Vec::new();
    let resolution = if payload.granular { "hourly" } else { "daily" };
    lines.push(format!("== Usage {} ({resolution}) ==", payload.date));

    if payload.datapoints.is_empty() {
        lines.push("No data available".to_string());
        return lines.join("\n");
    }

    for point in &payload.datapoints {
        lines.push(format!(
            "{}  {:>9.3} kWh  {:>8}",
            format_interval_end(point.interval_end),
            point.consumption,
            format_eur(point.cost)
        ));
    }
    lines.push(format!(
        "Total: {:.3} kWh · {}",
        payload.total_consumption,
        format_eur(payload.total_cost)
    ));
    lines.join("\n")
}

fn render_bill_text(projection: &serde_json::Value) -> String {
    let mut lines = vec!["== Bill projection ==".to_string()];
    match projection {
        serde_json::Value::Object(fields) if !fields.is_empty() => {
            for (key, value) in fields {
                let value = match value {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                lines.push(format!("{key}: {value}"));
            }
        }
        other => lines.push(other.to_string()),
    }
    lines.join("\n")
}

fn format_interval_end(epoch: i64) -> String {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

fn format_eur(amount: f64) -> String {
    format!("€{:.2}", amount)
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> Result<(), String> {
    let output = if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }
    .map_err(|err| err.to_string())?;
    println!("{output}");
    Ok(())
}

fn print_help() {
    println!(
        "ei-insights {}\n\nUsage:\n  ei-insights usage [--date YYYY-MM-DD] [--granular] [--format text|json] [--pretty]\n  ei-insights bill [--format text|json] [--pretty]\n  ei-insights login --username <email> --account <number> [--password <password>]\n  ei-insights logout\n\nCommands:\n  usage   Print electricity usage for one day (default: yesterday)\n  bill    Print the provider's bill projection\n  login   Save account settings and store the password in the keyring\n  logout  Remove the stored password\n\nFlags:\n  --date <YYYY-MM-DD>   Day to fetch\n  --granular            Hourly readings instead of the daily total\n  --format <text|json>  Output format\n  --json                Shortcut for --format json\n  --pretty              Pretty-print JSON output\n  --log-file            Also write logs to the data directory\n  -v, --verbose         Debug logging\n  -h, --help            Show help\n  -V, --version         Show version\n\nEnvironment:\n  EI_USERNAME, EI_PASSWORD, EI_ACCOUNT_NUMBER, EI_BASE_URL, EI_INSIGHTS_SETTINGS",
        env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn defaults_to_daily_usage_as_text() {
        let args = parse_args(Vec::new());

        assert_eq!(args.command, "usage");
        assert_eq!(args.format, OutputFormat::Text);
        assert!(!args.granular);
        assert!(args.date.is_none());
    }

    #[test]
    fn parses_usage_flags() {
        let args = parse_args(argv(&[
            "usage",
            "--date",
            "2024-06-01",
            "--granular",
            "--json",
            "--pretty",
        ]));

        assert_eq!(args.command, "usage");
        assert_eq!(args.date.as_deref(), Some("2024-06-01"));
        assert!(args.granular);
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.pretty);
    }

    #[test]
    fn parses_login_flags() {
        let args = parse_args(argv(&[
            "login",
            "--username",
            "me@example.com",
            "--account",
            "100000001",
        ]));

        assert_eq!(args.command, "login");
        assert_eq!(args.username.as_deref(), Some("me@example.com"));
        assert_eq!(args.account.as_deref(), Some("100000001"));
        assert!(args.password.is_none());
    }

    #[test]
    fn login_saves_file_values_not_environment_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        std::env::set_var(settings::BASE_URL_ENV, "http://127.0.0.1:9999");
        std::env::set_var(settings::ACCOUNT_NUMBER_ENV, "900000009");

        let args = parse_args(argv(&[
            "login",
            "--username",
            "u@example.com",
            "--account",
            "100000001",
        ]));
        let portal_settings = login_settings(&args, &path).expect("settings");
        portal_settings.save_to(&path).expect("save");

        std::env::remove_var(settings::BASE_URL_ENV);
        std::env::remove_var(settings::ACCOUNT_NUMBER_ENV);

        let saved = PortalSettings::load_from(&path).expect("load");
        assert_eq!(saved.base_url, ei_insights::portal::DEFAULT_BASE_URL);
        assert_eq!(saved.username, "u@example.com");
        assert_eq!(saved.account_number, "100000001");
    }

    #[test]
    fn login_requires_username_and_account() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = parse_args(argv(&["login", "--username", "u@example.com"]));

        assert!(login_settings(&args, &dir.path().join("settings.json")).is_err());
    }

    #[test]
    fn help_flag_wins() {
        assert_eq!(parse_args(argv(&["bill", "--help"])).command, "--help");
        assert_eq!(parse_args(argv(&["-V"])).command, "-V");
    }

    #[test]
    fn validates_target_date() {
        assert_eq!(
            target_date(Some("2024-06-01")),
            Ok(NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"))
        );
        assert!(target_date(Some("01/06/2024")).is_err());
    }

    #[test]
    fn renders_usage_lines_and_total() {
        let payload = UsagePayload {
            date: "2024-06-01".to_string(),
            granular: true,
            total_consumption: 1.5,
            total_cost: 0.45,
            datapoints: vec![
                UsageDatapoint {
                    consumption: 0.5,
                    cost: 0.15,
                    interval_end: 1717203600,
                },
                UsageDatapoint {
                    consumption: 1.0,
                    cost: 0.30,
                    interval_end: 1717207200,
                },
            ],
        };

        let text = render_usage_text(&payload);
        assert!(text.starts_with("== Usage 2024-06-01 (hourly) =="));
        assert!(text.contains("2024-06-01 01:00 UTC"));
        assert!(text.contains("Total: 1.500 kWh · €0.45"));
    }

    #[test]
    fn renders_empty_usage() {
        let payload = UsagePayload {
            date: "2024-06-01".to_string(),
            granular: false,
            total_consumption: 0.0,
            total_cost: 0.0,
            datapoints: Vec::new(),
        };

        assert!(render_usage_text(&payload).ends_with("No data available"));
    }
}
