mod terminal;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use fedlogin_core::accounts::Account;
use fedlogin_core::auth::{
    event_channel, AttemptOutcome, AuthManager, AuthMode, AuthObserver, CaptureStrategy,
    LoginRequest, TokenSource,
};
use fedlogin_core::config::{AuthSettings, ConfigLocator};
use serde_json::json;
use terminal::{PasteContext, TerminalBrowser};

#[derive(Parser, Debug)]
#[command(author, version, about = "Federated OIDC/SAML login for privileged account access")]
struct Cli {
    /// Diagnostic log format written to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// Diagnostic log filter (e.g. `debug`, `fedlogin_core=trace`)
    #[arg(long, global = true, env = "FEDLOGIN_LOG", default_value = "warn")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in through the tenant's identity provider and list accounts
    Login(LoginArgs),
    /// Inspect effective settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective settings as JSON
    Show,
    /// Print the settings file location
    Path,
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Tenant identifier (first label of the identity host)
    #[arg(long, env = "FEDLOGIN_TENANT")]
    tenant: String,
    /// User name sent to StartAuthentication
    #[arg(long, env = "FEDLOGIN_USER")]
    user: String,
    /// Federation protocol: oidc or saml
    #[arg(long, env = "FEDLOGIN_MODE", default_value_t = AuthMode::Oidc)]
    mode: AuthMode,
    /// Credential capture strategy: auto, interception or cookie
    #[arg(long)]
    capture: Option<CaptureStrategy>,
    /// Print the sign-in URL without launching a browser
    #[arg(long = "no-browser")]
    no_browser: bool,
    /// Output accounts as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log, cli.log_format);
    match cli.command {
        Commands::Login(args) => login(args).await?,
        Commands::Config(cmd) => match cmd {
            ConfigCommand::Show => config_show()?,
            ConfigCommand::Path => config_path()?,
        },
    }
    Ok(())
}

fn init_tracing(filter: &str, format: LogFormat) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    drop(result);
}

fn load_settings() -> Result<(ConfigLocator, AuthSettings)> {
    let locator = ConfigLocator::new().context("unable to locate configuration directory")?;
    let settings = AuthSettings::load(&locator).context("failed to load settings")?;
    Ok((locator, settings))
}

async fn login(args: LoginArgs) -> Result<()> {
    let (_, mut settings) = load_settings()?;
    if let Some(capture) = args.capture {
        settings.capture = capture;
    }

    let landing = settings
        .identity_base(&args.tenant)
        .with_context(|| format!("invalid tenant '{}'", args.tenant))?;
    let context = PasteContext::new(&settings, args.mode, landing)
        .context("invalid SAML callback path")?;
    let (sender, events) = event_channel();
    let browser = TerminalBrowser::new(sender, &settings, context, !args.no_browser);
    let manager =
        AuthManager::new(settings, browser, events).context("failed to build HTTP clients")?;

    let observer = ConsoleObserver { json: args.json };
    let request = LoginRequest::new(args.tenant, args.user, args.mode);
    let (session, accounts) = match manager.authenticate(&request, &observer).await? {
        AttemptOutcome::Completed { session, accounts } => (session, accounts),
        AttemptOutcome::NoRedirect { reason } => {
            return Err(anyhow!("sign-in could not start: {reason}"));
        }
    };

    if args.json {
        let output = json!({
            "subdomain": session.resource_subdomain,
            "tokenSource": match session.source {
                TokenSource::Exchange => "exchange",
                TokenSource::Cookie => "cookie",
            },
            "identity": session.claims.as_ref().and_then(|claims| claims.identity()),
            "accounts": accounts,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Login succeeded for '{}'.", session.resource_subdomain);
    if let Some(claims) = &session.claims {
        if let Some(identity) = claims.identity() {
            println!("Logged in as {identity}");
        }
        if let Some(expiry) = claims.expires_at {
            println!("Token expires at {expiry} (UTC).");
        }
    }
    Ok(())
}

fn config_show() -> Result<()> {
    let (_, settings) = load_settings()?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn config_path() -> Result<()> {
    let locator = ConfigLocator::new().context("unable to locate configuration directory")?;
    println!("{}", locator.settings_file().display());
    Ok(())
}

/// Progress lines go to stderr; the account table goes to stdout.
struct ConsoleObserver {
    json: bool,
}

impl AuthObserver for ConsoleObserver {
    fn log(&self, line: &str) {
        eprintln!("[{}] {line}", Local::now().format("%H:%M:%S"));
    }

    fn display_accounts(&self, accounts: &[Account]) {
        if self.json {
            return;
        }
        render_accounts(accounts);
    }
}

fn render_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("No accounts returned.");
        return;
    }
    println!(
        "{:<32} {:<24} {:<32} {:<20}",
        "NAME", "USERNAME", "ADDRESS", "PLATFORM"
    );
    println!("{}", "-".repeat(110));
    for account in accounts {
        println!(
            "{:<32} {:<24} {:<32} {:<20}",
            truncate(&account.name, 32),
            truncate(&account.user_name, 24),
            truncate(&account.address, 32),
            truncate(&account.platform_id, 20)
        );
    }
}

fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        return value.to_owned();
    }
    let mut collected: String = value.chars().take(max_len.saturating_sub(1)).collect();
    collected.push('…');
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_values() {
        assert_eq!(truncate("root", 8), "root");
        assert_eq!(truncate("exactly8", 8), "exactly8");
    }

    #[test]
    fn truncate_marks_cut_values() {
        assert_eq!(truncate("database-admin", 8), "databas…");
        assert_eq!(truncate("ééééééééé", 4), "ééé…");
    }

    #[test]
    fn cli_parses_login_flags() {
        let cli = Cli::try_parse_from([
            "fedlogin",
            "login",
            "--tenant",
            "acme",
            "--user",
            "ada@acme.test",
            "--mode",
            "saml",
            "--capture",
            "cookie",
            "--no-browser",
        ])
        .unwrap();
        match cli.command {
            Commands::Login(args) => {
                assert_eq!(args.mode, AuthMode::Saml);
                assert_eq!(args.capture, Some(CaptureStrategy::CookieScan));
                assert!(args.no_browser);
                assert!(!args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
