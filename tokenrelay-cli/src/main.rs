//! tokenrelay CLI
//!
//! Sends authenticated requests to a configured API, renewing the access
//! token transparently when it has expired.
//!
//! # Usage
//!
//! ```bash
//! # Store tokens issued by a sign-in elsewhere
//! tokenrelay import --access eyJ... --refresh 3f1c... --user 42
//!
//! # Call the API
//! tokenrelay request GET /api/v1/courses
//! tokenrelay request POST /api/v1/avatars --file avatar=me.png
//!
//! # Inspect or end the session
//! tokenrelay status
//! tokenrelay logout
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokenrelay_cli::{App, CliConfig, RequestSpec, build_request, load_config, parse_key_value};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "tokenrelay")]
#[command(about = "Authenticated API requests with transparent token renewal")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an externally issued token pair as the current session
    Import {
        /// Access token
        #[arg(long)]
        access: String,

        /// Refresh token
        #[arg(long)]
        refresh: String,

        /// Identifier of the signed-in user
        #[arg(long)]
        user: String,
    },

    /// Send a request to the configured API
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Path relative to the base URL, e.g. /api/v1/courses
        path: String,

        /// JSON request body
        #[arg(long)]
        json: Option<String>,

        /// Query parameter (key=value, repeatable)
        #[arg(short, long = "query", value_parser = parse_pair)]
        query: Vec<(String, String)>,

        /// Multipart text field (key=value, repeatable)
        #[arg(long = "form", value_parser = parse_pair)]
        form: Vec<(String, String)>,

        /// Multipart file field (key=path, repeatable)
        #[arg(long = "file", value_parser = parse_pair)]
        file: Vec<(String, String)>,
    },

    /// Show the stored session
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Clear stored credentials
    Logout,
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    parse_key_value(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);
    debug!("Loaded configuration from {:?}", config.config_path);

    let app = App::open(&config).await?;

    match cli.command {
        Commands::Import {
            access,
            refresh,
            user,
        } => {
            app.import(&access, &refresh, &user).await?;
            println!("Session stored for user {}", user);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Request {
            method,
            path,
            json,
            query,
            form,
            file,
        } => {
            let spec = RequestSpec {
                method,
                path,
                json,
                query,
                form,
                files: file,
            };
            send_request(&app, &config, &spec).await
        }
        Commands::Status { format } => {
            show_status(&app, &format).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logout => {
            app.logout().await?;
            println!("Logged out");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(config: &CliConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn send_request(app: &App, config: &CliConfig, spec: &RequestSpec) -> Result<ExitCode> {
    let request = build_request(spec)?;

    let result = match app.client.refresh_if_expiring(chrono::Duration::seconds(30)).await {
        Ok(_) => app.client.send(request).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => {
            debug!("{} {}", response.status, spec.path);
            match response.json::<serde_json::Value>() {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{}", response.text()),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_session_ended() => {
            app.forget_session().await?;
            eprintln!("Session expired: {}", e);
            eprintln!(
                "Sign in again and run `tokenrelay import` (config: {:?})",
                config.config_path
            );
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            if let Some(body) = e.http().and_then(|h| h.body.as_deref()).filter(|b| !b.is_empty()) {
                eprintln!("{}", body);
            }
            eprintln!("Request failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn show_status(app: &App, format: &str) -> Result<()> {
    let report = app.status().await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            if report.signed_in {
                println!("Signed in");
            } else {
                println!("Not signed in");
            }
            println!("  User: {}", report.user_id.as_deref().unwrap_or("-"));
            println!("  Access token: {}", presence(report.has_access_token));
            println!("  Refresh token: {}", presence(report.has_refresh_token));
            if let Some(expires_at) = report.expires_at {
                println!(
                    "  Expires: {} ({})",
                    expires_at.to_rfc3339(),
                    report.expires_in.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn presence(present: bool) -> &'static str {
    if present { "stored" } else { "missing" }
}
