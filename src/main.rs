use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use stockgate::{
    ApiClient, ApiRequest, ConfigError, FileTokenStore, LoginError, Method, Navigator, RequestError, Role,
    RouteDecision, SessionConfig, TransportError,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("http client: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Request(#[from] RequestError),
    #[error("login failed: {0}")]
    Login(#[from] LoginError),
    #[error("{0}")]
    InvalidMethod(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not signed in; run `stockgate login` first")]
    NotSignedIn,
    #[error("navigation to {route} denied: {reason}")]
    Denied { route: String, reason: String },
}

#[derive(Parser, Debug)]
#[command(name = "stockgate", about = "Warehouse inventory API session CLI")]
struct Cli {
    /// Overrides STOCKGATE_API_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login {
        identifier: String,
        #[arg(long, env = "STOCKGATE_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Drop the stored session.
    Logout,
    /// Print the identity of the stored session.
    Whoami,
    /// Evaluate the navigation guard for a route.
    Guard {
        route: String,
        /// Restrict the route to these roles (repeatable).
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Send an authorized request.
    Call {
        method: String,
        path: String,
        #[arg(long)]
        body: Option<String>,
    },
}

/// Forced logout in a terminal: there is no page to reload, so tell the user.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn hard_redirect(&self, route: &str) {
        eprintln!("session ended; sign in again ({route})");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.base_url)?;
    let store = Arc::new(FileTokenStore::open(config.token_file.clone()));
    let client = ApiClient::from_config(&config, store, Arc::new(ConsoleNavigator))?;

    match cli.command {
        Command::Login { identifier, secret } => {
            let identity = client.login(&identifier, &secret).await?;
            print_json(&serde_json::to_value(identity)?)
        }
        Command::Logout => {
            client.logout();
            println!("ok");
            Ok(())
        }
        Command::Whoami => {
            let identity = client.current_identity().ok_or(CliError::NotSignedIn)?;
            print_json(&serde_json::to_value(identity)?)
        }
        Command::Guard { route, roles } => run_guard(&client, route, &roles),
        Command::Call { method, path, body } => run_call(&client, &method, path, body).await,
    }
}

fn load_config(base_url: Option<String>) -> Result<SessionConfig, ConfigError> {
    match base_url {
        Some(base_url) => SessionConfig::from_lookup(|key| {
            if key == "STOCKGATE_API_BASE_URL" { Some(base_url.clone()) } else { std::env::var(key).ok() }
        }),
        None => SessionConfig::from_env(),
    }
}

fn run_guard(client: &ApiClient, route: String, roles: &[String]) -> Result<(), CliError> {
    let session = client.session();
    let decision = if roles.is_empty() {
        session.authorize_route()
    } else {
        let allowed: Vec<Role> = roles.iter().map(|r| Role::from_claim(r)).collect();
        session.authorize_role(&allowed)
    };

    match decision {
        RouteDecision::Allow => {
            println!("allow {route}");
            Ok(())
        }
        RouteDecision::Redirect { to } => Err(CliError::Denied { route, reason: format!("redirect to {to}") }),
        RouteDecision::Forbidden => Err(CliError::Denied { route, reason: "role not permitted".into() }),
    }
}

async fn run_call(client: &ApiClient, method: &str, path: String, body: Option<String>) -> Result<(), CliError> {
    let method: Method = method.parse().map_err(CliError::InvalidMethod)?;
    let mut request = ApiRequest::new(method, path);
    if let Some(body) = body {
        request = request.with_body(serde_json::from_str(&body)?);
    }

    let response = client.request(request).await?;
    match serde_json::from_str::<Value>(&response.body) {
        Ok(json) => print_json(&json),
        Err(_) => {
            println!("{}", response.body);
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
