use std::collections::BTreeMap;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use api_gateway::config::env::{DEFAULT_KVSTORE_URL, KVSTORE_URL};
use api_gateway::config::loader::{self, put_definition, read_config};
use api_gateway::config::validation::validate_config;
use api_gateway::config::{BackendConfig, GuardConfig, ListenerConfig, RouteConfig, ServerConfig};
use api_gateway::kvstore;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the API gateway definitions", long_about = None)]
struct Cli {
    /// KV store holding the definitions
    #[arg(long, env = KVSTORE_URL, default_value = DEFAULT_KVSTORE_URL)]
    kvstore_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add or replace a server
    AddServer {
        name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        port: u16,
        #[arg(long, default_value = "/health")]
        ping_uri: String,
        /// Exclude this server from active health checks
        #[arg(long)]
        no_health_check: bool,
    },
    /// Add or replace a backend
    AddBackend {
        name: String,
        /// Server names, in selection order
        #[arg(long = "server", required = true)]
        servers: Vec<String>,
        #[arg(long, default_value = "round-robin")]
        load_balancer_policy: String,
    },
    /// Add or replace a route
    AddRoute {
        name: String,
        #[arg(long)]
        uri_root: String,
        #[arg(long = "backend", required = true)]
        backends: Vec<String>,
        /// Wrapper names, outermost first
        #[arg(long = "plugin")]
        plugins: Vec<String>,
        #[arg(long)]
        multi_backend_adapter: Option<String>,
        /// Only apply to these methods
        #[arg(long = "method")]
        methods: Vec<String>,
        /// Only apply to this Host header
        #[arg(long)]
        host: Option<String>,
        /// Only apply when a header has a value, as NAME=VALUE
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
    /// Add or replace a listener
    AddListener {
        name: String,
        #[arg(long)]
        address: String,
        #[arg(long = "route", required = true)]
        routes: Vec<String>,
        #[arg(long = "plugin")]
        plugins: Vec<String>,
    },
    /// List stored definitions of one kind
    List {
        #[arg(value_enum)]
        kind: Kind,
    },
    /// Check the stored definitions for errors
    Validate,
    /// Query a running gateway's diagnostics listener
    Diagnostics {
        #[arg(short, long, default_value = "http://localhost:6060")]
        url: String,
        #[arg(value_enum, default_value = "status")]
        view: View,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Servers,
    Backends,
    Routes,
    Listeners,
}

impl Kind {
    fn prefix(self) -> &'static str {
        match self {
            Kind::Servers => loader::SERVERS,
            Kind::Backends => loader::BACKENDS,
            Kind::Routes => loader::ROUTES,
            Kind::Listeners => loader::LISTENERS,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum View {
    Status,
    Backends,
    Routes,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Diagnostics { url, view } = &cli.command {
        let path = match view {
            View::Status => "status",
            View::Backends => "backends",
            View::Routes => "routes",
        };
        let res = reqwest::get(format!("{}/debug/{}", url.trim_end_matches('/'), path)).await?;
        return print_response(res).await;
    }

    let store = kvstore::open(&cli.kvstore_url)?;
    let store = store.as_ref();

    match cli.command {
        Commands::AddServer {
            name,
            address,
            port,
            ping_uri,
            no_health_check,
        } => {
            let mut server = ServerConfig::new(name.clone(), address, port);
            server.ping_uri = ping_uri;
            server.health_check = !no_health_check;
            put_definition(store, loader::SERVERS, &name, &server)?;
            println!("Stored server '{}'", name);
        }
        Commands::AddBackend {
            name,
            servers,
            load_balancer_policy,
        } => {
            let backend = BackendConfig {
                name: name.clone(),
                servers,
                load_balancer_policy,
            };
            put_definition(store, loader::BACKENDS, &name, &backend)?;
            println!("Stored backend '{}'", name);
        }
        Commands::AddRoute {
            name,
            uri_root,
            backends,
            plugins,
            multi_backend_adapter,
            methods,
            host,
            headers,
        } => {
            let guard = GuardConfig {
                methods,
                host,
                headers: headers.into_iter().collect::<BTreeMap<_, _>>(),
            };
            let route = RouteConfig {
                name: name.clone(),
                uri_root,
                backends,
                plugins,
                multi_backend_adapter,
                guard: (guard != GuardConfig::default()).then_some(guard),
            };
            put_definition(store, loader::ROUTES, &name, &route)?;
            println!("Stored route '{}'", name);
        }
        Commands::AddListener {
            name,
            address,
            routes,
            plugins,
        } => {
            let listener = ListenerConfig {
                name: name.clone(),
                address,
                routes,
                plugins,
            };
            put_definition(store, loader::LISTENERS, &name, &listener)?;
            println!("Stored listener '{}'", name);
        }
        Commands::List { kind } => {
            for (key, value) in store.list(&format!("{}/", kind.prefix()))? {
                println!("[{}]", key);
                print!("{}", toml::to_string_pretty(&value)?);
                println!();
            }
        }
        Commands::Validate => {
            let config = read_config(store)?;
            match validate_config(&config) {
                Ok(()) => println!(
                    "OK: {} servers, {} backends, {} routes, {} listeners",
                    config.servers.len(),
                    config.backends.len(),
                    config.routes.len(),
                    config.listeners.len()
                ),
                Err(errors) => {
                    for error in &errors {
                        eprintln!("error: {}", error);
                    }
                    std::process::exit(1);
                }
            }
        }
        Commands::Diagnostics { .. } => {}
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: diagnostics endpoint returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
