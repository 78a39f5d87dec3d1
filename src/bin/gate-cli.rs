use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use storefront_gate::auth::{Role, RoleTable};
use storefront_gate::config::{apply_env, GatewayConfig};

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Operator CLI for storefront-gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a role credential using the configured secret
    Mint {
        /// user, admin, instructor or doctor
        #[arg(short, long)]
        role: Role,

        /// Identity id to embed as the subject
        #[arg(short, long)]
        subject: String,

        /// TOML config providing the secrets (environment still wins)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Call a running gateway's hello endpoint
    Ping {
        #[arg(short, long, default_value = "http://localhost:8000")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Mint {
            role,
            subject,
            config,
        } => {
            let mut settings: GatewayConfig = match config {
                Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
                None => GatewayConfig::default(),
            };
            apply_env(&mut settings, |name| std::env::var(name).ok())?;

            if settings.auth.for_role(role).secret.is_empty() {
                eprintln!(
                    "Error: no secret configured for {} (set JWT_SECRET{})",
                    role.as_str(),
                    role.env_suffix()
                );
                std::process::exit(1);
            }

            let token = RoleTable::from_config(&settings.auth).issue(role, &subject)?;
            println!("{token}");
        }
        Commands::Ping { url } => {
            let res = reqwest::get(format!("{}/", url.trim_end_matches('/'))).await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
