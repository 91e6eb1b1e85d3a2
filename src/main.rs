use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use family_board_backend::auth::jwt;
use family_board_backend::config::Config;
use family_board_backend::services::invitation;
use family_board_backend::{AppState, app, open_store};

#[derive(Parser)]
#[command(about = "Family bulletin board backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Delete inactive invite codes past the retention window
    CleanupInvites,
    /// Print a signed identity token for local testing
    IssueToken {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        picture: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let store = open_store(&config, false)
                .await
                .expect("failed to open document store");
            let addr = format!("{}:{}", config.host, config.port);
            let state = AppState {
                store,
                config: Arc::new(config),
            };

            tracing::info!("listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
            axum::serve(listener, app(state)).await.unwrap();
        }
        Command::CleanupInvites => {
            let store = match open_store(&config, true).await {
                Ok(store) => store,
                Err(e) => {
                    tracing::error!("cannot clean up invite codes: {e}");
                    std::process::exit(1);
                }
            };
            let deleted = invitation::delete_expired_invite_codes(&store, &config.invites)
                .await
                .expect("invite cleanup failed");
            println!("deleted {deleted} expired invite codes");
        }
        Command::IssueToken {
            user_id,
            name,
            picture,
        } => {
            let token = jwt::create_token(
                &user_id,
                name.as_deref(),
                picture.as_deref(),
                &config.jwt_secret,
            )
            .expect("failed to sign token");
            println!("{token}");
        }
    }
}
