use clap::Parser;
use sblite::cli::{init_logging, open_database, run_migrate, Args, Command};
use sblite::config::{Config, MailMode};
use sblite::{build_state, init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_format);

    if let Some(Command::Migrate { action, dir }) = &args.command {
        let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "sblite.db".to_string());
        run_migrate(&db_path, action, dir).await;
        return;
    }

    let Some(config) = Config::from_env() else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&config.db_path).await else {
        std::process::exit(1);
    };

    let enable_mail = config.mail_mode == MailMode::Catch;
    let addr = format!("{}:{}", config.host, config.port);
    let state = build_state(config, db);

    init_cleanup(&state.db).await;

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        error!(address = %addr, error = %e, "failed to bind");
        std::process::exit(1);
    });
    let local_addr = listener.local_addr().unwrap();

    info!(address = %local_addr, "listening");

    #[cfg(feature = "test-mode")]
    println!("SBLITE_READY port={}", local_addr.port());

    if let Err(e) = run_server(state, enable_mail, listener).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}
