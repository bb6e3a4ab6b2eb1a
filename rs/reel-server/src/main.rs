use std::sync::Arc;

use clap::Parser;

mod config;
mod error;
mod routes;

use config::Cli;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

	let cli = Cli::parse();
	let config = config::Config::load(&cli.config)?;
	let bind = config.bind;

	let store = config.build_store();
	let registry = Arc::new(reel_session::Registry::new());

	let expirer = tokio::spawn(registry.clone().run_expirer());

	let state = Arc::new(AppState { config, store, registry });
	let app = routes::router(state);

	let listener = tokio::net::TcpListener::bind(bind).await?;
	tracing::info!(%bind, "reel-server listening");

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	expirer.abort();
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}

	tracing::info!("shutting down");
}
