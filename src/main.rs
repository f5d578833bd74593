use roomcast::{config::Config, rooms, status, AppState, Broker};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // a handler that panics leaves the broker half-updated; don't keep serving
    std::panic::set_hook(Box::new(|panic| {
        error!("uncaught panic: {panic}");
        std::process::exit(1);
    }));

    let config = Config::from_env()?;
    let app_state = AppState::new(Broker::new());

    let app = Router::new()
        .merge(status::router())
        .merge(rooms::router())
        .fallback(status::not_found)

        .with_state(app_state)
        .layer(config.cors_layer());

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("server is running on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server closed");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received: closing server"),
        _ = terminate => info!("SIGTERM received: closing server"),
    }
}
