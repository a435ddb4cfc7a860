//! HTTP front end for the todo store.
//!
//! # Overview
//! `app` builds the axum `Router` around an injected `Store`; `run` serves it
//! on an existing listener; `serve` is the full lifecycle used by the binary
//! (init the store, bind, serve until the shutdown future resolves, then shut
//! the store down).

use std::future::Future;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod config;
pub mod error;
pub mod handlers;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, LogFormat};
pub use error::{ApiError, ServeError};
pub use todo_core::{Store, StoreConfig, Todo};

pub fn app(store: Store) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/todos",
            get(handlers::list_todos).post(handlers::create_todo),
        )
        .route(
            "/todos/{id}",
            get(handlers::get_todo)
                .put(handlers::update_todo)
                .patch(handlers::update_todo)
                .delete(handlers::delete_todo),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn run(listener: TcpListener, store: Store) -> Result<(), std::io::Error> {
    axum::serve(listener, app(store)).await
}

pub async fn serve<F>(config: AppConfig, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = Store::new(config.store_config());
    store.init()?;

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app(store.clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    store.shutdown();
    info!("server stopped");
    Ok(())
}
