//! HTTP surface for the post store.
//!
//! # Responsibility
//! - Own listener settings and shared connection state.
//! - Build the axum router for the post endpoints.
//!
//! # Invariants
//! - All store work for one request runs under the connection lock.
//! - Every response, including unknown routes and methods, is a JSON envelope.
//! - The server stops accepting requests on Ctrl-C and drains in-flight ones.

pub mod api;
pub mod validation;

use axum::routing::get;
use axum::Router;
use log::{info, warn};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address, host name or IP.
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    conn: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Wraps a connection that already went through `open_db`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/posts",
            get(api::list_posts)
                .post(api::create_post)
                .fallback(api::method_not_allowed),
        )
        .route(
            "/posts/:id",
            get(api::get_post)
                .put(api::update_post)
                .delete(api::delete_post)
                .fallback(api::method_not_allowed),
        )
        .route("/health", get(api::health).fallback(api::method_not_allowed))
        .fallback(api::route_not_found)
        .with_state(state)
}

/// Binds the listener and serves until Ctrl-C.
///
/// # Errors
/// - Returns an error when the address cannot be bound.
/// - Returns an error when the accept loop fails.
pub async fn serve(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.address()).await?;
    info!(
        "event=server_start module=http status=ok addr={}",
        listener.local_addr()?
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("event=server_stop module=http status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("event=server_signal module=http status=error error={err}");
        std::future::pending::<()>().await;
    }
}
