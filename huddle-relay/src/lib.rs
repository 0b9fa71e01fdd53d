mod routing;
mod signaling;

pub use routing::*;
pub use signaling::*;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

/// Axum app with the relay endpoint at `/ws/{user}`.
pub fn app(service: RelayService) -> Router {
    Router::new()
        .route("/ws/{user}", get(ws_handler))
        .with_state(service)
}

pub async fn serve(listener: TcpListener, service: RelayService) -> anyhow::Result<()> {
    info!("Relay listening on ws://{}", listener.local_addr()?);
    axum::serve(listener, app(service)).await?;
    Ok(())
}
