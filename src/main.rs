use std::sync::Arc;
use tower_http::cors::CorsLayer;

use swift_dispatch::{
    routes,
    state::{AppConfig, AppState},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swift_dispatch=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(AppState::new(config));
    state.spawn_background_tasks();

    let app = routes::router(state).layer(CorsLayer::permissive());

    tracing::info!("Dispatch service listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
