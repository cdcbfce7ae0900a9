mod download;
mod error;
mod health;
mod images;
mod pages;
mod storage;
mod upload;

use std::net::SocketAddr;

use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::download::download_file;
use crate::health::health_check;
use crate::images::list_images;
use crate::pages::index;
use crate::storage::Storage;
use crate::upload::{upload_file, MAX_UPLOAD_BYTES};

const UPLOADS_DIR: &str = "uploads";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pics_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let storage = Storage::open(UPLOADS_DIR).expect("create upload directory");

    let addr = SocketAddr::from(([0, 0, 0, 0], 5000));
    tracing::info!("server running on http://{}", addr);
    axum::serve(TcpListener::bind(addr).await.unwrap(), app(storage))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

fn app(storage: Storage) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/upload", post(upload_file))
        .route("/uploads/:filename", get(download_file))
        .route("/images", get(list_images))
        .layer(Extension(storage))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("install ctrl-c handler");
    tracing::info!("shutting down");
}
