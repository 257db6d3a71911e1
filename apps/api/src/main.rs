use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::store::{AppointmentStore, PostgrestAppointmentStore};
use appointment_cell::AppState;
use directory_cell::{Directory, PostgrestDirectory};
use mailer_cell::{
    CancellationMailProducer, CancellationQueue, HttpMailer, MailWorkerService, Mailer,
    RedisCancellationQueue, WorkerConfig,
};
use shared_config::AppConfig;
use shared_database::PostgrestClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Slotbook API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    if !config.is_mailer_configured() {
        warn!("Mail API not configured - cancellation emails will fail until it is");
    }

    // Wire up collaborators
    let db = Arc::new(PostgrestClient::new(&config));
    let store: Arc<dyn AppointmentStore> =
        Arc::new(PostgrestAppointmentStore::new(Arc::clone(&db)));
    let directory: Arc<dyn Directory> = Arc::new(PostgrestDirectory::new(Arc::clone(&db)));

    let queue: Arc<dyn CancellationQueue> = Arc::new(
        RedisCancellationQueue::new(&config)
            .await
            .context("failed to initialize the cancellation mail queue")?,
    );
    let mail_producer = Arc::new(CancellationMailProducer::new(Arc::clone(&queue)));

    // Background mail worker, decoupled from the request path by the queue
    let mailer: Arc<dyn Mailer> = Arc::new(HttpMailer::new(&config));
    let worker = MailWorkerService::new(
        WorkerConfig::default(),
        queue,
        mailer,
        config.mail_sender.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = worker.start().await {
            error!("Mail worker stopped: {}", e);
        }
    });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        db,
        store,
        directory,
        mail_producer,
    ));

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
