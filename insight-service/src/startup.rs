use crate::config::{DatabaseBackend, InsightConfig, StorageBackend};
use crate::handlers::{self, auth, files, invoices, plans, settings};
use crate::repository::{MemoryStore, MongoStore, Store};
use crate::services::{
    AnalysisService, AnalyticsClient, AuthService, BillingService, BlobStore, CloudinaryStorage,
    FileService, LocalStorage, QuotaPolicy, RazorpayClient,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    create_ip_rate_limiter, ip_rate_limit_middleware, metrics_middleware, request_id_middleware,
    security_headers_middleware, IpRateLimiter,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const OUTBOUND_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub config: InsightConfig,
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
    pub files: FileService,
    pub analysis: AnalysisService,
    pub billing: BillingService,
    pub login_limiter: IpRateLimiter,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

async fn build_store(config: &InsightConfig) -> Result<Arc<dyn Store>, AppError> {
    match config.database.backend {
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseBackend::Mongo => {
            let store = MongoStore::connect(config.database.uri.expose_secret(), &config.database.name)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to MongoDB: {}", e);
                    AppError::DatabaseError(e.into())
                })?;
            store.initialize_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize database indexes: {}", e);
                AppError::DatabaseError(e.into())
            })?;
            Ok(Arc::new(store))
        }
    }
}

async fn build_blob_store(
    config: &InsightConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn BlobStore>, AppError> {
    match config.storage.backend {
        StorageBackend::Local => {
            let storage = LocalStorage::new(
                &config.storage.local_path,
                config.storage.public_base_url.clone(),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to initialize local storage at {}: {}",
                    config.storage.local_path,
                    e
                );
                AppError::InternalError(e.into())
            })?;
            Ok(Arc::new(storage))
        }
        StorageBackend::Cloudinary => Ok(Arc::new(CloudinaryStorage::new(
            client,
            config.storage.cloudinary.clone(),
        ))),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

fn router(state: AppState) -> Router {
    let login = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(
            state.login_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Auth
        .route("/api/auth/check", get(auth::check_availability))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .merge(login)
        // Settings
        .route("/api/settings/sessions", get(settings::list_sessions))
        .route("/api/settings/sessions/:id", delete(settings::revoke_session))
        // Files
        .route("/api/files-section", get(files::list_files))
        .route("/api/files-section/", get(files::list_files))
        .route("/api/files-section/upload", post(files::upload_file))
        .route("/api/files-section/content/:id", get(files::file_content))
        .route("/api/files-section/analyze/:id", post(files::analyze_file))
        .route("/api/files-section/:id", delete(files::delete_file))
        // Plans
        .route("/api/plans/plans", get(plans::list_plans))
        .route("/api/plans/my-plan", get(plans::my_plan))
        .route("/api/plans/create-order", post(plans::create_order))
        .route("/api/plans/verify-payment", post(plans::verify_payment))
        .route("/api/plans/cancel-subscription", post(plans::cancel_subscription))
        // Invoices
        .route("/api/invoice", get(invoices::list_invoices))
        .route("/api/invoice/", get(invoices::list_invoices))
        .route("/api/invoice/:id", get(invoices::get_invoice));

    if state.config.storage.backend == StorageBackend::Local {
        app = app.nest_service("/blobs", ServeDir::new(&state.config.storage.local_path));
    }

    let body_limit = state.config.upload.max_bytes + MULTIPART_OVERHEAD;
    let cors = cors_layer(&state.config.server.cors_origins);

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

impl Application {
    pub async fn build(config: InsightConfig) -> Result<Self, AppError> {
        let store = build_store(&config).await?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(OUTBOUND_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::InternalError(e.into()))?;

        let blobs = build_blob_store(&config, http.clone()).await?;

        let razorpay = RazorpayClient::new(http, config.razorpay.clone());
        if !razorpay.is_configured() {
            tracing::warn!("Razorpay credentials not configured; checkout is disabled");
        }

        let analytics = AnalyticsClient::new(&config.analytics)
            .map_err(|e| AppError::InternalError(e.into()))?;

        let billing = BillingService::new(store.clone(), razorpay);
        billing.seed_catalog().await.map_err(|e| {
            tracing::error!("Failed to seed plan catalog: {}", e);
            AppError::from(e)
        })?;

        let state = AppState {
            auth: AuthService::new(store.clone(), config.session.clone()),
            files: FileService::new(store.clone(), blobs, QuotaPolicy::new(&config.quota)),
            analysis: AnalysisService::new(
                store.clone(),
                analytics,
                chrono::Duration::seconds(config.analytics.stale_after_seconds),
            ),
            billing,
            login_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            )
            .trust_forwarded_for(config.server.trust_forwarded_for),
            store,
            config: config.clone(),
        };

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            router: router(state.clone()),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.state.store.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_with_shutdown(std::future::pending()).await
    }

    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
    }
}
