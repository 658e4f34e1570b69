#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use handlebars::Handlebars;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::campaign::{self, LongRecord};
use crate::config::{DashboardConfig, SourceConfig};
use crate::dashboard::{load_table, render_dashboard, slugify};
use crate::downloader;
use crate::error::{DashboardError, Result};
use crate::loader::{GoogleSheetsSource, RowSource, source_from_path};
use crate::login::{
    SessionContext, SessionStore, handle_login, handle_logout, require_auth, serve_login_page,
};
use crate::secrets::SecretsProvider;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Shared state of the web application
pub struct AppState {
    pub config: DashboardConfig,
    /// Plaintext or Argon2 PHC string
    pub password: String,
    pub sessions: SessionStore,
    pub source: Arc<dyn RowSource>,
    templates: Handlebars<'static>,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    format: Option<String>,
}

/// One campaign in the `/api/campaigns` payload
#[derive(Serialize)]
struct CampaignSummary {
    campaign: String,
    records: Vec<LongRecord>,
    near_misses: Vec<String>,
}

#[derive(Serialize)]
struct ErrorPage<'a> {
    title: &'a str,
    message: String,
}

impl AppState {
    /// Build the state and compile the page templates
    ///
    /// # Arguments
    /// * `config` - Dashboard configuration
    /// * `password` - Secret the login form is checked against
    /// * `source` - Where each render fetches its rows
    pub fn new(
        config: DashboardConfig,
        password: impl Into<String>,
        source: Arc<dyn RowSource>,
    ) -> Result<Self> {
        let mut templates = Handlebars::new();
        for (name, text) in [
            ("login", include_str!("./static/login.hbs")),
            ("dashboard", include_str!("./static/dashboard.hbs")),
            ("error", include_str!("./static/error.hbs")),
        ] {
            templates
                .register_template_string(name, text)
                .map_err(|e| DashboardError::Config(format!("template {}: {}", name, e)))?;
        }

        Ok(Self {
            sessions: SessionStore::new(Duration::from_secs(config.session_ttl_secs)),
            config,
            password: password.into(),
            source,
            templates,
        })
    }

    fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        self.templates
            .render(name, data)
            .map_err(|e| DashboardError::Config(format!("template {}: {}", name, e)))
    }

    /// Login form, optionally with an error message above the field
    pub fn render_login(&self, error: Option<&str>) -> Html<String> {
        match self.render("login", &serde_json::json!({ "error": error })) {
            Ok(html) => Html(html),
            Err(e) => {
                error!("{}", e);
                Html("<form method=\"post\" action=\"/login\"><input type=\"password\" name=\"password\"><button>OK</button></form>".to_string())
            }
        }
    }

    /// Full-page error; nothing else of the dashboard is shown
    pub fn error_page(&self, err: &DashboardError) -> Response {
        let (status, title) = match err {
            DashboardError::Connection(_) => (StatusCode::BAD_GATEWAY, "Erreur de connexion"),
            DashboardError::Schema(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Structure de la feuille invalide",
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Erreur"),
        };
        error!("{}: {}", title, err);
        let page = ErrorPage {
            title,
            message: err.to_string(),
        };
        match self.render("error", &page) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(_) => (status, format!("{} : {}", title, err)).into_response(),
        }
    }
}

/// Build the router: the dashboard, its JSON and export routes behind
/// the session check, login/logout and health open.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(serve_dashboard))
        .route("/api/campaigns", get(api_campaigns))
        .route("/export/:campaign", get(export_campaign))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(protected)
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve secrets and the row source, then serve until the process stops.
pub async fn run(config: DashboardConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let secrets = SecretsProvider::new(&config.credentials_file, &config.secrets_file).load()?;
    info!("secrets loaded: {:?}", secrets);

    let source: Arc<dyn RowSource> = match &config.source {
        SourceConfig::Google => {
            let credentials = secrets.credentials.clone().ok_or_else(|| {
                DashboardError::Config(format!(
                    "no Google Sheets credentials: add {} or a [sheets] / [gcp_service_account] table to {}",
                    config.credentials_file.display(),
                    config.secrets_file.display()
                ))
            })?;
            Arc::new(GoogleSheetsSource::new(credentials))
        }
        SourceConfig::File { path } => Arc::from(source_from_path(path)?),
    };

    let state = Arc::new(AppState::new(config, secrets.password, source)?);
    spawn_session_purge(state.clone());

    let listener = TcpListener::bind(&state.config.bind).await?;
    log_urls(listener.local_addr()?);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn log_urls(addr: SocketAddr) {
    info!("Local URL: http://{}", addr);
    match local_ip_address::local_ip() {
        Ok(ip) => info!("Network URL: http://{}:{}", ip, addr.port()),
        Err(e) => warn!("could not determine the network address: {}", e),
    }
}

fn spawn_session_purge(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(600));
        loop {
            ticker.tick().await;
            let removed = state.sessions.purge_expired();
            if removed > 0 {
                info!("purged {} expired sessions", removed);
            }
        }
    });
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Run row fetching and rendering off the async runtime
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DashboardError::Io(std::io::Error::other(e.to_string())))?
}

async fn serve_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    let worker = state.clone();
    let result = blocking(move || {
        render_dashboard(&session, worker.source.as_ref(), &worker.config, today())
    })
    .await;

    match result.and_then(|page| state.render("dashboard", &page)) {
        Ok(html) => Html(html).into_response(),
        Err(e) if e.is_auth() => Redirect::to("/login").into_response(),
        Err(e) => state.error_page(&e),
    }
}

async fn api_campaigns(State(state): State<Arc<AppState>>) -> Response {
    let worker = state.clone();
    let result = blocking(move || {
        let table = load_table(worker.source.as_ref(), &worker.config)?;
        Ok(worker
            .config
            .campaigns
            .iter()
            .map(|label| CampaignSummary {
                campaign: label.clone(),
                records: campaign::extract(&table, label).to_long_form(),
                near_misses: campaign::near_misses(&table, label),
            })
            .collect::<Vec<_>>())
    })
    .await;

    match result {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => {
            error!("/api/campaigns: {}", e);
            let status = match e {
                DashboardError::Connection(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn export_campaign(
    State(state): State<Arc<AppState>>,
    Path(label): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Response {
    if !state.config.campaigns.iter().any(|c| *c == label) {
        return (StatusCode::NOT_FOUND, format!("unknown campaign '{}'", label)).into_response();
    }
    let format = query.format.unwrap_or_else(|| "csv".to_string()).to_lowercase();
    if format != "csv" && format != "xlsx" {
        return (
            StatusCode::BAD_REQUEST,
            format!("unsupported format '{}', expected csv or xlsx", format),
        )
            .into_response();
    }

    let worker = state.clone();
    let campaign_label = label.clone();
    let export_format = format.clone();
    let result = blocking(move || {
        let table = load_table(worker.source.as_ref(), &worker.config)?;
        let series = campaign::extract(&table, &campaign_label);
        let rows = campaign::campaign_rows(&table, &series);
        match export_format.as_str() {
            "xlsx" => downloader::to_xlsx(&rows, &downloader::sheet_name_for(&campaign_label)),
            _ => downloader::to_csv(&rows).map(String::into_bytes),
        }
    })
    .await;

    match result {
        Ok(bytes) => {
            let mime = if format == "xlsx" {
                XLSX_MIME
            } else {
                "text/csv; charset=utf-8"
            };
            let disposition = format!("attachment; filename=\"{}.{}\"", slugify(&label), format);
            info!("exported '{}' as {} ({} bytes)", label, format, bytes.len());
            (
                [
                    (header::CONTENT_TYPE, mime.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => state.error_page(&e),
    }
}

async fn health() -> &'static str {
    "ok"
}
