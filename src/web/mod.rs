// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI and JSON API for the Lepidoptera dashboard

mod api;
mod pages;
pub mod templates;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use minijinja::{context, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::{
    webcam_capture_name, ClassificationLog, ClassifierKind, ModelRegistry, Prediction,
};
use crate::config::AppConfig;
use crate::db::Database;
use crate::sales::Order;
use crate::tasks::{CareBook, Schedule, TaskBook, CARE_FILE, SCHEDULE_FILE, TASKS_FILE};
use crate::{classify, LepiError, Result};

use templates::{Notice, Templates};

const SESSION_COOKIE: &str = "lepi_session";
const GUEST: &str = "guest";

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub registry: ModelRegistry,
    pub tasks: Mutex<TaskBook>,
    pub care: Mutex<CareBook>,
    pub schedule: Mutex<Schedule>,
    /// Serialises writers of the sales ledger
    pub sales: Mutex<()>,
    /// Serialises writers of the purchase history
    pub purchases: Mutex<()>,
    logs: [Mutex<ClassificationLog>; 4],
    orders: Mutex<HashMap<String, Order>>,
    /// Receipt HTML of each user's last completed order
    receipts: Mutex<HashMap<String, String>>,
    sessions: Mutex<HashMap<String, String>>,
    templates: Templates,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    /// Build state from configuration, loading the record books from the data directory
    pub fn new(config: AppConfig, db: Database) -> Result<Self> {
        let registry = ModelRegistry::new(&config);
        let logs = ClassifierKind::ALL.map(|kind| {
            let path = config.classification_log_path(kind);
            Mutex::new(ClassificationLog::new(path, registry.catalog(kind)))
        });
        let schedule = Schedule::load(config.data_file(SCHEDULE_FILE), Local::now().date_naive());

        Ok(Self {
            tasks: Mutex::new(TaskBook::load(config.data_file(TASKS_FILE))),
            care: Mutex::new(CareBook::load(config.data_file(CARE_FILE))),
            schedule: Mutex::new(schedule),
            sales: Mutex::new(()),
            purchases: Mutex::new(()),
            logs,
            orders: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            templates: Templates::new()?,
            registry,
            db,
            config,
        })
    }

    pub fn classification_log(&self, kind: ClassifierKind) -> MutexGuard<'_, ClassificationLog> {
        lock(&self.logs[kind.index()])
    }

    /// Signed-in user for a request, from the session cookie
    pub fn current_user(&self, headers: &HeaderMap) -> Option<String> {
        let token = session_token(headers)?;
        lock(&self.sessions).get(&token).cloned()
    }

    /// Start a session, returning the `Set-Cookie` value
    fn start_session(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        lock(&self.sessions).insert(token.clone(), username.to_string());
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token)
    }

    fn end_session(&self, headers: &HeaderMap) -> String {
        if let Some(token) = session_token(headers) {
            lock(&self.sessions).remove(&token);
        }
        format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE)
    }

    /// Seller recorded on sales: the signed-in user or the farm default
    fn seller(&self, user: Option<&str>) -> String {
        user.map(String::from)
            .unwrap_or_else(|| self.config.farm.default_seller.clone())
    }

    /// Run `f` on the current order of a user, creating one if needed
    fn with_order<T>(&self, user: Option<&str>, f: impl FnOnce(&mut Order) -> T) -> T {
        let mut orders = lock(&self.orders);
        f(orders.entry(user.unwrap_or(GUEST).to_string()).or_default())
    }

    /// Swap out the current order of a user for a fresh one
    fn take_order(&self, user: Option<&str>) -> Order {
        let mut orders = lock(&self.orders);
        std::mem::take(orders.entry(user.unwrap_or(GUEST).to_string()).or_default())
    }

    fn keep_receipt(&self, user: Option<&str>, html: &str) {
        lock(&self.receipts).insert(user.unwrap_or(GUEST).to_string(), html.to_string());
    }

    fn last_receipt(&self, user: Option<&str>) -> Option<String> {
        lock(&self.receipts).get(user.unwrap_or(GUEST)).cloned()
    }

    fn render(
        &self,
        name: &str,
        title: &str,
        user: Option<&str>,
        notice: Option<Notice>,
        ctx: Value,
    ) -> Result<String> {
        self.templates.render(
            name,
            context! { title => title, user => user, notice => notice, ..ctx },
        )
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    /// The daily schedule, with today's default change in place
    fn current_schedule(&self) -> MutexGuard<'_, Schedule> {
        let today = self.today();
        let mut schedule = lock(&self.schedule);
        if schedule.ensure_default(today) {
            info!("Added the default daily change for {}", today);
        }
        schedule
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Run blocking file or inference work off the async runtime
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LepiError::Task(e.to_string()))?
}

fn status_for(err: &LepiError) -> StatusCode {
    match err {
        LepiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        LepiError::DuplicateUser(_) => StatusCode::CONFLICT,
        LepiError::ModelNotLoaded(_) => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_user_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body `{ "error": ... }`
pub struct ApiError(LepiError);

impl From<LepiError> for ApiError {
    fn from(err: LepiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("API request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Failure to produce a page at all
pub struct PageError(LepiError);

impl From<LepiError> for PageError {
    fn from(err: LepiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        warn!("Page failed: {}", self.0);
        (status_for(&self.0), self.0.to_string()).into_response()
    }
}

/// An image received from a form
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Split a multipart body into text fields and the first non-empty image.
///
/// An image in the `webcam` field is named after the capture time.
async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(HashMap<String, String>, Option<Upload>)> {
    let invalid = |e: MultipartError| LepiError::Validation(format!("Invalid upload: {}", e));

    let mut fields = HashMap::new();
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "webcam" => {
                let file_name = field.file_name().map(String::from);
                let bytes = field.bytes().await.map_err(invalid)?;
                if bytes.is_empty() || upload.is_some() {
                    continue;
                }
                let name = if name == "webcam" {
                    webcam_capture_name(Local::now())
                } else {
                    file_name.unwrap_or_else(|| "upload.jpg".to_string())
                };
                upload = Some(Upload { name, bytes: bytes.to_vec() });
            }
            _ => {
                let text = field.text().await.map_err(invalid)?;
                fields.insert(name, text);
            }
        }
    }
    Ok((fields, upload))
}

/// Result of classifying and logging one image
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyOutcome {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub image_name: String,
    pub logged: bool,
    /// Why the log row could not be written
    pub log_error: Option<String>,
}

/// Classify an upload, store the image and append the log row
async fn classify_upload(
    state: Arc<AppState>,
    kind: ClassifierKind,
    upload: Upload,
) -> Result<ClassifyOutcome> {
    run_blocking(move || {
        let prediction = state.registry.classify(kind, &upload.bytes)?;
        let upload_dir = &state.config.paths.upload_dir;
        let path = classify::save_upload(upload_dir, &upload.name, &upload.bytes)?;
        let image_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(upload.name);

        let (logged, log_error) = match state
            .classification_log(kind)
            .record(&prediction, &image_name, &state.config.farm.location)
        {
            Ok(logged) => (logged, None),
            Err(e) => {
                warn!("Could not log {} classification: {}", kind, e);
                (false, Some(e.to_string()))
            }
        };

        Ok(ClassifyOutcome { prediction, image_name, logged, log_error })
    })
    .await
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.web.upload_limit;
    let uploads = ServeDir::new(&state.config.paths.upload_dir);

    Router::new()
        // Pages
        .route("/", get(pages::home))
        .route("/about", get(pages::about))
        .route("/contact", get(pages::contact))
        .route("/classify", get(pages::classify_form).post(pages::classify_submit))
        .route("/data/larval-diseases", get(pages::larval_diseases))
        .route("/data/pupae-defects", get(pages::pupae_defects))
        .route("/data/life-cycle", get(pages::life_cycle))
        .route("/data/species", get(pages::species))
        .route("/host-plants", get(pages::host_plants))
        .route("/tasks", get(pages::tasks).post(pages::add_task))
        .route("/care", get(pages::care).post(pages::add_care))
        .route("/schedule", get(pages::schedule).post(pages::add_change))
        .route("/sales", get(pages::sales).post(pages::record_sale))
        .route("/pos", get(pages::pos))
        .route("/pos/add", post(pages::pos_add))
        .route("/pos/complete", post(pages::pos_complete))
        .route("/pos/receipt", get(pages::pos_receipt))
        .route("/login", get(pages::login_form).post(pages::login))
        .route("/signup", get(pages::signup_form).post(pages::signup))
        .route("/logout", post(pages::logout))
        .route("/login-records.csv", get(pages::login_records_csv))
        // API endpoints
        .route("/api/models", get(api::models))
        .route("/api/species", get(api::species))
        .route("/api/host-plants/:species", get(api::host_plants))
        .route("/api/classify/:kind", post(api::classify))
        .route("/api/tables/:kind", get(api::classification_table))
        .route("/api/tasks", get(api::tasks).post(api::add_task))
        .route("/api/tasks/distribution", get(api::task_distribution))
        .route("/api/care", get(api::care).post(api::add_care))
        .route("/api/schedule", get(api::schedule).post(api::add_change))
        .route("/api/sales", get(api::sales).post(api::record_sale))
        .route("/api/pos/items", get(api::pos_items))
        .route("/api/pos/orders", post(api::complete_order))
        // Stored classifier uploads
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server with config and database
pub async fn start_server(config: AppConfig, db: Database) -> Result<()> {
    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState::new(config, db)?);

    let ready = {
        let state = state.clone();
        run_blocking(move || Ok(state.registry.preload())).await?
    };
    info!("{} of {} classifiers ready", ready, ClassifierKind::ALL.len());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web UI available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| LepiError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
