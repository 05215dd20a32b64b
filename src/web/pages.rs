// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTML page handlers

use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use base64::Engine;
use chrono::Local;
use minijinja::{context, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::templates::{count_bars, paired_bars, score_bars, Notice};
use super::{classify_upload, lock, read_multipart, run_blocking, AppState, PageError};
use crate::auth::{self, LoginRecord, LOGIN_RECORDS_FILE};
use crate::catalog::{
    self, ACTIVITY_TYPES, DETECTION_PERFORMANCE_FILE, SPECIES, SPECIES_IMAGE_COUNTS_FILE,
};
use crate::classify::{Classification, ClassifierKind};
use crate::sales::{self, SaleForm, COMPANIES, ITEMS, PURCHASES_FILE, SALES_FILE};
use crate::store::{self, CsvRecord};
use crate::tasks::{parse_day, CareForm, TaskForm};
use crate::LepiError;

type PageResult = std::result::Result<Html<String>, PageError>;

#[derive(Serialize)]
struct ModelRow {
    slug: &'static str,
    label: &'static str,
    status: &'static str,
}

fn model_rows(state: &AppState) -> Vec<ModelRow> {
    ClassifierKind::ALL
        .iter()
        .map(|kind| ModelRow {
            slug: kind.slug(),
            label: kind.label(),
            status: state.registry.status(*kind).description(),
        })
        .collect()
}

// === Reference pages ===

pub async fn home(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    let user = state.current_user(&headers);
    let ctx = context! { models => model_rows(&state) };
    let html = state.render("home.html", "Home", user.as_deref(), None, ctx)?;
    Ok(Html(html))
}

#[derive(Serialize)]
struct AboutCard {
    title: &'static str,
    text: &'static str,
}

const ABOUT_CARDS: &[AboutCard] = &[
    AboutCard {
        title: "Purpose",
        text: "To address challenges in agriculture by continuously monitoring, measuring, and analyzing physical aspects and phenomena in complex, multivariate, and unpredictable ecosystems.",
    },
    AboutCard {
        title: "Quality",
        text: "As a farmer, the task is to culture butterflies with extra care management by maintaining indicator host plants for sustainability needs in butterfly farming or propagation.",
    },
    AboutCard {
        title: "Function",
        text: "To gain knowledge about Lepidoptera, cultured species are examined sequentially and adaptively identified. The system should precisely determine tasks and predict models for image segmentation, object detection, or classification.",
    },
    AboutCard {
        title: "Elegant",
        text: "Machine learning models, with their ability to adapt and learn from new data, can refine breeding strategies and improve quality performance, helping breeders stay competitive in dynamic biodiversity.",
    },
];

pub async fn about(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    let user = state.current_user(&headers);
    let ctx = context! { cards => ABOUT_CARDS };
    let html = state.render("about.html", "About", user.as_deref(), None, ctx)?;
    Ok(Html(html))
}

pub async fn contact(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    let user = state.current_user(&headers);
    let contact = context! {
        email => "insectconnection@butterflyapp.com",
        phone => "+63 (932) 881-1749",
        address => "0184 Butterfly Lane, Gasan City, Marinduque 4905",
    };
    let ctx = context! { contact => contact };
    let html = state.render("contact.html", "Contact", user.as_deref(), None, ctx)?;
    Ok(Html(html))
}

struct DataPage {
    kind: ClassifierKind,
    title: &'static str,
    intro: &'static str,
    cases_heading: &'static str,
    distribution_heading: &'static str,
    empty_message: &'static str,
}

async fn data_page(state: Arc<AppState>, headers: HeaderMap, page: DataPage) -> PageResult {
    let user = state.current_user(&headers);
    let path = state.config.classification_log_path(page.kind);
    let table = run_blocking(move || Ok(store::load_table(&path))).await?;
    let distribution = score_bars(&table.mean_by("class_name", "score"));

    let html = state.render(
        "data.html",
        page.title,
        user.as_deref(),
        None,
        context! {
            intro => page.intro,
            cases_heading => page.cases_heading,
            distribution_heading => page.distribution_heading,
            empty_message => page.empty_message,
            table => table,
            distribution => distribution,
        },
    )?;
    Ok(Html(html))
}

pub async fn larval_diseases(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    data_page(state, headers, DataPage {
        kind: ClassifierKind::LarvalDiseases,
        title: "Larval Diseases Data",
        intro: "Learn about common diseases that affect butterfly larvae.",
        cases_heading: "Disease Cases",
        distribution_heading: "Disease Distribution",
        empty_message: "No larval disease data available.",
    })
    .await
}

pub async fn pupae_defects(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    data_page(state, headers, DataPage {
        kind: ClassifierKind::PupaeDefects,
        title: "Pupae Defects Data",
        intro: "Discover the different types of defects that can occur in pupae.",
        cases_heading: "Defect Cases",
        distribution_heading: "Defect Distribution",
        empty_message: "No pupae defects data available.",
    })
    .await
}

pub async fn life_cycle(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    data_page(state, headers, DataPage {
        kind: ClassifierKind::LifeStages,
        title: "Butterfly Life Cycle Data",
        intro: "Explore the stages of a butterfly's life cycle.",
        cases_heading: "Life Stages Overview",
        distribution_heading: "Butterfly Life Stages Distribution",
        empty_message: "No butterfly life cycle data available.",
    })
    .await
}

pub async fn species(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    let user = state.current_user(&headers);
    let paths = (
        state.config.classification_log_path(ClassifierKind::Species),
        state.config.data_file(SPECIES_IMAGE_COUNTS_FILE),
        state.config.data_file(DETECTION_PERFORMANCE_FILE),
    );
    let (table, counts, detection) = run_blocking(move || {
        Ok((
            store::load_table(&paths.0),
            store::load_table(&paths.1),
            store::load_table(&paths.2),
        ))
    })
    .await?;

    let image_counts: Vec<(String, usize)> = catalog::species_image_counts(&counts)
        .into_iter()
        .map(|(species, n)| (species, n as usize))
        .collect();

    let html = state.render(
        "species.html",
        "Species Data",
        user.as_deref(),
        None,
        context! {
            table => table,
            image_counts => count_bars(&image_counts),
            image_counts_file => SPECIES_IMAGE_COUNTS_FILE,
            detection_bars => paired_bars(&catalog::detection_counts(&detection)),
            detection => detection,
            species => SPECIES,
        },
    )?;
    Ok(Html(html))
}

#[derive(Deserialize)]
pub struct HostPlantQuery {
    species: Option<String>,
}

pub async fn host_plants(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HostPlantQuery>,
) -> PageResult {
    let user = state.current_user(&headers);
    let selected = query.species.filter(|s| !s.is_empty());
    let plants = selected.as_deref().and_then(catalog::host_plants);
    let notice = selected.is_none().then(|| {
        Notice::info("Please select a butterfly species from the dropdown to see its host plants.")
    });

    let html = state.render(
        "host_plants.html",
        "Host Plants",
        user.as_deref(),
        notice,
        context! {
            species_names => catalog::species_names(),
            selected => selected,
            host_plants => plants,
        },
    )?;
    Ok(Html(html))
}

// === Classifiers ===

#[derive(Deserialize)]
pub struct KindQuery {
    kind: Option<String>,
}

fn render_classify(
    state: &AppState,
    user: Option<&str>,
    selected: ClassifierKind,
    notice: Option<Notice>,
    prediction: Value,
) -> PageResult {
    let html = state.render(
        "classify.html",
        "Classifiers",
        user,
        notice,
        context! {
            models => model_rows(state),
            selected => selected.slug(),
            prediction => prediction,
        },
    )?;
    Ok(Html(html))
}

pub async fn classify_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<KindQuery>,
) -> PageResult {
    let user = state.current_user(&headers);
    let selected = query
        .kind
        .and_then(|k| k.parse().ok())
        .unwrap_or(ClassifierKind::Species);
    render_classify(&state, user.as_deref(), selected, None, Value::UNDEFINED)
}

pub async fn classify_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> PageResult {
    let user = state.current_user(&headers);
    let (fields, upload) = match read_multipart(multipart).await {
        Ok(parts) => parts,
        Err(e) => {
            let notice = Notice::error(e.to_string());
            let kind = ClassifierKind::Species;
            return render_classify(&state, user.as_deref(), kind, Some(notice), Value::UNDEFINED);
        }
    };

    let kind = match fields.get("kind").map(|k| k.parse::<ClassifierKind>()) {
        Some(Ok(kind)) => kind,
        _ => ClassifierKind::Species,
    };
    let Some(upload) = upload else {
        let notice = Notice::warning("Please upload an image or take a picture.");
        return render_classify(&state, user.as_deref(), kind, Some(notice), Value::UNDEFINED);
    };

    match classify_upload(state.clone(), kind, upload).await {
        Ok(outcome) => {
            let notice = match (&outcome.prediction.classification, &outcome.log_error) {
                (Classification::Unknown { .. }, _) => Notice::error(format!(
                    "Could not classify the image for {} or prediction was 'Unknown Class'.",
                    kind
                )),
                (Classification::Label { .. }, Some(e)) => Notice::warning(format!(
                    "Classification succeeded but could not be logged: {}",
                    e
                )),
                (Classification::Label { label, confidence }, None) => Notice::success(format!(
                    "{} Prediction: {} (Confidence: {:.2}%)",
                    kind, label, confidence
                )),
            };
            let prediction = context! {
                kind_label => kind.label(),
                label => outcome.prediction.classification.label(),
                confidence => format!("{:.2}", outcome.prediction.classification.confidence()),
                details => outcome.prediction.details,
                image_url => format!("/uploads/{}", outcome.image_name),
                image_name => outcome.image_name,
            };
            render_classify(&state, user.as_deref(), kind, Some(notice), prediction)
        }
        Err(LepiError::ModelNotLoaded(_)) => {
            let notice = Notice::warning(format!(
                "The {} model is not loaded. \
                 Please check the model path and ensure the model file exists.",
                kind
            ));
            render_classify(&state, user.as_deref(), kind, Some(notice), Value::UNDEFINED)
        }
        Err(e) => {
            let notice = Notice::error(format!("Error during image classification: {}", e));
            render_classify(&state, user.as_deref(), kind, Some(notice), Value::UNDEFINED)
        }
    }
}

// === Tasks & care ===

#[derive(Deserialize)]
pub struct ViewQuery {
    view: Option<String>,
}

fn render_tasks(
    state: &AppState,
    user: Option<&str>,
    view: &str,
    notice: Option<Notice>,
) -> PageResult {
    let (records, by_activity, by_species) = {
        let tasks = lock(&state.tasks);
        (tasks.records().to_vec(), tasks.activity_distribution(), tasks.species_distribution())
    };

    let html = state.render(
        "tasks.html",
        "Tasks",
        user,
        notice,
        context! {
            view => view,
            today => state.today().to_string(),
            activities => ACTIVITY_TYPES,
            species_names => catalog::species_names(),
            tasks => records,
            by_activity => count_bars(&by_activity),
            by_species => count_bars(&by_species),
        },
    )?;
    Ok(Html(html))
}

pub async fn tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> PageResult {
    let user = state.current_user(&headers);
    render_tasks(&state, user.as_deref(), query.view.as_deref().unwrap_or("register"), None)
}

pub async fn add_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TaskForm>,
) -> PageResult {
    let user = state.current_user(&headers);
    let record = match form.into_record() {
        Ok(record) => record,
        Err(e) => {
            let notice = Notice::error(e.to_string());
            return render_tasks(&state, user.as_deref(), "register", Some(notice));
        }
    };

    let summary = format!("{} for {} on {}", record.activity, record.species, record.day);
    let saved = {
        let state = state.clone();
        run_blocking(move || {
            let mut tasks = lock(&state.tasks);
            tasks.add(record)
        })
        .await
    };
    let notice = match saved {
        Ok(()) => Notice::success(format!("Task added and saved: {}", summary)),
        Err(e) => Notice::error(format!(
            "Error saving task to CSV: {}. Task added to session, but not saved persistently.",
            e
        )),
    };
    render_tasks(&state, user.as_deref(), "register", Some(notice))
}

fn render_care(
    state: &AppState,
    user: Option<&str>,
    view: &str,
    notice: Option<Notice>,
) -> PageResult {
    let records = lock(&state.care).records().to_vec();
    let html = state.render(
        "care.html",
        "Care",
        user,
        notice,
        context! {
            view => view,
            today => state.today().to_string(),
            species_names => catalog::species_names(),
            care => records,
        },
    )?;
    Ok(Html(html))
}

pub async fn care(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> PageResult {
    let user = state.current_user(&headers);
    render_care(&state, user.as_deref(), query.view.as_deref().unwrap_or("record"), None)
}

pub async fn add_care(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<CareForm>,
) -> PageResult {
    let user = state.current_user(&headers);
    let record = match form.into_record() {
        Ok(record) => record,
        Err(e) => {
            let notice = Notice::error(e.to_string());
            return render_care(&state, user.as_deref(), "record", Some(notice));
        }
    };

    let summary = format!("{} for {} on {}", record.activity, record.species, record.day);
    let saved = {
        let state = state.clone();
        run_blocking(move || {
            let mut care = lock(&state.care);
            care.add(record)
        })
        .await
    };
    let notice = match saved {
        Ok(()) => Notice::success(format!("Care activity recorded and saved: {}", summary)),
        Err(e) => Notice::error(format!(
            "Error saving care data to CSV: {}. \
             Care activity added to session, but not saved persistently.",
            e
        )),
    };
    render_care(&state, user.as_deref(), "record", Some(notice))
}

// === Daily changes ===

fn render_schedule(state: &AppState, user: Option<&str>, notice: Option<Notice>) -> PageResult {
    let changes = state.current_schedule().changes().to_vec();
    let html = state.render(
        "schedule.html",
        "Daily Changes",
        user,
        notice,
        context! { today => state.today().to_string(), changes => changes },
    )?;
    Ok(Html(html))
}

pub async fn schedule(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    let user = state.current_user(&headers);
    render_schedule(&state, user.as_deref(), None)
}

#[derive(Deserialize)]
pub struct ChangeForm {
    pub date: String,
    #[serde(default)]
    pub message: String,
}

pub async fn add_change(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ChangeForm>,
) -> PageResult {
    let user = state.current_user(&headers);
    let result = match parse_day(&form.date) {
        Ok(date) => {
            let today = state.today();
            let state = state.clone();
            run_blocking(move || {
                let mut schedule = state.current_schedule();
                schedule.schedule(date, &form.message, today)
            })
            .await
        }
        Err(e) => Err(e),
    };

    let notice = match result {
        Ok(()) => Notice::success("Custom change scheduled successfully!"),
        Err(LepiError::Validation(msg)) => Notice::error(msg),
        Err(e) => Notice::error(format!(
            "Error saving schedule: {}. Change added to session, but not saved persistently.",
            e
        )),
    };
    render_schedule(&state, user.as_deref(), Some(notice))
}

// === Sales ===

#[derive(Deserialize)]
pub struct SalesQuery {
    seller: Option<String>,
}

async fn render_sales(
    state: &Arc<AppState>,
    user: Option<&str>,
    seller: Option<String>,
    notice: Option<Notice>,
) -> PageResult {
    let seller = seller.filter(|s| !s.trim().is_empty());
    let path = state.config.data_file(SALES_FILE);
    let filter = seller.clone();
    let sales = run_blocking(move || sales::load_sales(&path, filter.as_deref())).await;

    let (sales, notice) = match sales {
        Ok(sales) => (sales, notice),
        Err(e) => (Vec::new(), Some(Notice::error(format!("Error reading sales: {}", e)))),
    };

    let html = state.render(
        "sales.html",
        "Sales",
        user,
        notice,
        context! {
            companies => COMPANIES,
            species_names => catalog::species_names(),
            seller => seller,
            sales => sales,
        },
    )?;
    Ok(Html(html))
}

pub async fn sales(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SalesQuery>,
) -> PageResult {
    let user = state.current_user(&headers);
    render_sales(&state, user.as_deref(), query.seller, None).await
}

pub async fn record_sale(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SaleForm>,
) -> PageResult {
    let user = state.current_user(&headers);
    let seller = state.seller(user.as_deref());

    let notice = match form.into_record(&seller, Local::now()) {
        Ok(sale) => {
            let message = format!("Sale recorded for: {} from {}!", sale.purchaser, sale.company);
            let state = state.clone();
            let path = state.config.data_file(SALES_FILE);
            let saved = run_blocking(move || {
                let _guard = lock(&state.sales);
                sales::record_sale(&path, &sale)
            })
            .await;
            match saved {
                Ok(()) => Notice::success(message),
                Err(e) => Notice::error(format!("Error saving sale: {}", e)),
            }
        }
        Err(e) => Notice::warning(e.to_string()),
    };
    render_sales(&state, user.as_deref(), None, Some(notice)).await
}

// === Point of sale ===

#[derive(Serialize)]
struct ItemRow {
    id: u32,
    name: &'static str,
    price_display: String,
}

async fn render_pos(
    state: &Arc<AppState>,
    user: Option<&str>,
    notice: Option<Notice>,
) -> PageResult {
    let order = state.with_order(user, |order| order.clone());
    let path = state.config.data_file(PURCHASES_FILE);
    let history: Vec<sales::PurchaseRecord> = run_blocking(move || store::load_records(&path))
        .await
        .unwrap_or_default();
    let items: Vec<ItemRow> = ITEMS
        .iter()
        .map(|i| ItemRow {
            id: i.id,
            name: i.name,
            price_display: sales::money(u64::from(i.price)),
        })
        .collect();

    let html = state.render(
        "pos.html",
        "Point of Sale",
        user,
        notice,
        context! {
            items => items,
            total => sales::money(order.total()),
            order => order,
            today => Local::now().format("%A, %B %d, %Y").to_string(),
            history => history,
            has_receipt => state.last_receipt(user).is_some(),
        },
    )?;
    Ok(Html(html))
}

pub async fn pos(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    let user = state.current_user(&headers);
    render_pos(&state, user.as_deref(), None).await
}

#[derive(Deserialize)]
pub struct AddItemForm {
    item_id: u32,
    quantity: u32,
}

pub async fn pos_add(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<AddItemForm>,
) -> PageResult {
    let user = state.current_user(&headers);
    let added = state.with_order(user.as_deref(), |order| {
        order.add(form.item_id, form.quantity).map(|line| line.name.clone())
    });
    let notice = match added {
        Ok(name) => Notice::success(format!("Added {} x {} to cart!", form.quantity, name)),
        Err(e) => Notice::error(e.to_string()),
    };
    render_pos(&state, user.as_deref(), Some(notice)).await
}

fn data_uri(bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes).ok()?;
    let mime = format.to_mime_type();
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(format!("data:{};base64,{}", mime, encoded))
}

pub async fn pos_complete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> std::result::Result<Response, PageError> {
    let user = state.current_user(&headers);
    let upload = match read_multipart(multipart).await {
        Ok((_, upload)) => upload,
        Err(e) => {
            let notice = Notice::error(e.to_string());
            return Ok(render_pos(&state, user.as_deref(), Some(notice)).await?.into_response());
        }
    };

    let order = state.take_order(user.as_deref());
    if order.is_empty() {
        let notice =
            Notice::warning("Please add items to your cart before completing the purchase.");
        return Ok(render_pos(&state, user.as_deref(), Some(notice)).await?.into_response());
    }

    let completed = {
        let state = state.clone();
        let order = order.clone();
        run_blocking(move || {
            let (name, image) = match &upload {
                Some(u) => (Some(u.name.clone()), data_uri(&u.bytes)),
                None => (None, None),
            };
            let path = state.config.data_file(PURCHASES_FILE);
            let _guard = lock(&state.purchases);
            let receipt =
                sales::complete_purchase(&path, &order, name.as_deref(), image, Local::now())?;
            receipt.to_html()
        })
        .await
    };

    match completed {
        Ok(html) => {
            state.keep_receipt(user.as_deref(), &html);
            Ok(Html(html).into_response())
        }
        Err(e) => {
            state.with_order(user.as_deref(), |current| *current = order);
            let notice = Notice::error(format!("Could not complete the purchase: {}", e));
            Ok(render_pos(&state, user.as_deref(), Some(notice)).await?.into_response())
        }
    }
}

pub async fn pos_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> std::result::Result<Response, PageError> {
    let user = state.current_user(&headers);
    match state.last_receipt(user.as_deref()) {
        Some(html) => Ok(Html(html).into_response()),
        None => {
            let notice = Notice::info("No completed purchase to print yet.");
            Ok(render_pos(&state, user.as_deref(), Some(notice)).await?.into_response())
        }
    }
}

// === Accounts ===

#[derive(Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

async fn render_login(
    state: &Arc<AppState>,
    user: Option<&str>,
    notice: Option<Notice>,
) -> PageResult {
    let path = state.config.data_file(LOGIN_RECORDS_FILE);
    let records = run_blocking(move || auth::login_records(&path)).await.unwrap_or_default();
    let ctx = context! { records => records };
    let html = state.render("login.html", "Login", user, notice, ctx)?;
    Ok(Html(html))
}

pub async fn login_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> std::result::Result<Response, PageError> {
    if let Some(user) = state.current_user(&headers) {
        return Ok(render_login(&state, Some(&user), None).await?.into_response());
    }

    let auto = {
        let state = state.clone();
        run_blocking(move || {
            let log = state.config.data_file(LOGIN_RECORDS_FILE);
            Ok(auth::auto_login(&state.config.auth, &log))
        })
        .await?
    };
    match auto {
        Some(user) => {
            let cookie = state.start_session(&user);
            let notice = Notice::success("Signed in automatically.");
            let page = render_login(&state, Some(&user), Some(notice)).await?;
            Ok(([(header::SET_COOKIE, cookie)], page).into_response())
        }
        None => Ok(render_login(&state, None, None).await?.into_response()),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<Credentials>,
) -> std::result::Result<Response, PageError> {
    let attempt = {
        let state = state.clone();
        run_blocking(move || {
            let log = state.config.data_file(LOGIN_RECORDS_FILE);
            auth::login(&state.db, &log, &form.username, &form.password)
        })
        .await
    };

    match attempt {
        Ok(user) => {
            let cookie = state.start_session(&user);
            let notice = Notice::success(format!("Welcome, {}!", user));
            let page = render_login(&state, Some(&user), Some(notice)).await?;
            Ok(([(header::SET_COOKIE, cookie)], page).into_response())
        }
        Err(e) if e.is_user_error() => {
            let notice = Notice::error(e.to_string());
            Ok(render_login(&state, None, Some(notice)).await?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn signup_form(State(state): State<Arc<AppState>>, headers: HeaderMap) -> PageResult {
    let user = state.current_user(&headers);
    Ok(Html(state.render("signup.html", "Sign Up", user.as_deref(), None, context! {})?))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Form(form): Form<Credentials>,
) -> PageResult {
    let created = {
        let state = state.clone();
        run_blocking(move || auth::sign_up(&state.db, &form.username, &form.password)).await
    };

    let notice = match created {
        Ok(()) => Notice::success("Account created. You can now log in."),
        Err(e) if e.is_user_error() => Notice::error(e.to_string()),
        Err(e) => return Err(e.into()),
    };
    Ok(Html(state.render("signup.html", "Sign Up", None, Some(notice), context! {})?))
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let cookie = state.end_session(&headers);
    ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

pub async fn login_records_csv(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Response, PageError> {
    let path = state.config.data_file(LOGIN_RECORDS_FILE);
    let csv = run_blocking(move || {
        let table = store::load_table(&path);
        if table.headers.is_empty() {
            Ok(format!("{}\n", LoginRecord::HEADERS.join(",")))
        } else {
            table.to_csv_string()
        }
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"login_records.csv\""),
        ],
        csv,
    )
        .into_response())
}
