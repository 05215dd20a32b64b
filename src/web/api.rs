// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JSON API handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    response::Json,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    classify_upload, lock, read_multipart, run_blocking, ApiError, AppState, ClassifyOutcome,
};
use crate::catalog::{self, SpeciesInfo, SPECIES};
use crate::classify::{ClassifierKind, ModelStatus};
use crate::sales::{
    self, Order, PosItem, Receipt, SaleForm, SaleRecord, ITEMS, PURCHASES_FILE, SALES_FILE,
};
use crate::store::{self, Table};
use crate::tasks::{parse_day, CareForm, CareRecord, ScheduledChange, TaskForm, TaskRecord};
use crate::LepiError;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Serialize)]
pub struct ModelInfo {
    kind: ClassifierKind,
    label: &'static str,
    status: ModelStatus,
    classes: Vec<String>,
}

pub async fn models(State(state): State<Arc<AppState>>) -> Json<Vec<ModelInfo>> {
    let models = ClassifierKind::ALL
        .iter()
        .map(|kind| ModelInfo {
            kind: *kind,
            label: kind.label(),
            status: state.registry.status(*kind),
            classes: state.registry.catalog(*kind).class_names(),
        })
        .collect();
    Json(models)
}

pub async fn species() -> Json<&'static [SpeciesInfo]> {
    Json(SPECIES)
}

#[derive(Serialize)]
pub struct HostPlants {
    species: String,
    host_plants: String,
}

pub async fn host_plants(Path(species): Path<String>) -> ApiResult<HostPlants> {
    let host_plants = catalog::host_plants(&species)
        .ok_or_else(|| LepiError::Validation(format!("Unknown species: {}", species)))?;
    Ok(Json(HostPlants { species, host_plants }))
}

fn parse_kind(kind: &str) -> std::result::Result<ClassifierKind, ApiError> {
    Ok(kind.parse::<ClassifierKind>()?)
}

pub async fn classify(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    multipart: Multipart,
) -> ApiResult<ClassifyOutcome> {
    let kind = parse_kind(&kind)?;
    let (_, upload) = read_multipart(multipart).await?;
    let upload = upload.ok_or_else(|| LepiError::Validation("No image was uploaded".to_string()))?;
    Ok(Json(classify_upload(state, kind, upload).await?))
}

pub async fn classification_table(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<Table> {
    let kind = parse_kind(&kind)?;
    let path = state.config.classification_log_path(kind);
    Ok(Json(run_blocking(move || Ok(store::load_table(&path))).await?))
}

pub async fn tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskRecord>> {
    let tasks = lock(&state.tasks).records().to_vec();
    Json(tasks)
}

pub async fn add_task(
    State(state): State<Arc<AppState>>,
    Json(form): Json<TaskForm>,
) -> ApiResult<TaskRecord> {
    let record = form.into_record()?;
    let added = record.clone();
    run_blocking(move || {
        let mut tasks = lock(&state.tasks);
        tasks.add(record)
    })
    .await?;
    Ok(Json(added))
}

#[derive(Serialize)]
pub struct TaskDistribution {
    by_activity: Vec<(String, usize)>,
    by_species: Vec<(String, usize)>,
}

pub async fn task_distribution(State(state): State<Arc<AppState>>) -> Json<TaskDistribution> {
    let tasks = lock(&state.tasks);
    Json(TaskDistribution {
        by_activity: tasks.activity_distribution(),
        by_species: tasks.species_distribution(),
    })
}

pub async fn care(State(state): State<Arc<AppState>>) -> Json<Vec<CareRecord>> {
    let care = lock(&state.care).records().to_vec();
    Json(care)
}

pub async fn add_care(
    State(state): State<Arc<AppState>>,
    Json(form): Json<CareForm>,
) -> ApiResult<CareRecord> {
    let record = form.into_record()?;
    let added = record.clone();
    run_blocking(move || {
        let mut care = lock(&state.care);
        care.add(record)
    })
    .await?;
    Ok(Json(added))
}

pub async fn schedule(State(state): State<Arc<AppState>>) -> Json<Vec<ScheduledChange>> {
    let changes = state.current_schedule().changes().to_vec();
    Json(changes)
}

#[derive(Deserialize)]
pub struct NewChange {
    date: String,
    message: String,
}

pub async fn add_change(
    State(state): State<Arc<AppState>>,
    Json(change): Json<NewChange>,
) -> ApiResult<Vec<ScheduledChange>> {
    let date = parse_day(&change.date)?;
    let today = state.today();
    let changes = run_blocking(move || {
        let mut schedule = state.current_schedule();
        schedule.schedule(date, &change.message, today)?;
        Ok(schedule.changes().to_vec())
    })
    .await?;
    Ok(Json(changes))
}

#[derive(Deserialize)]
pub struct SalesQuery {
    seller: Option<String>,
}

pub async fn sales(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SalesQuery>,
) -> ApiResult<Vec<SaleRecord>> {
    let path = state.config.data_file(SALES_FILE);
    let seller = query.seller.filter(|s| !s.trim().is_empty());
    Ok(Json(run_blocking(move || sales::load_sales(&path, seller.as_deref())).await?))
}

#[derive(Deserialize)]
pub struct NewSale {
    /// Defaults to the farm seller
    seller: Option<String>,
    #[serde(flatten)]
    sale: SaleForm,
}

pub async fn record_sale(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewSale>,
) -> ApiResult<SaleRecord> {
    let seller = state.seller(new.seller.as_deref().filter(|s| !s.trim().is_empty()));
    let sale = new.sale.into_record(&seller, Local::now())?;
    let recorded = sale.clone();
    run_blocking(move || {
        let path = state.config.data_file(SALES_FILE);
        let _guard = lock(&state.sales);
        sales::record_sale(&path, &sale)
    })
    .await?;
    Ok(Json(recorded))
}

pub async fn pos_items() -> Json<&'static [PosItem]> {
    Json(ITEMS)
}

#[derive(Deserialize)]
pub struct OrderLineInput {
    item_id: u32,
    quantity: u32,
}

#[derive(Deserialize)]
pub struct PosOrder {
    lines: Vec<OrderLineInput>,
    #[serde(default)]
    image_filename: Option<String>,
}

pub async fn complete_order(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PosOrder>,
) -> ApiResult<Receipt> {
    let mut order = Order::new();
    for line in &input.lines {
        order.add(line.item_id, line.quantity)?;
    }

    let receipt = run_blocking(move || {
        let path = state.config.data_file(PURCHASES_FILE);
        let _guard = lock(&state.purchases);
        let image = input.image_filename.as_deref();
        sales::complete_purchase(&path, &order, image, None, Local::now())
    })
    .await?;
    Ok(Json(receipt))
}
