//! HTTP surface: one route per user action, each calling a service workflow.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::domain::aggregates::{Category, CategoryInput, Product, ProductInput, Purchase, PurchaseInput, Sale};
use crate::domain::alerts::{AlertCounts, StockAlert};
use crate::domain::reports::{DashboardStats, DateRange, InventorySummary, SalesSummary, SalesTrend};
use crate::domain::session::{AuthUser, Credentials, Profile, Session};
use crate::services::{AddToCart, CartView, CheckoutRequest, ProductQuery, Services};
use crate::spreadsheet::{ExportKind, ImportReport, XLSX_CONTENT_TYPE};
use crate::store::{Notification, Store};
use crate::{ErrorKind, PosError};

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub store: Arc<Store>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product).put(update_product).delete(deactivate_product))
        .route("/api/v1/products/:id/reactivate", post(reactivate_product))
        .route("/api/v1/products/:id/image", post(upload_image))
        .route("/api/v1/categories", get(list_categories).post(create_category))
        .route("/api/v1/categories/:id", put(update_category).delete(delete_category))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_to_cart).put(set_cart_quantity).delete(remove_from_cart))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/sales", get(list_sales))
        .route("/api/v1/purchases", get(list_purchases).post(create_purchase))
        .route("/api/v1/purchases/:id", get(get_purchase))
        .route("/api/v1/purchases/:id/receive", post(receive_purchase))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/alerts/refresh", post(refresh_alerts))
        .route("/api/v1/reports/dashboard", get(dashboard))
        .route("/api/v1/reports/trend", get(sales_trend))
        .route("/api/v1/reports/sales-summary", get(sales_summary))
        .route("/api/v1/reports/inventory-summary", get(inventory_summary))
        .route("/api/v1/import/products", post(import_products))
        .route("/api/v1/export/:kind", get(export))
        .route("/api/v1/auth/sign-out", post(sign_out))
        .route("/api/v1/auth/session", get(current_session))
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/:id", delete(dismiss_notification))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-pos"})) }))
        .route("/api/v1/auth/sign-in", post(sign_in))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .with_state(state)
}

/// Lets a request through only when it carries the live session's token.
async fn require_session(State(s): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = match (bearer_token(&req), s.store.access_token()) {
        (Some(presented), Some(current)) => presented == current,
        _ => false,
    };
    if !authorized {
        return ApiError(PosError::Unauthorized).into_response();
    }
    next.run(req).await
}

fn bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim()).filter(|t| !t.is_empty())
}

// =============================================================================
// Errors
// =============================================================================

pub struct ApiError(PosError);

type ApiResult<T> = std::result::Result<T, ApiError>;

impl<E: Into<PosError>> From<E> for ApiError {
    fn from(err: E) -> Self { Self(err.into()) }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, Vec<String>>>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match (&self.0, self.0.kind()) {
            (PosError::Remote { status, .. }, _) if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            (_, ErrorKind::Validation | ErrorKind::Import) => StatusCode::UNPROCESSABLE_ENTITY,
            (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Unauthorized) => StatusCode::UNAUTHORIZED,
            (_, ErrorKind::Remote) => StatusCode::BAD_GATEWAY,
            (_, ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn fields(&self) -> Option<BTreeMap<String, Vec<String>>> {
        let PosError::Validation(errors) = &self.0 else { return None };
        let fields = errors.field_errors().into_iter().map(|(field, errs)| {
            let messages = errs.iter().map(|e| e.message.as_ref().map_or_else(|| e.code.to_string(), |m| m.to_string())).collect();
            (field.to_string(), messages)
        });
        Some(fields.collect())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = self.status();
        let message = if kind == ErrorKind::Internal {
            tracing::error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorBody { error: kind.as_str(), message, fields: self.fields() };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Auth and notifications
// =============================================================================

/// The token is only returned by sign-in; later requests send it back as
/// `Authorization: Bearer <token>`.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
    pub profile: Option<Profile>,
}

impl SessionResponse {
    fn new(session: Session, profile: Option<Profile>) -> Self {
        Self { access_token: None, user: session.user, expires_at: session.expires_at, profile }
    }
}

async fn sign_in(State(s): State<AppState>, Json(r): Json<Credentials>) -> ApiResult<Json<SessionResponse>> {
    let (session, profile) = s.services.auth.sign_in(r).await?;
    let access_token = Some(session.access_token.clone());
    Ok(Json(SessionResponse { access_token, ..SessionResponse::new(session, profile) }))
}

async fn sign_out(State(s): State<AppState>) -> ApiResult<StatusCode> {
    s.services.auth.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_session(State(s): State<AppState>) -> ApiResult<Json<SessionResponse>> {
    let (session, profile) = s.services.auth.current().ok_or(PosError::Unauthorized)?;
    Ok(Json(SessionResponse::new(session, profile)))
}

async fn list_notifications(State(s): State<AppState>) -> Json<Vec<Notification>> {
    Json(s.store.select(|st| st.notifications.clone()))
}

async fn dismiss_notification(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.store.dispatch(crate::store::Action::NotificationDismissed(id))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Catalog
// =============================================================================

async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.services.catalog.search(&q).await?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.product(id).await?))
}

async fn create_product(State(s): State<AppState>, Json(r): Json<ProductInput>) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.services.catalog.create_product(r).await?)))
}

async fn update_product(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<ProductInput>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.update_product(id, r).await?))
}

async fn deactivate_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.deactivate(id).await?))
}

async fn reactivate_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.reactivate(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ImageParams { pub file_name: String }

async fn upload_image(State(s): State<AppState>, Path(id): Path<Uuid>, Query(p): Query<ImageParams>, body: Bytes) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.upload_image(id, &p.file_name, body.to_vec()).await?))
}

async fn list_categories(State(s): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(s.services.catalog.categories().await?))
}

async fn create_category(State(s): State<AppState>, Json(r): Json<CategoryInput>) -> ApiResult<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(s.services.catalog.create_category(r).await?)))
}

async fn update_category(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<CategoryInput>) -> ApiResult<Json<Category>> {
    Ok(Json(s.services.catalog.update_category(id, r).await?))
}

async fn delete_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.services.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Cart and sales
// =============================================================================

/// Identifies a cart line; `quantity` is only read by updates.
#[derive(Debug, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub quantity: u32,
}

async fn get_cart(State(s): State<AppState>) -> Json<CartView> {
    Json(s.services.checkout.cart())
}

async fn add_to_cart(State(s): State<AppState>, Json(r): Json<AddToCart>) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.checkout.add_to_cart(r).await?))
}

async fn set_cart_quantity(State(s): State<AppState>, Json(r): Json<CartLine>) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.checkout.set_quantity(r.product_id, r.size, r.color, r.quantity)?))
}

async fn remove_from_cart(State(s): State<AppState>, Json(r): Json<CartLine>) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.checkout.remove(r.product_id, r.size, r.color)?))
}

async fn clear_cart(State(s): State<AppState>) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.checkout.clear()?))
}

async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> ApiResult<(StatusCode, Json<Sale>)> {
    Ok((StatusCode::CREATED, Json(s.services.checkout.complete_sale(r).await?)))
}

/// Optional period filter; both ends must be given to apply.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl RangeParams {
    fn range(&self) -> Option<DateRange> {
        Some(DateRange { start: self.start?, end: self.end? })
    }
}

async fn list_sales(State(s): State<AppState>, Query(p): Query<RangeParams>) -> ApiResult<Json<Vec<Sale>>> {
    Ok(Json(s.services.reports.sales(p.range()).await?))
}

// =============================================================================
// Purchases and alerts
// =============================================================================

async fn list_purchases(State(s): State<AppState>) -> ApiResult<Json<Vec<Purchase>>> {
    Ok(Json(s.services.purchasing.purchases().await?))
}

async fn get_purchase(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Purchase>> {
    Ok(Json(s.services.purchasing.purchase(id).await?))
}

async fn create_purchase(State(s): State<AppState>, Json(r): Json<PurchaseInput>) -> ApiResult<(StatusCode, Json<Purchase>)> {
    Ok((StatusCode::CREATED, Json(s.services.purchasing.create(r).await?)))
}

async fn receive_purchase(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Purchase>> {
    Ok(Json(s.services.purchasing.receive(id).await?))
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<StockAlert>,
    pub counts: AlertCounts,
}

async fn list_alerts(State(s): State<AppState>) -> ApiResult<Json<AlertsResponse>> {
    let alerts = s.services.alerts.alerts().await?;
    Ok(Json(AlertsResponse { alerts, counts: s.services.alerts.counts() }))
}

async fn refresh_alerts(State(s): State<AppState>) -> ApiResult<Json<AlertsResponse>> {
    let alerts = s.services.alerts.refresh().await?;
    Ok(Json(AlertsResponse { alerts, counts: s.services.alerts.counts() }))
}

// =============================================================================
// Reports, import and export
// =============================================================================

async fn dashboard(State(s): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(s.services.reports.dashboard().await?))
}

async fn sales_trend(State(s): State<AppState>, Query(range): Query<DateRange>) -> ApiResult<Json<SalesTrend>> {
    Ok(Json(s.services.reports.trend(range).await?))
}

async fn sales_summary(State(s): State<AppState>, Query(p): Query<RangeParams>) -> ApiResult<Json<SalesSummary>> {
    Ok(Json(s.services.reports.sales_summary(p.range()).await?))
}

async fn inventory_summary(State(s): State<AppState>) -> ApiResult<Json<InventorySummary>> {
    Ok(Json(s.services.reports.inventory_summary().await?))
}

async fn import_products(State(s): State<AppState>, body: Bytes) -> ApiResult<Json<ImportReport>> {
    Ok(Json(s.services.import.import_products(&body).await?))
}

async fn export(State(s): State<AppState>, Path(kind): Path<String>, Query(p): Query<RangeParams>) -> ApiResult<Response> {
    let kind: ExportKind = kind.parse()?;
    let file = s.services.reports.export(kind, p.range()).await?;
    let headers = [
        (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file.file_name)),
    ];
    Ok((headers, file.bytes).into_response())
}
