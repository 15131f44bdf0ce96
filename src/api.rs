//! HTTP surface
//!
//! Storefront, account and admin routes over the services. The signed-in
//! account, when there is one, arrives in the `x-user-id` header.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cart_store::{CartStore, MemoryStorage, CART_DATA_KEY};
use crate::config::Config;
use crate::domain::{CartLine, Category, Customer, CustomerKey, DomainEvent, Order, OrderStatus, Product, TrackingStatus};
use crate::services::{
    AccountError, AccountOverview, AccountService, AdminConsole, AdminError, BuyerForm, CatalogReader, CheckoutError,
    CheckoutOrchestrator, CustomerReconciler, DashboardStats, OrderDetail, PaymentMethod, StatusChange,
};
use crate::store::{RecordStore, StoreError};
use crate::{Error, Result};

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogReader,
    pub checkout: CheckoutOrchestrator,
    pub accounts: AccountService,
    pub admin: AdminConsole,
    pub nats: Option<async_nats::Client>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, config: &Config, nats: Option<async_nats::Client>) -> Self {
        let reconciler = CustomerReconciler::new(store.clone(), config.reconcile_strategy);
        Self {
            catalog: CatalogReader::new(store.clone()),
            checkout: CheckoutOrchestrator::new(store.clone(), reconciler.clone()).with_timeout(config.store_timeout),
            accounts: AccountService::new(store.clone()),
            admin: AdminConsole::new(store, reconciler),
            nats,
        }
    }

    /// Best-effort; a failed publish is logged and otherwise ignored.
    async fn publish(&self, event: DomainEvent) {
        let Some(nats) = &self.nats else { return };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subject = event.subject(), error = %e, "event not serialized");
                return;
            }
        };
        match nats.publish(event.subject().to_string(), payload.into()).await {
            Ok(()) => debug!(subject = event.subject(), "event published"),
            Err(e) => warn!(subject = event.subject(), error = %e, "event not published"),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "amilax-commerce"})) }))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:slug", get(get_product))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/account", get(account_overview))
        .route("/api/v1/account/profile", put(ensure_profile))
        .route("/api/v1/account/addresses", get(list_addresses).post(add_address))
        .route("/api/v1/account/addresses/:id", delete(delete_address))
        .route("/api/v1/account/addresses/:id/default", put(set_default_address))
        .route("/api/v1/admin/orders", get(admin_orders).delete(clear_orders))
        .route("/api/v1/admin/orders/:id", get(admin_order).delete(delete_order))
        .route("/api/v1/admin/orders/:id/status", put(update_status))
        .route("/api/v1/admin/orders/:id/tracking", put(update_tracking))
        .route("/api/v1/admin/customers", get(admin_customers))
        .route("/api/v1/admin/customers/:id/orders", get(customer_orders))
        .route("/api/v1/admin/customers/:id/points", post(adjust_points))
        .route("/api/v1/admin/stats", get(dashboard))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn user_id(headers: &HeaderMap) -> Result<Option<Uuid>> {
    let Some(value) = headers.get(USER_HEADER) else { return Ok(None) };
    let value = value.to_str().map_err(|_| Error::BadRequest(format!("{USER_HEADER} is not text")))?;
    Uuid::parse_str(value.trim()).map(Some).map_err(|_| Error::BadRequest(format!("{USER_HEADER} is not a uuid")))
}

fn signed_in(headers: &HeaderMap) -> Result<Uuid> { user_id(headers)?.ok_or(Error::Unauthenticated) }

// Catalog

#[derive(Debug, Deserialize)]
pub struct ProductParams {
    /// Category id or slug.
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> { Ok(Json(s.catalog.categories().await?)) }

async fn list_products(State(s): State<AppState>, Query(p): Query<ProductParams>) -> Result<Json<Vec<Product>>> {
    if p.featured { return Ok(Json(s.catalog.featured().await?)); }
    let products = match p.category.as_deref() {
        None => s.catalog.products(None).await?,
        Some(category) => match Uuid::parse_str(category) {
            Ok(id) => s.catalog.products(Some(id)).await?,
            Err(_) => s.catalog.products_in(category).await?.ok_or_else(|| Error::NotFound(format!("category {category}")))?,
        },
    };
    Ok(Json(products))
}

async fn get_product(State(s): State<AppState>, Path(slug): Path<String>) -> Result<Json<Product>> {
    s.catalog.product(&slug).await?.map(Json).ok_or_else(|| Error::NotFound(format!("product {slug}")))
}

// Checkout

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    pub buyer: BuyerForm,
    #[serde(default)]
    pub payment: PaymentMethod,
    #[serde(default)]
    pub confirm_card: bool,
}

async fn checkout(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<CheckoutRequest>) -> Result<Response> {
    let user_id = user_id(&headers)?;
    let blob = serde_json::to_string(&r.lines).map_err(|e| Error::BadRequest(e.to_string()))?;
    let mut cart = CartStore::open(MemoryStorage::with_value(CART_DATA_KEY, blob));

    let pending = s.checkout.prepare(&cart, &r.buyer, r.payment, user_id)?;
    let pending = match (pending.needs_card_confirmation(), r.confirm_card) {
        (true, false) => {
            let body = json!({"status": "card_confirmation_required", "total": cart.total().amount()});
            return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
        }
        (true, true) => pending.confirm_card(),
        (false, _) => pending,
    };

    let confirmation = s.checkout.place(pending, &mut cart).await?;
    let order = &confirmation.order;
    s.publish(DomainEvent::OrderPlaced {
        order_id: order.id,
        total: order.total_amount,
        items: confirmation.items.len(),
        customer: CustomerKey::for_order(order),
    })
    .await;
    if let Some(customer) = &confirmation.customer { s.publish(reconciled(customer)).await; }
    Ok((StatusCode::CREATED, Json(confirmation)).into_response())
}

fn reconciled(customer: &Customer) -> DomainEvent {
    DomainEvent::CustomerReconciled {
        customer_id: customer.id,
        total_spent: customer.total_spent,
        loyalty_points: customer.loyalty_points,
    }
}

// Account

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    #[serde(default)]
    pub label: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub full_name: String,
    pub email: Option<String>,
}

async fn ensure_profile(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<ProfileRequest>) -> Result<Json<Customer>> {
    Ok(Json(s.accounts.ensure_profile(signed_in(&headers)?, &r.full_name, r.email).await?))
}

async fn account_overview(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<AccountOverview>> {
    Ok(Json(s.accounts.overview(signed_in(&headers)?).await?))
}

async fn list_addresses(State(s): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse> {
    Ok(Json(s.accounts.addresses().list(signed_in(&headers)?).await?))
}

async fn add_address(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<AddressRequest>) -> Result<impl IntoResponse> {
    let address = s.accounts.addresses().add(signed_in(&headers)?, &r.label, &r.address).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn delete_address(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.accounts.addresses().delete(signed_in(&headers)?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_default_address(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.accounts.addresses().set_default(signed_in(&headers)?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Admin

#[derive(Debug, Deserialize)]
pub struct OrderParams { pub status: Option<OrderStatus> }
#[derive(Debug, Deserialize)]
pub struct StatusRequest { pub status: OrderStatus }
#[derive(Debug, Deserialize)]
pub struct TrackingRequest { pub tracking: TrackingStatus }
#[derive(Debug, Deserialize)]
pub struct CustomerParams { pub search: Option<String> }
#[derive(Debug, Deserialize)]
pub struct PointsRequest { pub delta: i64 }

async fn admin_orders(State(s): State<AppState>, Query(p): Query<OrderParams>) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.admin.list_orders(p.status).await?))
}

async fn admin_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>> {
    Ok(Json(s.admin.order_detail(id).await?))
}

async fn update_status(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StatusRequest>) -> Result<Json<StatusChange>> {
    let change = s.admin.update_status(id, r.status).await?;
    s.publish(DomainEvent::OrderStatusChanged { order_id: id, status: change.order.status, tracking: change.order.tracking_status }).await;
    if let Some(customer) = &change.customer { s.publish(reconciled(customer)).await; }
    Ok(Json(change))
}

async fn update_tracking(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<TrackingRequest>) -> Result<Json<Order>> {
    let order = s.admin.set_tracking(id, r.tracking).await?;
    s.publish(DomainEvent::TrackingStatusChanged { order_id: id, tracking: order.tracking_status }).await;
    Ok(Json(order))
}

async fn delete_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.admin.delete_order(id).await?;
    s.publish(DomainEvent::OrderDeleted { order_id: id }).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_orders(State(s): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(json!({"deleted": s.admin.clear_orders().await?})))
}

async fn admin_customers(State(s): State<AppState>, Query(p): Query<CustomerParams>) -> Result<Json<Vec<Customer>>> {
    Ok(Json(s.admin.customers(p.search.as_deref()).await?))
}

async fn customer_orders(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.admin.customer_orders(id).await?))
}

async fn adjust_points(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<PointsRequest>) -> Result<Json<Customer>> {
    Ok(Json(s.admin.adjust_points(id, r.delta).await?))
}

async fn dashboard(State(s): State<AppState>) -> Result<Json<DashboardStats>> { Ok(Json(s.admin.dashboard().await?)) }

const RETRY_MESSAGE: &str = "Order failed, please retry";
const INTERNAL_MESSAGE: &str = "Something went wrong, please retry";

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Validation(e) | Error::Checkout(CheckoutError::Validation(e)) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            Error::Checkout(CheckoutError::EmptyCart) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::Checkout(CheckoutError::CardConfirmationRequired) => (StatusCode::CONFLICT, self.to_string()),
            Error::Checkout(CheckoutError::OrderFailed(_) | CheckoutError::TimedOut) => {
                (StatusCode::SERVICE_UNAVAILABLE, RETRY_MESSAGE.to_string())
            }
            Error::Account(AccountError::EmptyAddress) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            Error::Account(AccountError::AddressNotFound(_))
            | Error::Admin(AdminError::OrderNotFound(_) | AdminError::CustomerNotFound(_))
            | Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::Store(StoreError::NotFound { .. })
            | Error::Account(AccountError::Store(StoreError::NotFound { .. }))
            | Error::Admin(AdminError::Store(StoreError::NotFound { .. })) => (StatusCode::NOT_FOUND, "Not found".to_string()),
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::Store(_) | Error::Account(AccountError::Store(_)) | Error::Admin(AdminError::Store(_)) | Error::Cart(_) | Error::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        };
        if status.is_server_error() {
            error!(error = ?self, status = status.as_u16(), "request failed");
        }
        (status, Json(json!({"error": message}))).into_response()
    }
}
