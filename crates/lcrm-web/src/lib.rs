//! JSON API over the order store and the payroll engine.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use lcrm_core::{
    ComponentLine, MiscExpense, NewComponentLine, NewMiscExpense, NewOrder, NewProduct, NewWorker,
    Order, OrderEdit, OrderStatus, Product, Role,
};
use lcrm_notify::generate_verification_code;
use lcrm_payroll::{PayrollEngine, PayrollError};
use lcrm_storage::{CrmStore, StoreError};
use lcrm_sync::{NoopEventSink, OrderEventSink};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "lcrm-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CrmStore>,
    pub payroll: PayrollEngine,
    pub events: Arc<dyn OrderEventSink>,
}

impl AppState {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self {
            payroll: PayrollEngine::new(store.clone()),
            store,
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn OrderEventSink>) -> Self {
        self.events = events;
        self
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unprocessable(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<PayrollError> for ApiError {
    fn from(err: PayrollError) -> Self {
        match err {
            PayrollError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            PayrollError::NonPositiveDeduction(_)
            | PayrollError::DeductionExceedsRemaining { .. }
            | PayrollError::NegativeMeasure(_)
            | PayrollError::MarginOverflow(_) => ApiError::Unprocessable(err.to_string()),
            PayrollError::Store(store) => store.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(err) => {
                error!(error = %format!("{err:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/orders", get(list_orders_handler).post(create_order_handler))
        .route("/orders/{id}", get(order_detail_handler).put(update_order_handler))
        .route("/orders/{id}/status", put(order_status_handler))
        .route("/orders/{id}/margin", get(margin_handler))
        .route("/orders/{id}/margin-flags", put(margin_flags_handler))
        .route("/orders/{id}/measures/{role}", put(measure_handler))
        .route(
            "/orders/{id}/components",
            post(add_component_handler).delete(clear_components_handler),
        )
        .route("/orders/{id}/expenses", post(add_expense_handler))
        .route("/workers", get(list_workers_handler).post(create_worker_handler))
        .route("/workers/{id}/verification-code", post(verification_code_handler))
        .route("/products", get(list_products_handler).post(create_product_handler))
        .route("/products/{id}", get(product_handler).put(update_product_handler))
        .route("/payroll", get(payroll_summary_handler))
        .route("/payroll/recompute", post(payroll_recompute_handler))
        .route("/payments", get(list_payments_handler))
        .route("/payments/{id}/net", get(net_payable_handler))
        .route("/payments/{id}/paid", post(mark_paid_handler))
        .route("/payments/{id}/unpaid", post(mark_unpaid_handler))
        .route("/payments/{id}/deductions", post(add_deduction_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env(state: AppState) -> anyhow::Result<()> {
    let port: u16 = std::env::var("LCRM_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "web api listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_orders_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.store.list_orders().await?))
}

async fn require_order(state: &AppState, id: i64) -> ApiResult<Order> {
    state
        .store
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))
}

/// Largest amount the NUMERIC(14, 2) columns hold.
fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

fn check_amount(field: &str, value: Option<Decimal>) -> ApiResult<()> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(ApiError::Unprocessable(format!(
            "{field} cannot be negative"
        ))),
        Some(v) if v > max_amount() => Err(ApiError::Unprocessable(format!(
            "{field} is too large"
        ))),
        _ => Ok(()),
    }
}

fn check_names(first_name: &str, last_name: &str) -> ApiResult<()> {
    if first_name.trim().is_empty() && last_name.trim().is_empty() {
        return Err(ApiError::Unprocessable(
            "first_name or last_name is required".into(),
        ));
    }
    Ok(())
}

async fn check_workers(state: &AppState, ids: impl IntoIterator<Item = i64>) -> ApiResult<()> {
    for worker_id in ids {
        if state.store.get_worker(worker_id).await?.is_none() {
            return Err(ApiError::Unprocessable(format!(
                "worker {worker_id} does not exist"
            )));
        }
    }
    Ok(())
}

async fn recompute_payroll(state: &AppState, order_id: i64, reason: &str) {
    if let Err(err) = state.payroll.recompute_order(order_id).await {
        warn!(order_id, error = %err, reason, "payroll recompute failed");
    }
}

async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    check_names(&new.first_name, &new.last_name)?;
    check_amount("contract_amount", new.contract_amount)?;
    check_amount("advance", new.advance)?;
    check_amount("measured_area", new.measured_area)?;
    check_amount("delivery_cost", new.delivery_cost)?;
    check_amount("workshop_cost", new.workshop_cost)?;
    let assigned = [new.project_designer_id, new.decorator_id, new.assembler_id];
    check_workers(&state, assigned.into_iter().flatten()).await?;

    let order = state.store.insert_order(new).await?;
    info!(order_id = order.id, "order created");
    recompute_payroll(&state, order.id, "order created").await;
    state.events.order_created(&order).await;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn update_order_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(edit): Json<OrderEdit>,
) -> ApiResult<Json<Order>> {
    let before = require_order(&state, id).await?;
    check_names(&edit.first_name, &edit.last_name)?;
    check_amount("contract_amount", edit.contract_amount)?;
    check_amount("advance", edit.advance)?;
    check_amount("measured_area", edit.measured_area)?;
    check_amount("delivery_cost", edit.delivery_cost)?;
    check_amount("workshop_cost", edit.workshop_cost)?;
    check_workers(&state, edit.worker_ids()).await?;

    let order = state.store.update_order(id, edit).await?;
    info!(order_id = id, "order updated");
    recompute_payroll(&state, id, "order updated").await;
    if order.status != before.status {
        state.events.status_changed(&order, before.status).await;
    }
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: OrderStatus,
}

async fn order_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<Order>> {
    let before = require_order(&state, id).await?;
    if body.status == before.status {
        return Ok(Json(before));
    }
    let mut edit = OrderEdit::from_order(&before);
    edit.status = body.status;
    let order = state.store.update_order(id, edit).await?;
    info!(order_id = id, from = %before.status, to = %order.status, "order status changed");
    state.events.status_changed(&order, before.status).await;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
struct MarginFlagsBody {
    margin_first: bool,
    margin_second: bool,
}

async fn margin_flags_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<MarginFlagsBody>,
) -> ApiResult<Json<Order>> {
    let order = state
        .store
        .set_margin_flags(id, body.margin_first, body.margin_second)
        .await?;
    Ok(Json(order))
}

#[derive(Debug, Serialize)]
struct OrderDetail {
    #[serde(flatten)]
    order: Order,
    components: Vec<ComponentLine>,
    expenses: Vec<MiscExpense>,
}

async fn order_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let order = require_order(&state, id).await?;
    let detail = OrderDetail {
        components: state.store.components_for(id).await?,
        expenses: state.store.expenses_for(id).await?,
        order,
    };
    Ok(Json(detail).into_response())
}

async fn margin_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    Ok(Json(state.payroll.margin(id).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct MeasureBody {
    measure: Option<Decimal>,
}

async fn measure_handler(
    State(state): State<Arc<AppState>>,
    Path((id, role)): Path<(i64, String)>,
    Json(body): Json<MeasureBody>,
) -> ApiResult<Json<Order>> {
    let role: Role = role
        .parse()
        .map_err(|err: lcrm_core::UnknownVariant| ApiError::BadRequest(err.to_string()))?;
    check_amount("measure", body.measure)?;
    state.payroll.set_manual_measure(id, role, body.measure).await?;
    recompute_payroll(&state, id, "measure changed").await;
    Ok(Json(require_order(&state, id).await?))
}

async fn add_component_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(line): Json<NewComponentLine>,
) -> ApiResult<(StatusCode, Json<ComponentLine>)> {
    if line.quantity < 1 {
        return Err(ApiError::Unprocessable("quantity must be at least 1".into()));
    }
    check_amount("custom_price", line.custom_price)?;
    require_order(&state, id).await?;
    if state.store.get_product(line.product_id).await?.is_none() {
        return Err(ApiError::Unprocessable(format!(
            "product {} does not exist",
            line.product_id
        )));
    }
    let component = state.store.add_component(id, line).await?;
    Ok((StatusCode::CREATED, Json(component)))
}

async fn clear_components_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let removed = state.store.clear_components(id).await?;
    info!(order_id = id, removed, "components cleared");
    Ok(Json(json!({ "removed": removed })).into_response())
}

async fn add_expense_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(expense): Json<NewMiscExpense>,
) -> ApiResult<(StatusCode, Json<MiscExpense>)> {
    check_amount("price", Some(expense.price))?;
    let expense = state.store.add_expense(id, expense).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn list_workers_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    Ok(Json(state.store.list_workers().await?).into_response())
}

async fn create_worker_handler(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewWorker>,
) -> ApiResult<Response> {
    if new.name.trim().is_empty() {
        return Err(ApiError::Unprocessable("name is required".into()));
    }
    let worker = state.store.insert_worker(new).await?;
    Ok((StatusCode::CREATED, Json(worker)).into_response())
}

async fn verification_code_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let code = generate_verification_code();
    let profile = state.store.set_verification_code(id, &code).await?;
    info!(worker_id = id, "verification code issued");
    Ok(Json(json!({ "worker_id": profile.worker_id, "code": code })).into_response())
}

fn check_product(product: &NewProduct) -> ApiResult<()> {
    if product.name.trim().is_empty() {
        return Err(ApiError::Unprocessable("name is required".into()));
    }
    check_amount("our_price", Some(product.our_price))
}

async fn list_products_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.store.list_products().await?))
}

async fn product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Product>> {
    state
        .store
        .get_product(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("product {id} not found")))
}

async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    check_product(&new)?;
    let product = state.store.insert_product(new).await?;
    info!(product_id = product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(product): Json<NewProduct>,
) -> ApiResult<Json<Product>> {
    check_product(&product)?;
    Ok(Json(state.store.update_product(id, product).await?))
}

async fn payroll_summary_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    Ok(Json(state.payroll.summary().await?).into_response())
}

async fn payroll_recompute_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    Ok(Json(state.payroll.run_pass().await?).into_response())
}

async fn list_payments_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    Ok(Json(state.store.list_payments().await?).into_response())
}

async fn net_payable_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    Ok(Json(state.payroll.net_payable(id).await?).into_response())
}

async fn mark_paid_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    Ok(Json(state.payroll.mark_paid(id).await?).into_response())
}

async fn mark_unpaid_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    Ok(Json(state.payroll.mark_unpaid(id).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct DeductionBody {
    amount: Decimal,
    #[serde(default)]
    reason: String,
}

async fn add_deduction_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<DeductionBody>,
) -> ApiResult<Response> {
    let deduction = state
        .payroll
        .add_deduction(id, body.amount, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(deduction)).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use lcrm_core::Payment;
    use lcrm_storage::MemoryStore;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    #[derive(Default)]
    struct CountingSink {
        created: AtomicUsize,
        status_changes: AtomicUsize,
    }

    #[async_trait]
    impl OrderEventSink for CountingSink {
        async fn order_created(&self, _order: &Order) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }

        async fn status_changed(&self, _order: &Order, _previous: OrderStatus) {
            self.status_changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn seeded_app() -> (Router, Arc<CountingSink>, i64) {
        let sink = Arc::new(CountingSink::default());
        let state = AppState::new(Arc::new(MemoryStore::new())).with_events(sink.clone());
        let app = app(state);
        let (status, worker) = send(
            &app,
            "POST",
            "/workers",
            Some(json!({
                "name": "Anna",
                "surname": "Ivanova",
                "method": "percent",
                "percentage": "10"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let worker_id = worker["id"].as_i64().unwrap();
        (app, sink, worker_id)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app(AppState::new(Arc::new(MemoryStore::new())));
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn creating_an_order_computes_pay_and_fires_event() {
        let (app, sink, worker_id) = seeded_app().await;
        let (status, order) = send(
            &app,
            "POST",
            "/orders",
            Some(json!({
                "first_name": "393",
                "last_name": "Gulnaz",
                "contract_amount": "250000",
                "decorator_id": worker_id
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["status"], "drafting");
        assert_eq!(sink.created.load(Ordering::SeqCst), 1);

        let (_, payments) = send(&app, "GET", "/payments", None).await;
        let payments: Vec<Payment> = serde_json::from_value(payments).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, Decimal::from(25_000));
        assert_eq!(payments[0].role, Role::Decorator);

        let (_, pass) = send(&app, "POST", "/payroll/recompute", None).await;
        assert_eq!(pass["unchanged"], 1);
        assert_eq!(pass["created"], 0);
    }

    #[tokio::test]
    async fn order_validation() {
        let (app, _, _) = seeded_app().await;
        let (status, _) = send(
            &app,
            "POST",
            "/orders",
            Some(json!({ "first_name": " ", "last_name": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &app,
            "POST",
            "/orders",
            Some(json!({ "first_name": "1", "last_name": "", "assembler_id": 999 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("999"));

        let (status, _) = send(&app, "GET", "/orders/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deductions_are_validated() {
        let (app, _, worker_id) = seeded_app().await;
        send(
            &app,
            "POST",
            "/orders",
            Some(json!({
                "first_name": "401",
                "last_name": "",
                "contract_amount": "100000",
                "decorator_id": worker_id
            })),
        )
        .await;
        let (_, payments) = send(&app, "GET", "/payments", None).await;
        let payment_id = payments[0]["id"].as_i64().unwrap();
        let uri = format!("/payments/{payment_id}/deductions");

        let (status, _) = send(&app, "POST", &uri, Some(json!({ "amount": "0" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _) = send(&app, "POST", &uri, Some(json!({ "amount": "10001" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(json!({ "amount": "4000", "reason": "tools" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, net) = send(&app, "GET", &format!("/payments/{payment_id}/net"), None).await;
        let net: Decimal = net["net"].as_str().unwrap().parse().unwrap();
        assert_eq!(net, Decimal::from(6_000));

        let (status, _) = send(&app, "POST", "/payments/999/deductions", Some(json!({ "amount": "1" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn measures_and_paid_flags() {
        let (app, _, _) = seeded_app().await;
        let (_, assembler) = send(
            &app,
            "POST",
            "/workers",
            Some(json!({ "name": "Oleg", "method": "linear", "rate_per_unit": "800" })),
        )
        .await;
        let (_, order) = send(
            &app,
            "POST",
            "/orders",
            Some(json!({
                "first_name": "415",
                "last_name": "",
                "assembler_id": assembler["id"]
            })),
        )
        .await;
        let order_id = order["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/orders/{order_id}/measures/assembler"),
            Some(json!({ "measure": "-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _) = send(
            &app,
            "PUT",
            &format!("/orders/{order_id}/measures/painter"),
            Some(json!({ "measure": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(
            &app,
            "PUT",
            &format!("/orders/{order_id}/measures/assembler"),
            Some(json!({ "measure": "12.5" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, payments) = send(&app, "GET", "/payments", None).await;
        let payments: Vec<Payment> = serde_json::from_value(payments).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, Decimal::from(10_000));

        let (status, paid) = send(&app, "POST", &format!("/payments/{}/paid", payments[0].id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(paid["is_paid"], true);
        let (_, unpaid) = send(&app, "POST", &format!("/payments/{}/unpaid", payments[0].id), None).await;
        assert_eq!(unpaid["is_paid"], false);
        assert!(unpaid["paid_at"].is_null());

        let (status, summary) = send(&app, "GET", "/payroll", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["workers"][0]["worker"]["name"], "Oleg");
    }

    #[tokio::test]
    async fn margin_reflects_costs() {
        let (app, _, worker_id) = seeded_app().await;
        let (_, order) = send(
            &app,
            "POST",
            "/orders",
            Some(json!({
                "first_name": "420",
                "last_name": "",
                "contract_amount": "100000",
                "decorator_id": worker_id,
                "delivery_cost": "3000"
            })),
        )
        .await;
        let order_id = order["id"].as_i64().unwrap();
        let (status, hinge) = send(
            &app,
            "POST",
            "/products",
            Some(json!({ "name": "Hinge", "category": "Hinges", "our_price": "500" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, line) = send(
            &app,
            "POST",
            &format!("/orders/{order_id}/components"),
            Some(json!({
                "product_id": hinge["id"],
                "custom_price": "450",
                "quantity": 4,
                "buyer": "first"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(line["product_name"], "Hinge");
        let (status, _) = send(
            &app,
            "POST",
            &format!("/orders/{order_id}/expenses"),
            Some(json!({ "item": "taxi", "price": "1000", "spent_by": "second" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, detail) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
        assert_eq!(detail["components"].as_array().unwrap().len(), 1);
        assert_eq!(detail["first_name"], "420");

        let (status, margin) = send(&app, "GET", &format!("/orders/{order_id}/margin"), None).await;
        assert_eq!(status, StatusCode::OK);
        let total: Decimal = margin["margin_total"].as_str().unwrap().parse().unwrap();
        // 100000 - (1800 + 1000 + 10000 + 3000)
        assert_eq!(total, Decimal::from(84_200));

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/orders/{order_id}/margin-flags"),
            Some(json!({ "margin_first": false, "margin_second": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, margin) = send(&app, "GET", &format!("/orders/{order_id}/margin"), None).await;
        let first: Decimal = margin["shares"][0]["share"].as_str().unwrap().parse().unwrap();
        let second: Decimal = margin["shares"][1]["share"].as_str().unwrap().parse().unwrap();
        assert_eq!(first, Decimal::ZERO);
        // whole margin less what the first partner spent on hinges
        assert_eq!(second, Decimal::from(82_400));

        let (status, cleared) =
            send(&app, "DELETE", &format!("/orders/{order_id}/components"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleared["removed"], 1);
    }

    #[tokio::test]
    async fn component_needs_a_known_product_and_sane_price() {
        let (app, _, _) = seeded_app().await;
        let (_, order) = send(
            &app,
            "POST",
            "/orders",
            Some(json!({ "first_name": "430", "last_name": "" })),
        )
        .await;
        let uri = format!("/orders/{}/components", order["id"]);
        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(json!({ "product_id": 999, "buyer": "first" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, board) = send(
            &app,
            "POST",
            "/products",
            Some(json!({ "name": "Board", "our_price": "2000" })),
        )
        .await;
        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(json!({
                "product_id": board["id"],
                "custom_price": "79228162514264337593543950335",
                "buyer": "second"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/orders/{}/expenses", order["id"]),
            Some(json!({ "item": "x", "price": "1000000000000", "spent_by": "first" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, "GET", &format!("/orders/{}/margin", order["id"]), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn editing_an_order_recomputes_pay_and_reports_status() {
        let (app, sink, worker_id) = seeded_app().await;
        let (_, order) = send(
            &app,
            "POST",
            "/orders",
            Some(json!({
                "first_name": "440",
                "last_name": "Kitchen",
                "contract_amount": "100000",
                "decorator_id": worker_id
            })),
        )
        .await;
        let order_id = order["id"].as_i64().unwrap();
        let uri = format!("/orders/{order_id}");

        let (status, edited) = send(
            &app,
            "PUT",
            &uri,
            Some(json!({
                "first_name": "440",
                "last_name": "Kitchen",
                "status": "being_cut",
                "contract_amount": "120000",
                "advance": "50000",
                "decorator_id": worker_id,
                "delivery_cost": "2500"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["status"], "being_cut");
        assert_eq!(sink.status_changes.load(Ordering::SeqCst), 1);

        let (_, payments) = send(&app, "GET", "/payments", None).await;
        let payments: Vec<Payment> = serde_json::from_value(payments).unwrap();
        assert_eq!(payments[0].amount, Decimal::from(12_000));

        let (status, _) = send(
            &app,
            "PUT",
            &uri,
            Some(json!({ "first_name": "440", "last_name": "", "status": "ready", "assembler_id": 999 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, same) = send(
            &app,
            "PUT",
            &format!("{uri}/status"),
            Some(json!({ "status": "being_cut" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(same["status"], "being_cut");
        assert_eq!(sink.status_changes.load(Ordering::SeqCst), 1);
        let (_, ready) = send(
            &app,
            "PUT",
            &format!("{uri}/status"),
            Some(json!({ "status": "ready" })),
        )
        .await;
        assert_eq!(ready["status"], "ready");
        assert_eq!(sink.status_changes.load(Ordering::SeqCst), 2);

        let (status, _) = send(
            &app,
            "PUT",
            "/orders/999/status",
            Some(json!({ "status": "ready" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn verification_code_for_unknown_worker_is_not_found() {
        let (app, _, worker_id) = seeded_app().await;
        let (status, body) = send(
            &app,
            "POST",
            &format!("/workers/{worker_id}/verification-code"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"].as_str().unwrap().len(), 6);

        let (status, _) = send(&app, "POST", "/workers/999/verification-code", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
