//! In-memory stand-in for a slice of the Stripe API.
//!
//! Speaks the same wire format as the real service: bearer-token auth,
//! form-encoded request bodies with bracketed keys, JSON responses and
//! `{"error": {...}}` failure bodies. State lives in memory per `app()`.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// The only secret key the server accepts.
pub const SECRET_KEY: &str = "sk_test_mock";

/// Card source that always gets declined.
pub const DECLINED_SOURCE: &str = "tok_chargeDeclined";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub object: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Customer {
    fn new() -> Self {
        Self {
            id: format!("cus_{}", Uuid::new_v4().simple()),
            object: "customer".to_string(),
            email: None,
            description: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Customers in creation order.
pub type Db = Arc<RwLock<Vec<Customer>>>;

/// Decoded form or query fields, in wire order.
type Fields = Vec<(String, String)>;

/// Stripe-shaped error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    code: Option<&'static str>,
    param: Option<String>,
}

impl ApiError {
    fn invalid_request(status: StatusCode, message: impl Into<String>, param: Option<&str>) -> Self {
        Self {
            status,
            kind: "invalid_request_error",
            message: message.into(),
            code: None,
            param: param.map(str::to_string),
        }
    }

    fn missing_param(param: &str) -> Self {
        Self {
            code: Some("parameter_missing"),
            ..Self::invalid_request(
                StatusCode::BAD_REQUEST,
                format!("Missing required param: {param}."),
                Some(param),
            )
        }
    }

    fn no_such_customer(id: &str) -> Self {
        Self {
            code: Some("resource_missing"),
            ..Self::invalid_request(
                StatusCode::NOT_FOUND,
                format!("No such customer: '{id}'"),
                Some("id"),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = Map::new();
        error.insert("type".to_string(), json!(self.kind));
        error.insert("message".to_string(), json!(self.message));
        if let Some(code) = self.code {
            error.insert("code".to_string(), json!(code));
        }
        if let Some(param) = self.param {
            error.insert("param".to_string(), json!(param));
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

pub fn app() -> Router {
    let db: Db = Arc::default();
    Router::new()
        .route("/v1/customers", get(list_customers).post(create_customer))
        .route(
            "/v1/customers/{id}",
            get(get_customer)
                .post(update_customer)
                .put(update_customer)
                .delete(delete_customer),
        )
        .route("/v1/charges", post(create_charge))
        .route("/v1/test_helpers/rate_limit", get(rate_limited))
        .route("/v1/test_helpers/server_error", get(server_error))
        .route_layer(middleware::from_fn(require_secret_key))
        .fallback(unknown_route)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_secret_key(request: Request, next: Next) -> Response {
    let expected = format!("Bearer {SECRET_KEY}");
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return ApiError::invalid_request(
            StatusCode::UNAUTHORIZED,
            "Invalid API Key provided",
            None,
        )
        .into_response();
    }
    next.run(request).await
}

async fn unknown_route() -> ApiError {
    ApiError::invalid_request(StatusCode::NOT_FOUND, "Unrecognized request URL", None)
}

async fn list_customers(
    State(db): State<Db>,
    Query(query): Query<Fields>,
) -> Result<Json<Value>, ApiError> {
    let mut limit = 10usize;
    for (key, value) in query {
        match key.as_str() {
            "limit" => {
                limit = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (1..=100).contains(n))
                    .ok_or_else(|| {
                        ApiError::invalid_request(
                            StatusCode::BAD_REQUEST,
                            "Invalid integer: limit must be between 1 and 100",
                            Some("limit"),
                        )
                    })?;
            }
            other => return Err(unknown_param(other)),
        }
    }

    let customers = db.read().await;
    let data: Vec<&Customer> = customers.iter().take(limit).collect();
    Ok(Json(json!({
        "object": "list",
        "url": "/v1/customers",
        "has_more": customers.len() > limit,
        "data": data,
    })))
}

async fn create_customer(
    State(db): State<Db>,
    Form(fields): Form<Fields>,
) -> Result<Json<Customer>, ApiError> {
    let mut customer = Customer::new();
    apply_customer_fields(&mut customer, fields)?;
    db.write().await.push(customer.clone());
    Ok(Json(customer))
}

async fn get_customer(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    let customers = db.read().await;
    customers
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::no_such_customer(&id))
}

async fn update_customer(
    State(db): State<Db>,
    Path(id): Path<String>,
    Form(fields): Form<Fields>,
) -> Result<Json<Customer>, ApiError> {
    let mut customers = db.write().await;
    let customer = customers
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| ApiError::no_such_customer(&id))?;
    // Validate on a copy so a bad field leaves the stored record untouched.
    let mut updated = customer.clone();
    apply_customer_fields(&mut updated, fields)?;
    *customer = updated.clone();
    Ok(Json(updated))
}

async fn delete_customer(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut customers = db.write().await;
    let index = customers
        .iter()
        .position(|c| c.id == id)
        .ok_or_else(|| ApiError::no_such_customer(&id))?;
    customers.remove(index);
    Ok(Json(json!({ "id": id, "object": "customer", "deleted": true })))
}

async fn create_charge(Form(fields): Form<Fields>) -> Result<Json<Value>, ApiError> {
    let mut amount = None;
    let mut currency = None;
    let mut source = None;
    let mut metadata = BTreeMap::new();
    for (key, value) in fields {
        match key.as_str() {
            "amount" => {
                let parsed = value.parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    ApiError::invalid_request(
                        StatusCode::BAD_REQUEST,
                        "Invalid positive integer",
                        Some("amount"),
                    )
                })?;
                amount = Some(parsed);
            }
            "currency" => currency = Some(value),
            "source" => source = Some(value),
            _ => match metadata_key(&key) {
                Some(meta_key) => {
                    metadata.insert(meta_key.to_string(), value);
                }
                None => return Err(unknown_param(&key)),
            },
        }
    }

    let amount = amount.ok_or_else(|| ApiError::missing_param("amount"))?;
    let currency = currency.ok_or_else(|| ApiError::missing_param("currency"))?;
    if source.as_deref() == Some(DECLINED_SOURCE) {
        return Err(ApiError {
            status: StatusCode::PAYMENT_REQUIRED,
            kind: "card_error",
            message: "Your card was declined.".to_string(),
            code: Some("card_declined"),
            param: None,
        });
    }

    Ok(Json(json!({
        "id": format!("ch_{}", Uuid::new_v4().simple()),
        "object": "charge",
        "amount": amount,
        "currency": currency,
        "status": "succeeded",
        "metadata": metadata,
    })))
}

async fn rate_limited() -> ApiError {
    ApiError {
        status: StatusCode::TOO_MANY_REQUESTS,
        kind: "rate_limit_error",
        message: "Too many requests hit the API too quickly.".to_string(),
        code: Some("rate_limit"),
        param: None,
    }
}

async fn server_error() -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        kind: "api_error",
        message: "Something went wrong on Stripe's end.".to_string(),
        code: None,
        param: None,
    }
}

fn apply_customer_fields(customer: &mut Customer, fields: Fields) -> Result<(), ApiError> {
    for (key, value) in fields {
        match key.as_str() {
            "email" => customer.email = non_empty(value),
            "description" => customer.description = non_empty(value),
            _ => match metadata_key(&key) {
                // An empty value unsets the key.
                Some(meta_key) if value.is_empty() => {
                    customer.metadata.remove(meta_key);
                }
                Some(meta_key) => {
                    customer.metadata.insert(meta_key.to_string(), value);
                }
                None => return Err(unknown_param(&key)),
            },
        }
    }
    Ok(())
}

/// `metadata[plan]` -> `plan`.
fn metadata_key(key: &str) -> Option<&str> {
    key.strip_prefix("metadata[")?.strip_suffix(']')
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn unknown_param(key: &str) -> ApiError {
    ApiError::invalid_request(
        StatusCode::BAD_REQUEST,
        format!("Received unknown parameter: {key}"),
        Some(key),
    )
}
