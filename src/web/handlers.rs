use super::{AppState, Result, WebError};
use crate::payment::{PaymentError, amount_in_cents};
use crate::records::{HealthReport, locator_string, parcel_from_json, parcel_to_json};
use crate::resolver::{IdentifierResolver, Resolution};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::info;

const INVALID_ID_MESSAGE: &str = "invalid parcel id format";
const NOT_FOUND_MESSAGE: &str = "parcel not found";

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    pub id: Option<String>,
    #[serde(rename = "_id")]
    pub underscore_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResponse {
    pub acknowledged: bool,
    pub inserted_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted_count: u64,
    pub matched_by: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    pub price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

pub async fn root() -> &'static str {
    "Parcel server is running"
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.records.health().await)
}

pub async fn list_parcels(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<JsonValue>>> {
    let parcels = state.records.list(query.email.as_deref()).await?;
    Ok(Json(parcels.into_iter().map(parcel_to_json).collect()))
}

pub async fn list_parcels_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<JsonValue>>> {
    if email.trim().is_empty() {
        return Err(WebError::Input("email is required".to_string()));
    }

    let parcels = state.records.list(Some(&email)).await?;
    Ok(Json(parcels.into_iter().map(parcel_to_json).collect()))
}

pub async fn get_parcel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>> {
    let resolver = resolver_for(&id)?;
    match state.records.fetch(&resolver).await? {
        Resolution::Found { value, .. } => Ok(Json(parcel_to_json(value))),
        Resolution::NotFound { locator_formatted } => {
            Err(not_found(&resolver, locator_formatted))
        }
    }
}

pub async fn create_parcel(
    State(state): State<AppState>,
    Json(payload): Json<JsonValue>,
) -> Result<(StatusCode, Json<InsertResponse>)> {
    let document = parcel_from_json(payload).map_err(|err| WebError::Input(err.to_string()))?;
    let inserted = state.records.insert(document).await?;
    let inserted_id = locator_string(&inserted);

    info!(id = %inserted_id, "parcel created");
    Ok((
        StatusCode::CREATED,
        Json(InsertResponse {
            acknowledged: true,
            inserted_id,
        }),
    ))
}

pub async fn delete_parcel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let resolver = resolver_for(&id)?;
    delete_resolved(&state, &resolver).await
}

/// Identifier taken from the query string (`id`, then `_id`) or a JSON body.
pub async fn delete_parcel_by_query(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
    body: Bytes,
) -> Result<Json<DeleteResponse>> {
    let resolver = match query.id.or(query.underscore_id) {
        Some(id) => resolver_for(&id)?,
        None => resolver_from_body(&body)?,
    };
    delete_resolved(&state, &resolver).await
}

async fn delete_resolved(
    state: &AppState,
    resolver: &IdentifierResolver,
) -> Result<Json<DeleteResponse>> {
    match state.records.delete(resolver).await? {
        Resolution::Found { value, strategy } => {
            info!(id = %resolver.identifier(), %strategy, "parcel deleted");
            Ok(Json(DeleteResponse {
                deleted_count: value,
                matched_by: strategy.name(),
            }))
        }
        Resolution::NotFound { locator_formatted } => {
            Err(not_found(resolver, locator_formatted))
        }
    }
}

fn resolver_for(id: &str) -> Result<IdentifierResolver> {
    IdentifierResolver::new(id).map_err(|_| WebError::invalid_identifier(INVALID_ID_MESSAGE, id))
}

fn resolver_from_body(body: &Bytes) -> Result<IdentifierResolver> {
    if body.is_empty() {
        return Err(WebError::invalid_identifier("parcel id is required", ""));
    }

    let payload: JsonValue = serde_json::from_slice(body)
        .map_err(|err| WebError::Input(format!("request body is not valid JSON: {err}")))?;
    let id = payload
        .get("id")
        .or_else(|| payload.get("_id"))
        .ok_or_else(|| WebError::invalid_identifier("parcel id is required", ""))?;

    IdentifierResolver::from_json(id).map_err(|_| {
        let received = match id {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        };
        WebError::invalid_identifier(INVALID_ID_MESSAGE, received)
    })
}

/// A miss on a well-formed locator is 404; a miss on anything else means the
/// caller sent an id that could never have been valid, which is 400.
fn not_found(resolver: &IdentifierResolver, locator_formatted: bool) -> WebError {
    if locator_formatted {
        WebError::NotFound(NOT_FOUND_MESSAGE.to_string())
    } else {
        WebError::invalid_identifier(INVALID_ID_MESSAGE, resolver.identifier())
    }
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    let gateway = state
        .payments
        .as_ref()
        .ok_or(PaymentError::NotConfigured("STRIPE_SECRET_KEY is not set"))?;

    let amount = amount_in_cents(request.price)?;
    let intent = gateway.create_payment_intent(amount, "usd").await?;

    info!(intent = %intent.id, amount, "payment intent created");
    Ok(Json(PaymentIntentResponse {
        client_secret: intent.client_secret,
    }))
}

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<JsonValue>> {
    let verifier = state
        .webhooks
        .as_ref()
        .ok_or(PaymentError::NotConfigured("STRIPE_WEBHOOK_SECRET is not set"))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("missing Stripe-Signature header".into()))?;

    verifier.verify(signature, &body, chrono::Utc::now().timestamp())?;

    let event: JsonValue = serde_json::from_slice(&body)
        .map_err(|err| WebError::Input(format!("webhook body is not valid JSON: {err}")))?;
    let event_type = event
        .get("type")
        .and_then(JsonValue::as_str)
        .unwrap_or("unknown");
    info!(event_type, "payment webhook received");

    Ok(Json(json!({ "received": true })))
}
