//! Demographics CRUD and batch handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use lexflow_auth::TenantContext;
use lexflow_core::{demographics_session, webhook_session, WebhookEventKind};
use lexflow_db::models::{DemographicRecord, ListRecords, NewDemographicRecord};
use lexflow_queue::{QueueMessage, Topic};
use lexflow_webhooks::WebhookJob;
use lexflow_workers::{DemographicsJob, RecordAction, RecordEnvelope};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{parse_body, validate_request};
use crate::middleware::CorrelationId;
use crate::models::{
    record_to_api, BatchCreateRequest, BatchCreateResponse, BatchItemResult, BatchMetadata,
    CreateDemographicRequest, CreateDemographicResponse, DeleteDemographicResponse,
    GetDemographicResponse, ListDemographicsResponse, ListQuery, Pagination,
    UpdateDemographicResponse, MAX_BATCH_RECORDS, MAX_PAGE_SIZE,
};
use crate::state::AppState;
use crate::validation::FieldError;

/// Create a single record.
#[utoipa::path(
    post,
    path = "/v1/demographics",
    tag = "Demographics",
    responses(
        (status = 201, description = "Record accepted", body = CreateDemographicResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Idempotency conflict"),
        (status = 429, description = "Rate limit exceeded"),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(correlation): Extension<CorrelationId>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CreateDemographicResponse>), ApiError> {
    let record = accept_one(&state, &context, correlation, &body).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateDemographicResponse {
            id: record.id,
            status: "accepted",
            created_at: record.created_at,
        }),
    ))
}

/// Create up to 100 records. Items are processed sequentially; a failed
/// item never fails the batch.
#[utoipa::path(
    post,
    path = "/v1/demographics/batch",
    tag = "Demographics",
    responses(
        (status = 202, description = "Batch accepted", body = BatchCreateResponse),
        (status = 413, description = "Too many items"),
    )
)]
pub async fn create_batch(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(correlation): Extension<CorrelationId>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<BatchCreateResponse>), ApiError> {
    let request: BatchCreateRequest = parse_body(&body)?;

    if request.records.len() > MAX_BATCH_RECORDS {
        return Err(ApiError::BatchTooLarge {
            got: request.records.len(),
            limit: MAX_BATCH_RECORDS,
        });
    }
    if request.records.is_empty() {
        return Err(ApiError::Validation(vec![FieldError {
            field: "records".to_string(),
            message: "batch must contain at least one record".to_string(),
        }]));
    }

    let mut results = Vec::with_capacity(request.records.len());
    let mut accepted = 0usize;

    for (index, item) in request.records.iter().enumerate() {
        match accept_one(&state, &context, correlation, item).await {
            Ok(record) => {
                accepted += 1;
                results.push(BatchItemResult {
                    index,
                    id: Some(record.id),
                    status: "accepted",
                    error: None,
                });
            }
            Err(e) => {
                results.push(BatchItemResult {
                    index,
                    id: None,
                    status: "failed",
                    error: Some(item_error(&e)),
                });
            }
        }
    }

    let total = results.len();
    let failed = total - accepted;

    let notify = request
        .batch_options
        .as_ref()
        .is_some_and(|o| o.notify_on_completion);
    if notify {
        if let Some(url) = request.webhook_url.clone() {
            let job = WebhookJob {
                event: WebhookEventKind::DemographicsBatchCompleted,
                tenant: context.tenant.as_str().to_string(),
                data: json!({
                    "total": total,
                    "accepted": accepted,
                    "failed": failed,
                }),
                submission_id: None,
                override_url: Some(url),
            };
            let message = QueueMessage::webhook(
                webhook_session(&context.tenant),
                serde_json::to_value(&job).map_err(lexflow_queue::QueueError::from)?,
                correlation.0,
            );
            state.producer.send(Topic::WebhooksFifo, message).await?;
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchCreateResponse {
            results,
            metadata: BatchMetadata {
                total,
                accepted,
                failed,
            },
        }),
    ))
}

/// List records for the authenticated tenant.
#[utoipa::path(
    get,
    path = "/v1/demographics",
    tag = "Demographics",
    responses((status = 200, description = "Page of records", body = ListDemographicsResponse))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListDemographicsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::Validation(vec![FieldError {
            field: "limit".to_string(),
            message: format!("limit must be 1-{MAX_PAGE_SIZE}"),
        }]));
    }
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::Validation(vec![FieldError {
            field: "offset".to_string(),
            message: "offset must not be negative".to_string(),
        }]));
    }

    let params = ListRecords {
        limit,
        offset,
        status: query.filter_status,
        search: query.search.clone(),
    };
    let (records, total) =
        DemographicRecord::list(&state.db, context.tenant.as_str(), &params).await?;

    Ok(Json(ListDemographicsResponse {
        data: records.iter().map(record_to_api).collect(),
        pagination: Pagination {
            limit,
            offset,
            total,
        },
    }))
}

/// Fetch one record. Records outside the tenant are indistinguishable
/// from absent ones.
#[utoipa::path(
    get,
    path = "/v1/demographics/{id}",
    tag = "Demographics",
    responses(
        (status = 200, description = "The record", body = GetDemographicResponse),
        (status = 404, description = "Not found in this tenant"),
    )
)]
pub async fn get_one(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<GetDemographicResponse>, ApiError> {
    let id = parse_record_id(&id)?;
    let record = DemographicRecord::find_by_id(&state.db, context.tenant.as_str(), id)
        .await?
        .ok_or(ApiError::NotFound("demographic record"))?;

    Ok(Json(GetDemographicResponse {
        data: record_to_api(&record),
    }))
}

/// Merge a partial record. An empty patch only refreshes `updated_at`.
#[utoipa::path(
    put,
    path = "/v1/demographics/{id}",
    tag = "Demographics",
    responses(
        (status = 200, description = "Updated", body = UpdateDemographicResponse),
        (status = 404, description = "Not found in this tenant"),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<UpdateDemographicResponse>, ApiError> {
    let id = parse_record_id(&id)?;

    if !body.is_object() {
        return Err(ApiError::Validation(vec![FieldError {
            field: "body".to_string(),
            message: "partial record must be a JSON object".to_string(),
        }]));
    }
    let money_errors = crate::validation::validate_money_precision(&body);
    if !money_errors.is_empty() {
        return Err(ApiError::Validation(money_errors));
    }

    let record = DemographicRecord::merge_payload(&state.db, context.tenant.as_str(), id, &body)
        .await?
        .ok_or(ApiError::NotFound("demographic record"))?;

    enqueue_record_pipeline(
        &state,
        &context,
        correlation,
        RecordAction::Update,
        &record,
        WebhookEventKind::DemographicsUpdated,
    )
    .await?;

    Ok(Json(UpdateDemographicResponse {
        id: record.id,
        updated_at: record.updated_at,
    }))
}

/// Soft-delete a record.
#[utoipa::path(
    delete,
    path = "/v1/demographics/{id}",
    tag = "Demographics",
    responses(
        (status = 200, description = "Deleted", body = DeleteDemographicResponse),
        (status = 404, description = "Not found in this tenant"),
    )
)]
pub async fn delete_one(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Result<Json<DeleteDemographicResponse>, ApiError> {
    let id = parse_record_id(&id)?;
    let deleted_at = DemographicRecord::soft_delete(&state.db, context.tenant.as_str(), id)
        .await?
        .ok_or(ApiError::NotFound("demographic record"))?;

    let job = WebhookJob {
        event: WebhookEventKind::DemographicsDeleted,
        tenant: context.tenant.as_str().to_string(),
        data: json!({ "id": id, "deleted_at": deleted_at }),
        submission_id: Some(id),
        override_url: None,
    };
    let message = QueueMessage::webhook(
        webhook_session(&context.tenant),
        serde_json::to_value(&job).map_err(lexflow_queue::QueueError::from)?,
        correlation.0,
    );
    state.producer.send(Topic::WebhooksFifo, message).await?;

    Ok(Json(DeleteDemographicResponse { id, deleted_at }))
}

/// Validate, persist, and enqueue one submission. The 201/202 is not
/// sent unless both the row and the queue message are durable.
async fn accept_one(
    state: &AppState,
    context: &TenantContext,
    correlation: CorrelationId,
    body: &Value,
) -> Result<DemographicRecord, ApiError> {
    let request: CreateDemographicRequest = parse_body(body)?;
    validate_request(&request, body)?;

    let record = DemographicRecord::insert(
        &state.db,
        NewDemographicRecord {
            id: Uuid::new_v4(),
            tenant: context.tenant.as_str().to_string(),
            payload: body.clone(),
            created_by: Some(context.principal.clone()),
        },
    )
    .await?;

    enqueue_record_pipeline(
        state,
        context,
        correlation,
        RecordAction::Create,
        &record,
        WebhookEventKind::DemographicsCreated,
    )
    .await?;

    Ok(record)
}

/// Step 7c/7d of the request pipeline: the processing message on the
/// tenant's demographics session and the notification on its webhook
/// session.
async fn enqueue_record_pipeline(
    state: &AppState,
    context: &TenantContext,
    correlation: CorrelationId,
    action: RecordAction,
    record: &DemographicRecord,
    event: WebhookEventKind,
) -> Result<(), ApiError> {
    let job = DemographicsJob {
        action,
        record: RecordEnvelope {
            id: record.id,
            tenant: record.tenant.clone(),
            payload: record.payload.clone(),
        },
    };
    let message = QueueMessage::demographics(
        demographics_session(&context.tenant),
        serde_json::to_value(&job).map_err(lexflow_queue::QueueError::from)?,
        correlation.0,
    );
    state.producer.send(Topic::DemographicsFifo, message).await?;

    let webhook = WebhookJob {
        event,
        tenant: record.tenant.clone(),
        data: json!({
            "id": record.id,
            "law_firm": record.payload.get("law_firm"),
            "created_at": record.created_at,
            "updated_at": record.updated_at,
        }),
        submission_id: Some(record.id),
        override_url: None,
    };
    let message = QueueMessage::webhook(
        webhook_session(&context.tenant),
        serde_json::to_value(&webhook).map_err(lexflow_queue::QueueError::from)?,
        correlation.0,
    );
    state.producer.send(Topic::WebhooksFifo, message).await?;

    Ok(())
}

fn parse_record_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::Validation(vec![FieldError {
            field: "id".to_string(),
            message: "id must be a UUID".to_string(),
        }])
    })
}

fn item_error(error: &ApiError) -> Value {
    match error {
        ApiError::Validation(fields) => serde_json::to_value(fields).unwrap_or(Value::Null),
        other => Value::String(other.to_string()),
    }
}
