use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use tableshop_core::{CampaignId, ItemId, LotId, Quantity, StorageLocationId};
use tableshop_infra::inventory_store::{AdjustmentFilter, InventoryStore, LotFilter};
use tableshop_infra::sales_store::SalesStore;
use tableshop_infra::services::inventory::{
    CreateLotCommand, ManualAdjustmentCommand, create_lot, record_manual_adjustment,
};
use tableshop_inventory::{AdjustmentReason, AdjustmentReference};

use crate::app::{AppServices, dto, errors};
use crate::context::RequestIdentity;

pub fn router<S, I>() -> Router
where
    S: SalesStore,
    I: InventoryStore,
{
    Router::new()
        .route(
            "/campaigns/:campaign_id/inventory/lots",
            post(create_lot_handler::<S, I>).get(list_lots::<S, I>),
        )
        .route(
            "/campaigns/:campaign_id/inventory/adjustments",
            post(create_adjustment::<S, I>).get(list_adjustments::<S, I>),
        )
        .route(
            "/campaigns/:campaign_id/inventory/summary",
            get(summary::<S, I>),
        )
}

async fn create_lot_handler<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<dto::CreateLotRequest>,
) -> axum::response::Response {
    let Some(identity) = RequestIdentity::from_headers(&headers) else {
        return errors::unauthorized();
    };

    let command = match validate_create_lot(campaign_id, body, identity) {
        Ok(command) => command,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match create_lot(services.inventory_store.as_ref(), command).await {
        Ok(lot_id) => (
            StatusCode::OK,
            Json(dto::CreateLotResponse {
                lot_id: *lot_id.as_uuid(),
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn validate_create_lot(
    campaign_id: Uuid,
    body: dto::CreateLotRequest,
    identity: RequestIdentity,
) -> Result<CreateLotCommand, String> {
    let quantity = Quantity::new(body.quantity);
    if !quantity.is_positive() {
        return Err("quantity must be greater than 0".to_string());
    }

    if body.unit_cost_minor < 0 {
        return Err("unitCostMinor must be greater than or equal to 0".to_string());
    }

    Ok(CreateLotCommand {
        campaign_id: CampaignId::from_uuid(campaign_id),
        item_id: dto::require_id(body.item_id, "itemId")?,
        storage_location_id: dto::require_id(body.storage_location_id, "storageLocationId")?,
        quantity,
        unit_cost_minor: body.unit_cost_minor,
        acquired_world_day: dto::require_world_day(body.acquired_world_day, "acquiredWorldDay")?,
        source: dto::normalize_text(body.source, 200, "source")?,
        notes: dto::normalize_text(body.notes, 500, "notes")?,
        created_by_user_id: identity.user_id(),
    })
}

async fn create_adjustment<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<dto::CreateAdjustmentRequest>,
) -> axum::response::Response {
    let Some(identity) = RequestIdentity::from_headers(&headers) else {
        return errors::unauthorized();
    };

    let command = match validate_create_adjustment(campaign_id, body, identity) {
        Ok(command) => command,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match record_manual_adjustment(services.inventory_store.as_ref(), command).await {
        Ok(adjustment_id) => (
            StatusCode::OK,
            Json(dto::CreateAdjustmentResponse {
                adjustment_id: *adjustment_id.as_uuid(),
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn validate_create_adjustment(
    campaign_id: Uuid,
    body: dto::CreateAdjustmentRequest,
    identity: RequestIdentity,
) -> Result<ManualAdjustmentCommand, String> {
    let delta_quantity = Quantity::new(body.delta_quantity);
    if delta_quantity.is_zero() {
        return Err("deltaQuantity must be non-zero".to_string());
    }

    let reason: AdjustmentReason = body
        .reason
        .parse()
        .map_err(|_| "reason is invalid".to_string())?;

    let reference_type = dto::normalize_text(body.reference_type, 50, "referenceType")?;
    if body.reference_id.is_some_and(|id| id.is_nil()) {
        return Err("referenceId must be a non-empty UUID when provided".to_string());
    }
    let reference = match (reference_type, body.reference_id) {
        (Some(reference_type), Some(reference_id)) => Some(AdjustmentReference {
            reference_type,
            reference_id,
        }),
        _ => None,
    };

    Ok(ManualAdjustmentCommand {
        campaign_id: CampaignId::from_uuid(campaign_id),
        item_id: dto::require_id(body.item_id, "itemId")?,
        storage_location_id: dto::require_id(body.storage_location_id, "storageLocationId")?,
        lot_id: dto::optional_id::<LotId>(body.lot_id, "lotId")?,
        delta_quantity,
        reason,
        world_day: dto::require_world_day(body.world_day, "worldDay")?,
        notes: dto::normalize_text(body.notes, 500, "notes")?,
        reference,
        created_by_user_id: identity.user_id(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotsQuery {
    #[serde(default)]
    item_id: Option<Uuid>,
    #[serde(default)]
    storage_location_id: Option<Uuid>,
}

async fn list_lots<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<LotsQuery>,
) -> axum::response::Response {
    let filter = LotFilter {
        item_id: match dto::optional_id::<ItemId>(query.item_id, "itemId") {
            Ok(v) => v,
            Err(msg) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg);
            }
        },
        storage_location_id: match dto::optional_id::<StorageLocationId>(
            query.storage_location_id,
            "storageLocationId",
        ) {
            Ok(v) => v,
            Err(msg) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg);
            }
        },
    };

    match services
        .inventory_store
        .lots(CampaignId::from_uuid(campaign_id), &filter)
        .await
    {
        Ok(lots) => {
            let items: Vec<dto::LotDto> = lots.iter().map(dto::LotDto::from).collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(e) => errors::service_error_to_response(e.into()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustmentsQuery {
    #[serde(default)]
    from_world_day: Option<i32>,
    #[serde(default)]
    to_world_day: Option<i32>,
    #[serde(default)]
    item_id: Option<Uuid>,
    #[serde(default)]
    storage_location_id: Option<Uuid>,
}

async fn list_adjustments<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<AdjustmentsQuery>,
) -> axum::response::Response {
    let filter = match validate_adjustments_query(query) {
        Ok(filter) => filter,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services
        .inventory_store
        .adjustments(CampaignId::from_uuid(campaign_id), &filter)
        .await
    {
        Ok(adjustments) => {
            let items: Vec<dto::AdjustmentDto> =
                adjustments.iter().map(dto::AdjustmentDto::from).collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(e) => errors::service_error_to_response(e.into()),
    }
}

fn validate_adjustments_query(query: AdjustmentsQuery) -> Result<AdjustmentFilter, String> {
    let from_world_day = query
        .from_world_day
        .map(|d| dto::require_world_day(d, "fromWorldDay"))
        .transpose()?;
    let to_world_day = query
        .to_world_day
        .map(|d| dto::require_world_day(d, "toWorldDay"))
        .transpose()?;

    if let (Some(from), Some(to)) = (from_world_day, to_world_day) {
        if from > to {
            return Err("fromWorldDay must be less than or equal to toWorldDay".to_string());
        }
    }

    Ok(AdjustmentFilter {
        from_world_day,
        to_world_day,
        item_id: dto::optional_id::<ItemId>(query.item_id, "itemId")?,
        storage_location_id: dto::optional_id::<StorageLocationId>(
            query.storage_location_id,
            "storageLocationId",
        )?,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryQuery {
    #[serde(default)]
    storage_location_id: Option<Uuid>,
}

async fn summary<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> axum::response::Response {
    let storage_location_id = match dto::optional_id::<StorageLocationId>(
        query.storage_location_id,
        "storageLocationId",
    ) {
        Ok(v) => v,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services
        .inventory_store
        .summary(CampaignId::from_uuid(campaign_id), storage_location_id)
        .await
    {
        Ok(rows) => {
            let rows = rows
                .iter()
                .map(|row| dto::SummaryRowDto {
                    item_id: *row.item_id.as_uuid(),
                    storage_location_id: *row.storage_location_id.as_uuid(),
                    quantity_on_hand: row.quantity_on_hand,
                })
                .collect();
            (StatusCode::OK, Json(dto::SummaryResponse { rows })).into_response()
        }
        Err(e) => errors::service_error_to_response(e.into()),
    }
}
