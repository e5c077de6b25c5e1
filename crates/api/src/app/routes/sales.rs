use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use tableshop_core::{CampaignId, CustomerId, Quantity, SaleId, SaleLineId};
use tableshop_infra::inventory_store::InventoryStore;
use tableshop_infra::sales_store::{SaleFilter, SalesStore};
use tableshop_infra::services::sales::{
    CreateSaleCommand, SaleLineInput, UpdateSaleCommand, complete_sale, create_sale, update_sale,
    void_sale,
};

use crate::app::{AppServices, dto, errors};
use crate::context::{RequestIdentity, correlation_id};

pub fn router<S, I>() -> Router
where
    S: SalesStore,
    I: InventoryStore,
{
    Router::new()
        .route(
            "/campaigns/:campaign_id/sales",
            post(create::<S, I>).get(list::<S, I>),
        )
        .route(
            "/campaigns/:campaign_id/sales/:sale_id",
            put(update::<S, I>).get(detail::<S, I>),
        )
        .route(
            "/campaigns/:campaign_id/sales/:sale_id/complete",
            post(complete::<S, I>),
        )
        .route(
            "/campaigns/:campaign_id/sales/:sale_id/void",
            post(void::<S, I>),
        )
}

async fn create<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<dto::CreateSaleRequest>,
) -> axum::response::Response {
    let Some(identity) = RequestIdentity::from_headers(&headers) else {
        return errors::unauthorized();
    };

    let command = match validate_create(campaign_id, body, identity) {
        Ok(command) => command,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match create_sale(services.sales_store.as_ref(), command).await {
        Ok(sale_id) => (
            StatusCode::OK,
            Json(dto::CreateSaleResponse {
                sale_id: *sale_id.as_uuid(),
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn validate_create(
    campaign_id: Uuid,
    body: dto::CreateSaleRequest,
    identity: RequestIdentity,
) -> Result<CreateSaleCommand, String> {
    Ok(CreateSaleCommand {
        campaign_id: CampaignId::from_uuid(campaign_id),
        storage_location_id: dto::require_id(body.storage_location_id, "storageLocationId")?,
        sold_world_day: dto::require_world_day(body.sold_world_day, "soldWorldDay")?,
        customer_id: dto::optional_id(body.customer_id, "customerId")?,
        notes: dto::normalize_text(body.notes, 500, "notes")?,
        created_by_user_id: identity.user_id(),
    })
}

async fn update<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path((campaign_id, sale_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<dto::UpdateSaleRequest>,
) -> axum::response::Response {
    let command = match validate_update(campaign_id, sale_id, body) {
        Ok(command) => command,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match update_sale(services.sales_store.as_ref(), command).await {
        Ok(()) => (StatusCode::OK, Json(dto::UpdateSaleResponse { updated: true })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn validate_update(
    campaign_id: Uuid,
    sale_id: Uuid,
    body: dto::UpdateSaleRequest,
) -> Result<UpdateSaleCommand, String> {
    let mut lines = Vec::with_capacity(body.lines.len());
    let mut seen_line_ids = std::collections::HashSet::new();

    for line in body.lines {
        let sale_line_id: Option<SaleLineId> = dto::optional_id(line.sale_line_id, "saleLineId")?;
        if let Some(id) = sale_line_id {
            if !seen_line_ids.insert(id) {
                return Err("saleLineId values must be unique".to_string());
            }
        }

        let quantity = Quantity::new(line.quantity);
        if !quantity.is_positive() {
            return Err("line quantity must be greater than 0".to_string());
        }

        if line.unit_sold_price_minor < 0 {
            return Err("line unitSoldPriceMinor must be greater than or equal to 0".to_string());
        }

        if line.unit_true_value_minor.is_some_and(|v| v < 0) {
            return Err("line unitTrueValueMinor must be greater than or equal to 0".to_string());
        }

        if line.discount_minor < 0 {
            return Err("line discountMinor must be greater than or equal to 0".to_string());
        }

        lines.push(SaleLineInput {
            sale_line_id,
            item_id: dto::require_id(line.item_id, "line itemId")?,
            quantity,
            unit_sold_price_minor: line.unit_sold_price_minor,
            unit_true_value_minor: line.unit_true_value_minor,
            discount_minor: line.discount_minor,
            notes: dto::normalize_text(line.notes, 500, "line notes")?,
        });
    }

    Ok(UpdateSaleCommand {
        campaign_id: CampaignId::from_uuid(campaign_id),
        sale_id: SaleId::from_uuid(sale_id),
        storage_location_id: dto::require_id(body.storage_location_id, "storageLocationId")?,
        sold_world_day: dto::require_world_day(body.sold_world_day, "soldWorldDay")?,
        customer_id: dto::optional_id(body.customer_id, "customerId")?,
        notes: dto::normalize_text(body.notes, 500, "notes")?,
        lines,
    })
}

async fn complete<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path((campaign_id, sale_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> axum::response::Response {
    let correlation_id = correlation_id(&headers);

    match complete_sale(
        services.sales_store.as_ref(),
        CampaignId::from_uuid(campaign_id),
        SaleId::from_uuid(sale_id),
        correlation_id,
        &services.currency_code,
    )
    .await
    {
        Ok(status) => (
            StatusCode::OK,
            Json(dto::SaleStatusResponse {
                status: status.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn void<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path((campaign_id, sale_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<dto::VoidSaleRequest>,
) -> axum::response::Response {
    let reason = body.reason.as_deref().map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "reason is required");
    }
    if reason.chars().count() > 500 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "reason must be 500 characters or fewer",
        );
    }

    match void_sale(
        services.sales_store.as_ref(),
        CampaignId::from_uuid(campaign_id),
        SaleId::from_uuid(sale_id),
    )
    .await
    {
        Ok(status) => (
            StatusCode::OK,
            Json(dto::SaleStatusResponse {
                status: status.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    from_world_day: Option<i32>,
    #[serde(default)]
    to_world_day: Option<i32>,
    #[serde(default)]
    customer_id: Option<Uuid>,
}

async fn list<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    let filter = match validate_list_query(query) {
        Ok(filter) => filter,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services
        .sales_store
        .list_sales(CampaignId::from_uuid(campaign_id), &filter)
        .await
    {
        Ok(sales) => {
            let items: Vec<dto::SaleListItem> = sales.iter().map(dto::SaleListItem::from).collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(e) => errors::service_error_to_response(e.into()),
    }
}

fn validate_list_query(query: ListQuery) -> Result<SaleFilter, String> {
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

    Ok(SaleFilter {
        from_world_day,
        to_world_day,
        customer_id: dto::optional_id::<CustomerId>(query.customer_id, "customerId")?,
    })
}

async fn detail<S: SalesStore, I: InventoryStore>(
    Extension(services): Extension<Arc<AppServices<S, I>>>,
    Path((campaign_id, sale_id)): Path<(Uuid, Uuid)>,
) -> axum::response::Response {
    let campaign_id = CampaignId::from_uuid(campaign_id);
    let sale_id = SaleId::from_uuid(sale_id);

    let sale = match services.sales_store.sale(campaign_id, sale_id).await {
        Ok(Some(sale)) => sale,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "sale not found"),
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.sales_store.sale_lines(sale_id).await {
        Ok(lines) => (
            StatusCode::OK,
            Json(dto::SaleDetail::from_parts(&sale, &lines)),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e.into()),
    }
}
