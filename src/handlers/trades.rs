use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::NaiveDateTime;
use engine::access::scope_transactions;
use engine::{EntityKind, EntityRef, TradeReceipt, TradeRequest, TradeState, submit_trade};
use model::entities::transaction::{self, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use super::sorted;
use crate::auth::CurrentIdentity;
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse, ListQuery};

/// Entity a trade is booked for
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct ActingAs {
    /// `customer` or `employee`
    #[schema(value_type = String, example = "customer")]
    pub entity_type: EntityKind,
    pub entity_id: i32,
}

impl From<ActingAs> for EntityRef {
    fn from(acting_as: ActingAs) -> Self {
        EntityRef {
            kind: acting_as.entity_type,
            id: acting_as.entity_id,
        }
    }
}

impl From<EntityRef> for ActingAs {
    fn from(entity: EntityRef) -> Self {
        Self {
            entity_type: entity.kind,
            entity_id: entity.id,
        }
    }
}

/// Request body for submitting a trade
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateTradeRequest {
    /// Required for managers; everyone else trades as their own entity
    pub acting_as: Option<ActingAs>,
    pub portfolio_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    /// Price per unit; the product's current price when omitted
    #[schema(value_type = Option<String>, example = "50.00")]
    pub price_override: Option<Decimal>,
    /// `buy` (default) or `sell`
    #[schema(value_type = Option<String>, example = "buy")]
    pub side: Option<TradeSide>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: i32,
    pub portfolio_id: i32,
    pub product_id: i32,
    #[schema(value_type = String)]
    pub side: TradeSide,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price_per_unit: Decimal,
    #[schema(value_type = String)]
    pub commission_fee: Decimal,
    pub transaction_date: NaiveDateTime,
}

impl From<transaction::Model> for TransactionResponse {
    fn from(model: transaction::Model) -> Self {
        Self {
            id: model.id,
            portfolio_id: model.portfolio_id,
            product_id: model.product_id,
            side: model.side,
            quantity: model.quantity,
            price_per_unit: model.price_per_unit,
            commission_fee: model.commission_fee,
            transaction_date: model.transaction_date,
        }
    }
}

/// A booked trade
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TradeResponse {
    pub transaction: TransactionResponse,
    pub acting_as: ActingAs,
    #[schema(value_type = String, example = "0.20")]
    pub commission_rate: Decimal,
    #[schema(value_type = String, example = "committed")]
    pub state: TradeState,
}

impl From<TradeReceipt> for TradeResponse {
    fn from(receipt: TradeReceipt) -> Self {
        Self {
            transaction: TransactionResponse::from(receipt.transaction),
            acting_as: ActingAs::from(receipt.acting_as),
            commission_rate: receipt.commission_rate,
            state: receipt.state,
        }
    }
}

/// List transactions in portfolios visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/trades",
    tag = "trades",
    params(ListQuery),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = ApiResponse<Vec<TransactionResponse>>),
        (status = 401, description = "Login required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_trades(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<TransactionResponse>>>), ApiError> {
    trace!("Entering get_trades function");
    let columns: &[transaction::Column] = match query.sort_key() {
        "date" => &[transaction::Column::TransactionDate],
        "portfolio" => &[transaction::Column::PortfolioId],
        "product" => &[transaction::Column::ProductId],
        _ => &[],
    };
    let rows = sorted(scope_transactions(&identity), columns, transaction::Column::Id, query.descending())
        .all(&state.db)
        .await?;
    debug!("Retrieved {} transactions", rows.len());

    let data = rows.into_iter().map(TransactionResponse::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Transactions retrieved successfully"))))
}

/// Submit a trade
#[utoipa::path(
    post,
    path = "/api/v1/trades",
    tag = "trades",
    request_body = CreateTradeRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 201, description = "Trade committed", body = ApiResponse<TradeResponse>),
        (status = 400, description = "Trade rejected", body = ErrorResponse),
        (status = 403, description = "Portfolio not owned by the acting entity", body = ErrorResponse),
        (status = 404, description = "Portfolio or product not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn create_trade(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<CreateTradeRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<TradeResponse>>), ApiError> {
    trace!("Entering create_trade function");
    let trade = TradeRequest {
        acting_as: request.acting_as.map(EntityRef::from),
        portfolio_id: request.portfolio_id,
        product_id: request.product_id,
        quantity: request.quantity,
        price_override: request.price_override,
        side: request.side.unwrap_or_default(),
    };

    let receipt = submit_trade(
        &state.db,
        &state.portfolio_locks,
        &state.commission,
        &identity,
        trade,
    )
    .await?;

    info!(
        "Trade {} booked in portfolio {} for {}",
        receipt.transaction.id, receipt.transaction.portfolio_id, receipt.acting_as
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(TradeResponse::from(receipt), "Trade committed successfully")),
    ))
}
