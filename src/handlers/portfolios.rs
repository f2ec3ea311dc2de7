use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::{NaiveDate, Utc};
use engine::access::{require_portfolio_owners, scope_portfolios};
use engine::{DeskError, Resource, require_access};
use model::entities::portfolio::RiskLevel;
use model::entities::{customer, employee, holding, portfolio, product, transaction};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use super::sorted;
use super::trades::TransactionResponse;
use crate::auth::CurrentIdentity;
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse, ListQuery};

/// Request body for opening a portfolio
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreatePortfolioRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub customer_id: Option<i32>,
    pub employee_id: Option<i32>,
    /// low, medium or high
    #[schema(value_type = Option<String>)]
    pub risk_level: Option<RiskLevel>,
    /// ISO 4217 code, e.g. "INR"
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PortfolioResponse {
    pub id: i32,
    pub name: String,
    pub customer_id: Option<i32>,
    pub employee_id: Option<i32>,
    pub creation_date: NaiveDate,
    #[schema(value_type = Option<String>)]
    pub risk_level: Option<RiskLevel>,
    pub currency: Option<String>,
}

impl From<portfolio::Model> for PortfolioResponse {
    fn from(model: portfolio::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            customer_id: model.customer_id,
            employee_id: model.employee_id,
            creation_date: model.creation_date,
            risk_level: model.risk_level,
            currency: model.currency,
        }
    }
}

/// Position in one product
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HoldingResponse {
    pub product_id: i32,
    pub ticker_symbol: Option<String>,
    pub product_name: Option<String>,
    pub quantity: i64,
}

/// List portfolios visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/portfolios",
    tag = "portfolios",
    params(ListQuery),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Portfolios retrieved successfully", body = ApiResponse<Vec<PortfolioResponse>>),
        (status = 401, description = "Login required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_portfolios(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<PortfolioResponse>>>), ApiError> {
    trace!("Entering get_portfolios function");
    let columns: &[portfolio::Column] = match query.sort_key() {
        "name" => &[portfolio::Column::Name],
        "customer" => &[portfolio::Column::CustomerId],
        "employee" => &[portfolio::Column::EmployeeId],
        "risk" => &[portfolio::Column::RiskLevel],
        "currency" => &[portfolio::Column::Currency],
        _ => &[],
    };
    let portfolios = sorted(scope_portfolios(&identity), columns, portfolio::Column::Id, query.descending())
        .all(&state.db)
        .await?;
    debug!("Retrieved {} portfolios", portfolios.len());

    let data = portfolios.into_iter().map(PortfolioResponse::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Portfolios retrieved successfully"))))
}

/// Open a portfolio
///
/// Managers may open portfolios for anyone. Everyone else may only open a
/// portfolio owned solely by their own customer or employee record.
#[utoipa::path(
    post,
    path = "/api/v1/portfolios",
    tag = "portfolios",
    request_body = CreatePortfolioRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 201, description = "Portfolio created successfully", body = ApiResponse<PortfolioResponse>),
        (status = 400, description = "Missing or unknown owner", body = ErrorResponse),
        (status = 403, description = "Owner is not the caller", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn create_portfolio(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<CreatePortfolioRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<PortfolioResponse>>), ApiError> {
    trace!("Entering create_portfolio function");
    require_portfolio_owners(&identity, request.customer_id, request.employee_id)?;

    if let Some(customer_id) = request.customer_id {
        if customer::Entity::find_by_id(customer_id).one(&state.db).await?.is_none() {
            return Err(DeskError::validation(format!("customer {customer_id} not found")).into());
        }
    }
    if let Some(employee_id) = request.employee_id {
        if employee::Entity::find_by_id(employee_id).one(&state.db).await?.is_none() {
            return Err(DeskError::validation(format!("employee {employee_id} not found")).into());
        }
    }

    let portfolio = portfolio::ActiveModel {
        name: Set(request.name.trim().to_string()),
        customer_id: Set(request.customer_id),
        employee_id: Set(request.employee_id),
        creation_date: Set(Utc::now().date_naive()),
        risk_level: Set(request.risk_level),
        currency: Set(request.currency.map(|c| c.to_uppercase())),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    info!("Portfolio created successfully with ID: {}", portfolio.id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(PortfolioResponse::from(portfolio), "Portfolio created successfully")),
    ))
}

/// Get a portfolio by ID
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{portfolio_id}",
    tag = "portfolios",
    params(("portfolio_id" = i32, Path, description = "Portfolio ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Portfolio retrieved successfully", body = ApiResponse<PortfolioResponse>),
        (status = 403, description = "Portfolio not owned by the caller", body = ErrorResponse),
        (status = 404, description = "Portfolio not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_portfolio(
    Path(portfolio_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<PortfolioResponse>>), ApiError> {
    trace!("Entering get_portfolio function for portfolio_id: {}", portfolio_id);
    require_access(&state.db, &identity, Resource::Portfolio, portfolio_id).await?;
    let portfolio = portfolio::Entity::find_by_id(portfolio_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| DeskError::not_found(format!("Portfolio {portfolio_id}")))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(PortfolioResponse::from(portfolio), "Portfolio retrieved successfully")),
    ))
}

/// List a portfolio's transactions, newest first
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{portfolio_id}/transactions",
    tag = "portfolios",
    params(("portfolio_id" = i32, Path, description = "Portfolio ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = ApiResponse<Vec<TransactionResponse>>),
        (status = 403, description = "Portfolio not owned by the caller", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_portfolio_transactions(
    Path(portfolio_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<Vec<TransactionResponse>>>), ApiError> {
    trace!("Entering get_portfolio_transactions function for portfolio_id: {}", portfolio_id);
    require_access(&state.db, &identity, Resource::Portfolio, portfolio_id).await?;

    let rows = transaction::Entity::find()
        .filter(transaction::Column::PortfolioId.eq(portfolio_id))
        .order_by_desc(transaction::Column::TransactionDate)
        .order_by_desc(transaction::Column::Id)
        .all(&state.db)
        .await?;
    debug!("Retrieved {} transactions for portfolio {}", rows.len(), portfolio_id);

    let data = rows.into_iter().map(TransactionResponse::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Transactions retrieved successfully"))))
}

/// List a portfolio's open positions
#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{portfolio_id}/holdings",
    tag = "portfolios",
    params(("portfolio_id" = i32, Path, description = "Portfolio ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Holdings retrieved successfully", body = ApiResponse<Vec<HoldingResponse>>),
        (status = 403, description = "Portfolio not owned by the caller", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_portfolio_holdings(
    Path(portfolio_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<Vec<HoldingResponse>>>), ApiError> {
    trace!("Entering get_portfolio_holdings function for portfolio_id: {}", portfolio_id);
    require_access(&state.db, &identity, Resource::Portfolio, portfolio_id).await?;

    let positions = holding::Entity::find()
        .filter(holding::Column::PortfolioId.eq(portfolio_id))
        .filter(holding::Column::Quantity.gt(0))
        .order_by_asc(holding::Column::ProductId)
        .find_also_related(product::Entity)
        .all(&state.db)
        .await?;

    let data = positions
        .into_iter()
        .map(|(position, product)| HoldingResponse {
            product_id: position.product_id,
            ticker_symbol: product.as_ref().map(|p| p.ticker_symbol.clone()),
            product_name: product.map(|p| p.name),
            quantity: position.quantity,
        })
        .collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Holdings retrieved successfully"))))
}
