use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use engine::DeskError;
use engine::commission::MAX_PRICE;
use engine::identity::require_elevated;
use model::entities::product;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use super::sorted;
use crate::auth::CurrentIdentity;
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse, ListQuery};

/// Request body for listing a new product
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Exchange ticker, stored upper case
    #[validate(length(min = 1, max = 16))]
    pub ticker_symbol: String,
    /// Reference price used by trades without their own price
    #[schema(value_type = Option<String>, example = "50.00")]
    pub current_price: Option<Decimal>,
    #[validate(length(max = 50))]
    pub sector: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    pub name: String,
    pub ticker_symbol: String,
    #[schema(value_type = Option<String>)]
    pub current_price: Option<Decimal>,
    pub sector: Option<String>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            ticker_symbol: model.ticker_symbol,
            current_price: model.current_price,
            sector: model.sector,
        }
    }
}

/// List products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "products",
    params(ListQuery),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Products retrieved successfully", body = ApiResponse<Vec<ProductResponse>>),
        (status = 401, description = "Login required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _identity))]
pub async fn get_products(
    State(state): State<AppState>,
    CurrentIdentity(_identity): CurrentIdentity,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<ProductResponse>>>), ApiError> {
    trace!("Entering get_products function");
    let columns: &[product::Column] = match query.sort_key() {
        "name" => &[product::Column::Name],
        "ticker" => &[product::Column::TickerSymbol],
        "price" => &[product::Column::CurrentPrice],
        "sector" => &[product::Column::Sector],
        _ => &[],
    };
    let products = sorted(product::Entity::find(), columns, product::Column::Id, query.descending())
        .all(&state.db)
        .await?;
    debug!("Retrieved {} products", products.len());

    let data = products.into_iter().map(ProductResponse::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Products retrieved successfully"))))
}

/// List a new product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    tag = "products",
    request_body = CreateProductRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 201, description = "Product created successfully", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request or duplicate ticker", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn create_product(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<CreateProductRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ApiError> {
    trace!("Entering create_product function");
    require_elevated(&identity, "listing products")?;

    let ticker = request.ticker_symbol.trim().to_uppercase();
    if request.current_price.is_some_and(|price| price <= Decimal::ZERO) {
        return Err(DeskError::validation("current price must be positive").into());
    }
    if request.current_price.is_some_and(|price| price > MAX_PRICE) {
        return Err(DeskError::validation("current price out of range").into());
    }
    let taken = product::Entity::find()
        .filter(product::Column::TickerSymbol.eq(ticker.as_str()))
        .count(&state.db)
        .await?;
    if taken > 0 {
        return Err(DeskError::validation(format!("ticker {ticker} is already listed")).into());
    }

    let product = product::ActiveModel {
        name: Set(request.name.trim().to_string()),
        ticker_symbol: Set(ticker),
        current_price: Set(request.current_price),
        sector: Set(request.sector),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    info!("Product {} listed as {}", product.id, product.ticker_symbol);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(ProductResponse::from(product), "Product created successfully")),
    ))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/api/v1/products/{product_id}",
    tag = "products",
    params(("product_id" = i32, Path, description = "Product ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Product retrieved successfully", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, _identity))]
pub async fn get_product(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(_identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ApiError> {
    trace!("Entering get_product function for product_id: {}", product_id);
    let product = product::Entity::find_by_id(product_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| DeskError::not_found(format!("Product {product_id}")))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(ProductResponse::from(product), "Product retrieved successfully")),
    ))
}
