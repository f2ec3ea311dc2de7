use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::NaiveDate;
use engine::access::scope_customers;
use engine::identity::require_elevated;
use engine::{DeskError, Resource, require_access};
use model::entities::customer_email::EmailType;
use model::entities::customer_phone::PhoneType;
use model::entities::portfolio::RiskLevel;
use model::entities::{customer, customer_details, customer_email, customer_phone, portfolio, user};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use super::sorted;
use crate::auth::CurrentIdentity;
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse, ListQuery};

/// Request body for creating a customer
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerResponse {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
}

impl From<customer::Model> for CustomerResponse {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            first_name: model.first_name,
            last_name: model.last_name,
            date_of_birth: model.date_of_birth,
            address: model.address,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct PhoneEntry {
    #[validate(length(min = 3, max = 20))]
    pub phone_number: String,
    /// mobile, home or work
    #[schema(value_type = Option<String>)]
    pub phone_type: Option<PhoneType>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct EmailEntry {
    #[validate(email)]
    pub email_address: String,
    /// personal, work or other
    #[schema(value_type = Option<String>)]
    pub email_type: Option<EmailType>,
}

/// Full replacement of a customer's KYC record, phone numbers and email
/// addresses
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CustomerDetailsRequest {
    #[validate(length(min = 1, max = 20))]
    pub ssn: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub pan_number: String,
    #[validate(length(min = 1, max = 20))]
    pub aadhar_number: String,
    #[validate(length(max = 100))]
    pub occupation: Option<String>,
    #[schema(value_type = Option<String>, example = "1250000.00")]
    pub annual_income: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub risk_tolerance: Option<RiskLevel>,
    #[serde(default)]
    #[validate(nested)]
    pub phones: Vec<PhoneEntry>,
    #[serde(default)]
    #[validate(nested)]
    pub emails: Vec<EmailEntry>,
}

/// KYC view of a customer. Identification fields are empty until the
/// details have been filled in.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerDetailsResponse {
    pub customer_id: i32,
    pub ssn: Option<String>,
    pub pan_number: Option<String>,
    pub aadhar_number: Option<String>,
    pub occupation: Option<String>,
    #[schema(value_type = Option<String>)]
    pub annual_income: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub risk_tolerance: Option<RiskLevel>,
    pub phones: Vec<PhoneEntry>,
    pub emails: Vec<EmailEntry>,
}

async fn find_customer<C: ConnectionTrait>(conn: &C, customer_id: i32) -> Result<customer::Model, ApiError> {
    customer::Entity::find_by_id(customer_id)
        .one(conn)
        .await?
        .ok_or_else(|| DeskError::not_found(format!("Customer {customer_id}")).into())
}

async fn load_details<C: ConnectionTrait>(
    conn: &C,
    customer: &customer::Model,
) -> Result<CustomerDetailsResponse, ApiError> {
    let details = customer.find_related(customer_details::Entity).one(conn).await?;
    let phones = customer
        .find_related(customer_phone::Entity)
        .order_by_asc(customer_phone::Column::Id)
        .all(conn)
        .await?;
    let emails = customer
        .find_related(customer_email::Entity)
        .order_by_asc(customer_email::Column::Id)
        .all(conn)
        .await?;

    let phones = phones
        .into_iter()
        .map(|p| PhoneEntry {
            phone_number: p.phone_number,
            phone_type: p.phone_type,
        })
        .collect();
    let emails = emails
        .into_iter()
        .map(|e| EmailEntry {
            email_address: e.email_address,
            email_type: e.email_type,
        })
        .collect();

    Ok(match details {
        Some(d) => CustomerDetailsResponse {
            customer_id: customer.id,
            ssn: d.ssn,
            pan_number: Some(d.pan_number),
            aadhar_number: Some(d.aadhar_number),
            occupation: d.occupation,
            annual_income: d.annual_income,
            risk_tolerance: d.risk_tolerance,
            phones,
            emails,
        },
        None => CustomerDetailsResponse {
            customer_id: customer.id,
            ssn: None,
            pan_number: None,
            aadhar_number: None,
            occupation: None,
            annual_income: None,
            risk_tolerance: None,
            phones,
            emails,
        },
    })
}

/// Reject identification numbers or email addresses already registered to
/// another customer.
async fn ensure_identifiers_free<C: ConnectionTrait>(
    conn: &C,
    customer_id: i32,
    request: &CustomerDetailsRequest,
) -> Result<(), ApiError> {
    let mut checks = vec![
        (customer_details::Column::PanNumber, request.pan_number.as_str(), "PAN number"),
        (customer_details::Column::AadharNumber, request.aadhar_number.as_str(), "Aadhar number"),
    ];
    if let Some(ssn) = request.ssn.as_deref() {
        checks.push((customer_details::Column::Ssn, ssn, "SSN"));
    }
    for (column, value, label) in checks {
        let clash = customer_details::Entity::find()
            .filter(column.eq(value))
            .filter(customer_details::Column::CustomerId.ne(customer_id))
            .count(conn)
            .await?;
        if clash > 0 {
            return Err(DeskError::validation(format!("{label} is already registered")).into());
        }
    }

    let mut seen = HashSet::new();
    for email in &request.emails {
        let address = email.email_address.trim().to_lowercase();
        if !seen.insert(address.clone()) {
            return Err(DeskError::validation(format!("email {address} is listed twice")).into());
        }
        let clash = customer_email::Entity::find()
            .filter(customer_email::Column::EmailAddress.eq(address.as_str()))
            .filter(customer_email::Column::CustomerId.ne(customer_id))
            .count(conn)
            .await?;
        if clash > 0 {
            return Err(DeskError::validation(format!("email {address} is already registered")).into());
        }
    }
    Ok(())
}

/// List customers visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/customers",
    tag = "customers",
    params(ListQuery),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Customers retrieved successfully", body = ApiResponse<Vec<CustomerResponse>>),
        (status = 401, description = "Login required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_customers(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<CustomerResponse>>>), ApiError> {
    trace!("Entering get_customers function");
    let columns: &[customer::Column] = match query.sort_key() {
        "name" => &[customer::Column::LastName, customer::Column::FirstName],
        "dob" => &[customer::Column::DateOfBirth],
        _ => &[],
    };
    let customers = sorted(scope_customers(&identity), columns, customer::Column::Id, query.descending())
        .all(&state.db)
        .await?;
    debug!("Retrieved {} customers", customers.len());

    let data = customers.into_iter().map(CustomerResponse::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Customers retrieved successfully"))))
}

/// Create a customer
#[utoipa::path(
    post,
    path = "/api/v1/customers",
    tag = "customers",
    request_body = CreateCustomerRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 201, description = "Customer created successfully", body = ApiResponse<CustomerResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn create_customer(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<CreateCustomerRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerResponse>>), ApiError> {
    trace!("Entering create_customer function");
    require_elevated(&identity, "creating customers")?;

    let customer = customer::ActiveModel {
        first_name: Set(request.first_name.trim().to_string()),
        last_name: Set(request.last_name.trim().to_string()),
        date_of_birth: Set(request.date_of_birth),
        address: Set(request.address),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    info!("Customer created successfully with ID: {}", customer.id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CustomerResponse::from(customer), "Customer created successfully")),
    ))
}

/// Get a customer by ID
#[utoipa::path(
    get,
    path = "/api/v1/customers/{customer_id}",
    tag = "customers",
    params(("customer_id" = i32, Path, description = "Customer ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Customer retrieved successfully", body = ApiResponse<CustomerResponse>),
        (status = 403, description = "Not the caller's customer record", body = ErrorResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_customer(
    Path(customer_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<CustomerResponse>>), ApiError> {
    trace!("Entering get_customer function for customer_id: {}", customer_id);
    require_access(&state.db, &identity, Resource::Customer, customer_id).await?;
    let customer = find_customer(&state.db, customer_id).await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(CustomerResponse::from(customer), "Customer retrieved successfully")),
    ))
}

/// Delete a customer together with its KYC records
#[utoipa::path(
    delete,
    path = "/api/v1/customers/{customer_id}",
    tag = "customers",
    params(("customer_id" = i32, Path, description = "Customer ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Customer deleted successfully"),
        (status = 400, description = "Customer still owns portfolios or backs an account", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn delete_customer(
    Path(customer_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ApiError> {
    trace!("Entering delete_customer function for customer_id: {}", customer_id);
    require_elevated(&identity, "deleting customers")?;
    let customer = find_customer(&state.db, customer_id).await?;

    let portfolios = portfolio::Entity::find()
        .filter(portfolio::Column::CustomerId.eq(customer_id))
        .count(&state.db)
        .await?;
    if portfolios > 0 {
        return Err(DeskError::validation(format!("customer still owns {portfolios} portfolio(s)")).into());
    }
    let linked = user::Entity::find()
        .filter(user::Column::CustomerId.eq(customer_id))
        .count(&state.db)
        .await?;
    if linked > 0 {
        return Err(DeskError::validation("customer is linked to a login account").into());
    }

    customer.delete(&state.db).await?;
    info!("Customer {} deleted", customer_id);
    Ok((StatusCode::OK, Json(ApiResponse::ok((), "Customer deleted successfully"))))
}

/// Get a customer's KYC details, phone numbers and email addresses
#[utoipa::path(
    get,
    path = "/api/v1/customers/{customer_id}/details",
    tag = "customers",
    params(("customer_id" = i32, Path, description = "Customer ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Details retrieved successfully", body = ApiResponse<CustomerDetailsResponse>),
        (status = 403, description = "Not the caller's customer record", body = ErrorResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_customer_details(
    Path(customer_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<CustomerDetailsResponse>>), ApiError> {
    trace!("Entering get_customer_details function for customer_id: {}", customer_id);
    require_access(&state.db, &identity, Resource::Customer, customer_id).await?;
    let customer = find_customer(&state.db, customer_id).await?;
    let details = load_details(&state.db, &customer).await?;

    Ok((StatusCode::OK, Json(ApiResponse::ok(details, "Details retrieved successfully"))))
}

/// Replace a customer's KYC details, phone numbers and email addresses
#[utoipa::path(
    put,
    path = "/api/v1/customers/{customer_id}/details",
    tag = "customers",
    params(("customer_id" = i32, Path, description = "Customer ID")),
    request_body = CustomerDetailsRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Details updated successfully", body = ApiResponse<CustomerDetailsResponse>),
        (status = 400, description = "Invalid or already registered identifiers", body = ErrorResponse),
        (status = 403, description = "Not the caller's customer record", body = ErrorResponse),
        (status = 404, description = "Customer not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn update_customer_details(
    Path(customer_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<CustomerDetailsRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerDetailsResponse>>), ApiError> {
    trace!("Entering update_customer_details function for customer_id: {}", customer_id);
    require_access(&state.db, &identity, Resource::Customer, customer_id).await?;

    let txn = state.db.begin().await?;
    let customer = find_customer(&txn, customer_id).await?;
    ensure_identifiers_free(&txn, customer_id, &request).await?;

    let existing = customer_details::Entity::find_by_id(customer_id).one(&txn).await?;
    let is_new = existing.is_none();
    let mut details = match existing {
        Some(details) => details.into_active_model(),
        None => customer_details::ActiveModel {
            customer_id: Set(customer_id),
            ..Default::default()
        },
    };
    details.ssn = Set(request.ssn.clone());
    details.pan_number = Set(request.pan_number.clone());
    details.aadhar_number = Set(request.aadhar_number.clone());
    details.occupation = Set(request.occupation.clone());
    details.annual_income = Set(request.annual_income);
    details.risk_tolerance = Set(request.risk_tolerance);
    if is_new {
        details.insert(&txn).await?;
    } else {
        details.update(&txn).await?;
    }

    customer_phone::Entity::delete_many()
        .filter(customer_phone::Column::CustomerId.eq(customer_id))
        .exec(&txn)
        .await?;
    for phone in &request.phones {
        customer_phone::ActiveModel {
            customer_id: Set(customer_id),
            phone_number: Set(phone.phone_number.trim().to_string()),
            phone_type: Set(phone.phone_type),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    customer_email::Entity::delete_many()
        .filter(customer_email::Column::CustomerId.eq(customer_id))
        .exec(&txn)
        .await?;
    for email in &request.emails {
        customer_email::ActiveModel {
            customer_id: Set(customer_id),
            email_address: Set(email.email_address.trim().to_lowercase()),
            email_type: Set(email.email_type),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    let response = load_details(&txn, &customer).await?;
    txn.commit().await?;

    info!(
        "Details of customer {} updated with {} phone(s) and {} email(s)",
        customer_id,
        response.phones.len(),
        response.emails.len()
    );
    Ok((StatusCode::OK, Json(ApiResponse::ok(response, "Details updated successfully"))))
}
