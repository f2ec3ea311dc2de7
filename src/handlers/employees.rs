use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::NaiveDate;
use engine::access::scope_employees;
use engine::identity::require_elevated;
use engine::org::ensure_manager_assignable;
use engine::{DeskError, Resource, require_access};
use model::entities::{employee, portfolio, user};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use super::sorted;
use crate::auth::CurrentIdentity;
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse, ListQuery};

/// Request body for creating an employee
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateEmployeeRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 100))]
    pub job_title: Option<String>,
    pub hire_date: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub specialization: Option<String>,
    pub manager_id: Option<i32>,
}

/// Request body replacing an employee's editable fields
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct UpdateEmployeeRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 100))]
    pub job_title: Option<String>,
    pub hire_date: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub specialization: Option<String>,
    /// New manager; must not close a loop in the reporting chain
    pub manager_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmployeeResponse {
    pub id: i32,
    pub name: String,
    pub job_title: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub specialization: Option<String>,
    pub manager_id: Option<i32>,
}

impl From<employee::Model> for EmployeeResponse {
    fn from(model: employee::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            job_title: model.job_title,
            hire_date: model.hire_date,
            specialization: model.specialization,
            manager_id: model.manager_id,
        }
    }
}

async fn find_employee<C: ConnectionTrait>(conn: &C, employee_id: i32) -> Result<employee::Model, ApiError> {
    employee::Entity::find_by_id(employee_id)
        .one(conn)
        .await?
        .ok_or_else(|| DeskError::not_found(format!("Employee {employee_id}")).into())
}

/// List employees visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/employees",
    tag = "employees",
    params(ListQuery),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Employees retrieved successfully", body = ApiResponse<Vec<EmployeeResponse>>),
        (status = 401, description = "Login required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_employees(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<EmployeeResponse>>>), ApiError> {
    trace!("Entering get_employees function");
    let columns: &[employee::Column] = match query.sort_key() {
        "name" => &[employee::Column::Name],
        "job_title" => &[employee::Column::JobTitle],
        "manager" => &[employee::Column::ManagerId],
        _ => &[],
    };
    let employees = sorted(scope_employees(&identity), columns, employee::Column::Id, query.descending())
        .all(&state.db)
        .await?;
    debug!("Retrieved {} employees", employees.len());

    let data = employees.into_iter().map(EmployeeResponse::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Employees retrieved successfully"))))
}

/// Create an employee
#[utoipa::path(
    post,
    path = "/api/v1/employees",
    tag = "employees",
    request_body = CreateEmployeeRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 201, description = "Employee created successfully", body = ApiResponse<EmployeeResponse>),
        (status = 400, description = "Invalid request or unknown manager", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn create_employee(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<CreateEmployeeRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<EmployeeResponse>>), ApiError> {
    trace!("Entering create_employee function");
    require_elevated(&identity, "creating employees")?;
    ensure_manager_assignable(&state.db, None, request.manager_id).await?;

    let employee = employee::ActiveModel {
        name: Set(request.name.trim().to_string()),
        job_title: Set(request.job_title),
        hire_date: Set(request.hire_date),
        specialization: Set(request.specialization),
        manager_id: Set(request.manager_id),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    info!("Employee created successfully with ID: {}", employee.id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(EmployeeResponse::from(employee), "Employee created successfully")),
    ))
}

/// Get an employee by ID
#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_id}",
    tag = "employees",
    params(("employee_id" = i32, Path, description = "Employee ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Employee retrieved successfully", body = ApiResponse<EmployeeResponse>),
        (status = 403, description = "Not the caller's employee record", body = ErrorResponse),
        (status = 404, description = "Employee not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_employee(
    Path(employee_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<EmployeeResponse>>), ApiError> {
    trace!("Entering get_employee function for employee_id: {}", employee_id);
    require_access(&state.db, &identity, Resource::Employee, employee_id).await?;
    let employee = find_employee(&state.db, employee_id).await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(EmployeeResponse::from(employee), "Employee retrieved successfully")),
    ))
}

/// Update an employee
#[utoipa::path(
    put,
    path = "/api/v1/employees/{employee_id}",
    tag = "employees",
    params(("employee_id" = i32, Path, description = "Employee ID")),
    request_body = UpdateEmployeeRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Employee updated successfully", body = ApiResponse<EmployeeResponse>),
        (status = 400, description = "Invalid request or cyclic reporting line", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse),
        (status = 404, description = "Employee not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn update_employee(
    Path(employee_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<UpdateEmployeeRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<EmployeeResponse>>), ApiError> {
    trace!("Entering update_employee function for employee_id: {}", employee_id);
    require_elevated(&identity, "editing employees")?;
    let existing = find_employee(&state.db, employee_id).await?;
    ensure_manager_assignable(&state.db, Some(employee_id), request.manager_id).await?;

    let mut active = existing.into_active_model();
    active.name = Set(request.name.trim().to_string());
    active.job_title = Set(request.job_title);
    active.hire_date = Set(request.hire_date);
    active.specialization = Set(request.specialization);
    active.manager_id = Set(request.manager_id);
    let employee = active.update(&state.db).await?;

    info!("Employee {} updated", employee.id);
    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(EmployeeResponse::from(employee), "Employee updated successfully")),
    ))
}

/// Delete an employee. Direct reports lose their manager.
#[utoipa::path(
    delete,
    path = "/api/v1/employees/{employee_id}",
    tag = "employees",
    params(("employee_id" = i32, Path, description = "Employee ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Employee deleted successfully"),
        (status = 400, description = "Employee still owns portfolios or backs an account", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse),
        (status = 404, description = "Employee not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn delete_employee(
    Path(employee_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ApiError> {
    trace!("Entering delete_employee function for employee_id: {}", employee_id);
    require_elevated(&identity, "deleting employees")?;
    let employee = find_employee(&state.db, employee_id).await?;

    let portfolios = portfolio::Entity::find()
        .filter(portfolio::Column::EmployeeId.eq(employee_id))
        .count(&state.db)
        .await?;
    if portfolios > 0 {
        return Err(DeskError::validation(format!("employee still owns {portfolios} portfolio(s)")).into());
    }
    let linked = user::Entity::find()
        .filter(user::Column::EmployeeId.eq(employee_id))
        .count(&state.db)
        .await?;
    if linked > 0 {
        return Err(DeskError::validation("employee is linked to a login account").into());
    }

    employee.delete(&state.db).await?;
    info!("Employee {} deleted", employee_id);
    Ok((StatusCode::OK, Json(ApiResponse::ok((), "Employee deleted successfully"))))
}
