use engine::{CommissionPolicy, PortfolioLocks, SessionManager};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};
use validator::Validate;

use crate::handlers::{auth, customers, employees, portfolios, products, trades, users};

/// Application state shared across handlers
#[derive(Clone, Debug)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    /// Session token issuing and revocation
    pub sessions: SessionManager,
    /// Commission rates applied to trades
    pub commission: CommissionPolicy,
    /// Per-portfolio trade serialization
    pub portfolio_locks: PortfolioLocks,
}

/// API response wrapper
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    pub message: String,
    /// Success status
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
            success: true,
        }
    }
}

/// Error response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// Sorting of list endpoints
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Column to sort by; unknown keys sort by id
    #[validate(length(max = 32))]
    pub sort: Option<String>,
    /// `asc` (default) or `desc`
    #[validate(length(max = 4))]
    pub order: Option<String>,
}

impl ListQuery {
    pub fn sort_key(&self) -> &str {
        self.sort.as_deref().unwrap_or("id")
    }

    pub fn descending(&self) -> bool {
        self.order
            .as_deref()
            .is_some_and(|order| order.eq_ignore_ascii_case("desc"))
    }
}

struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("session"))),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        auth::signup,
        auth::login,
        auth::logout,
        auth::me,
        users::get_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        customers::get_customers,
        customers::create_customer,
        customers::get_customer,
        customers::delete_customer,
        customers::get_customer_details,
        customers::update_customer_details,
        employees::get_employees,
        employees::create_employee,
        employees::get_employee,
        employees::update_employee,
        employees::delete_employee,
        products::get_products,
        products::create_product,
        products::get_product,
        portfolios::get_portfolios,
        portfolios::create_portfolio,
        portfolios::get_portfolio,
        portfolios::get_portfolio_transactions,
        portfolios::get_portfolio_holdings,
        trades::get_trades,
        trades::create_trade,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            ListQuery,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::IdentityResponse,
            users::CreateUserRequest,
            users::UpdateUserRequest,
            users::UserResponse,
            customers::CreateCustomerRequest,
            customers::CustomerResponse,
            customers::CustomerDetailsRequest,
            customers::CustomerDetailsResponse,
            customers::PhoneEntry,
            customers::EmailEntry,
            employees::CreateEmployeeRequest,
            employees::UpdateEmployeeRequest,
            employees::EmployeeResponse,
            products::CreateProductRequest,
            products::ProductResponse,
            portfolios::CreatePortfolioRequest,
            portfolios::PortfolioResponse,
            portfolios::HoldingResponse,
            trades::ActingAs,
            trades::CreateTradeRequest,
            trades::TransactionResponse,
            trades::TradeResponse,
        )
    ),
    modifiers(&SessionSecurity),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Signup, login and session endpoints"),
        (name = "users", description = "Login account administration"),
        (name = "customers", description = "Customer records and KYC details"),
        (name = "employees", description = "Employee records"),
        (name = "products", description = "Tradable instruments"),
        (name = "portfolios", description = "Portfolios, their transactions and holdings"),
        (name = "trades", description = "Trade submission"),
    ),
    info(
        title = "InvestDesk API",
        description = "Role-gated investment back office: customers, employees, portfolios and trades",
        version = "0.1.0",
    )
)]
pub struct ApiDoc;
