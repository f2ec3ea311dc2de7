use crate::handlers::{
    auth::{login, logout, me, signup},
    customers::{
        create_customer, delete_customer, get_customer, get_customer_details, get_customers,
        update_customer_details,
    },
    employees::{create_employee, delete_employee, get_employee, get_employees, update_employee},
    health::health_check,
    portfolios::{
        create_portfolio, get_portfolio, get_portfolio_holdings, get_portfolio_transactions,
        get_portfolios,
    },
    products::{create_product, get_product, get_products},
    trades::{create_trade, get_trades},
    users::{create_user, delete_user, get_user, get_users, update_user},
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Sessions
        .route("/api/v1/auth/signup", post(signup))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/me", get(me))
        // Login accounts
        .route("/api/v1/users", get(get_users).post(create_user))
        .route(
            "/api/v1/users/:user_id",
            get(get_user).put(update_user).delete(delete_user),
        )
        // Customers
        .route("/api/v1/customers", get(get_customers).post(create_customer))
        .route(
            "/api/v1/customers/:customer_id",
            get(get_customer).delete(delete_customer),
        )
        .route(
            "/api/v1/customers/:customer_id/details",
            get(get_customer_details).put(update_customer_details),
        )
        // Employees
        .route("/api/v1/employees", get(get_employees).post(create_employee))
        .route(
            "/api/v1/employees/:employee_id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        // Products
        .route("/api/v1/products", get(get_products).post(create_product))
        .route("/api/v1/products/:product_id", get(get_product))
        // Portfolios
        .route("/api/v1/portfolios", get(get_portfolios).post(create_portfolio))
        .route("/api/v1/portfolios/:portfolio_id", get(get_portfolio))
        .route(
            "/api/v1/portfolios/:portfolio_id/transactions",
            get(get_portfolio_transactions),
        )
        .route(
            "/api/v1/portfolios/:portfolio_id/holdings",
            get(get_portfolio_holdings),
        )
        // Trades
        .route("/api/v1/trades", get(get_trades).post(create_trade))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
