#[cfg(test)]
pub mod test_utils {
    use crate::config::{AppSettings, SessionSettings, build_app_state};
    use crate::router::create_router;
    use crate::schemas::AppState;
    use axum::Router;
    use axum::http::HeaderValue;
    use axum_test::TestServer;
    use chrono::NaiveDate;
    use engine::Role;
    use engine::accounts::{NewAccount, provision_account};
    use migration::{Migrator, MigratorTrait};
    use model::entities::{customer, employee, portfolio, product};
    use rust_decimal::Decimal;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use std::str::FromStr;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    pub const TEST_PASSWORD: &str = "correct-horse";

    /// Create an in-memory SQLite database for testing
    pub async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory database");

        // Run migrations
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    /// Create AppState for testing
    pub async fn setup_test_app_state() -> AppState {
        let db = setup_test_db().await;
        let settings = AppSettings {
            session: SessionSettings {
                secret: "test-session-secret".to_string(),
                ttl_hours: 1,
            },
        };
        build_app_state(db, &settings)
    }

    /// Initialize tracing for tests with output to STDERR.
    ///
    /// The log level is determined by the RUST_LOG environment variable,
    /// defaulting to WARN if not set.
    pub fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
        let log_level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|level| Level::from_str(&level).ok())
            .unwrap_or(Level::WARN);

        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Create axum app for testing
    pub async fn setup_test_app() -> Router {
        let state = setup_test_app_state().await;
        create_router(state)
    }

    /// Test server plus the state behind it, for seeding records directly
    pub async fn setup_test_server() -> (TestServer, AppState) {
        let state = setup_test_app_state().await;
        let server = TestServer::new(create_router(state.clone())).unwrap();
        (server, state)
    }

    pub async fn seed_customer(db: &DatabaseConnection, first_name: &str, last_name: &str) -> customer::Model {
        customer::ActiveModel {
            first_name: Set(first_name.to_string()),
            last_name: Set(last_name.to_string()),
            date_of_birth: Set(NaiveDate::from_ymd_opt(1988, 3, 14)),
            address: Set(Some("12 MG Road, Pune".to_string())),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create customer")
    }

    pub async fn seed_employee(db: &DatabaseConnection, name: &str, manager_id: Option<i32>) -> employee::Model {
        employee::ActiveModel {
            name: Set(name.to_string()),
            job_title: Set(Some("Relationship Manager".to_string())),
            hire_date: Set(NaiveDate::from_ymd_opt(2020, 6, 1)),
            specialization: Set(None),
            manager_id: Set(manager_id),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create employee")
    }

    pub async fn seed_product(db: &DatabaseConnection, ticker: &str, price: Option<&str>) -> product::Model {
        product::ActiveModel {
            name: Set(format!("{ticker} Ltd")),
            ticker_symbol: Set(ticker.to_string()),
            current_price: Set(price.map(|p| Decimal::from_str(p).unwrap())),
            sector: Set(Some("Technology".to_string())),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create product")
    }

    pub async fn seed_portfolio(
        db: &DatabaseConnection,
        name: &str,
        customer_id: Option<i32>,
        employee_id: Option<i32>,
    ) -> portfolio::Model {
        portfolio::ActiveModel {
            name: Set(name.to_string()),
            customer_id: Set(customer_id),
            employee_id: Set(employee_id),
            creation_date: Set(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            risk_level: Set(None),
            currency: Set(Some("INR".to_string())),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create portfolio")
    }

    /// Create an account linked to a customer (regular) or an employee
    /// (every other role) and open a session for it.
    pub async fn login_as(state: &AppState, username: &str, role: Role, entity_id: i32) -> String {
        let (customer_id, employee_id) = if role.links_customer() {
            (Some(entity_id), None)
        } else {
            (None, Some(entity_id))
        };
        let user = provision_account(
            &state.db,
            NewAccount {
                username: username.to_string(),
                password: TEST_PASSWORD.to_string(),
                role,
                customer_id,
                employee_id,
                is_active: true,
            },
        )
        .await
        .expect("Failed to create account");

        state
            .sessions
            .issue(user.id, &user.username)
            .expect("Failed to issue session")
            .token
    }

    /// A manager account backed by a fresh employee record
    pub async fn login_as_manager(state: &AppState) -> String {
        let employee = seed_employee(&state.db, "Meera Iyer", None).await;
        login_as(state, "meera", Role::Manager, employee.id).await
    }

    pub fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }
}
