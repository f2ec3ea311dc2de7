//! Fixtures shared by the engine's tests.

use chrono::{NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use model::entities::transaction::TradeSide;
use model::entities::user::Role;
use model::entities::{customer, employee, portfolio, product, transaction, user};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Set};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::identity::{EntityKind, EntityRef, Identity};
use crate::password::hash_with_iterations;

pub fn init_test_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// In-memory SQLite database with the schema applied.
pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    db.execute_unprepared("PRAGMA foreign_keys = ON;")
        .await
        .expect("Failed to enable foreign keys");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

pub fn identity_for(role: Role, owned: EntityRef) -> Identity {
    Identity {
        user_id: 1,
        username: format!("{}-{}", owned.kind, owned.id),
        role,
        owned,
    }
}

pub async fn seed_customer(db: &DatabaseConnection, first_name: &str) -> customer::Model {
    customer::ActiveModel {
        first_name: Set(first_name.to_string()),
        last_name: Set("Test".to_string()),
        date_of_birth: Set(NaiveDate::from_ymd_opt(1990, 1, 1)),
        address: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create customer")
}

pub async fn seed_employee(
    db: &DatabaseConnection,
    name: &str,
    manager_id: Option<i32>,
) -> employee::Model {
    employee::ActiveModel {
        name: Set(name.to_string()),
        job_title: Set(Some("Analyst".to_string())),
        hire_date: Set(None),
        specialization: Set(None),
        manager_id: Set(manager_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create employee")
}

pub async fn seed_product(
    db: &DatabaseConnection,
    ticker: &str,
    price: Option<Decimal>,
) -> product::Model {
    product::ActiveModel {
        name: Set(format!("{ticker} Inc")),
        ticker_symbol: Set(ticker.to_string()),
        current_price: Set(price),
        sector: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create product")
}

pub async fn seed_portfolio(db: &DatabaseConnection, name: &str, owner: EntityRef) -> portfolio::Model {
    let (customer_id, employee_id) = match owner.kind {
        EntityKind::Customer => (Some(owner.id), None),
        EntityKind::Employee => (None, Some(owner.id)),
    };
    portfolio::ActiveModel {
        name: Set(name.to_string()),
        customer_id: Set(customer_id),
        employee_id: Set(employee_id),
        creation_date: Set(Utc::now().date_naive()),
        risk_level: Set(None),
        currency: Set(Some("USD".to_string())),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create portfolio")
}

pub async fn seed_transaction(
    db: &DatabaseConnection,
    portfolio_id: i32,
    product_id: i32,
    quantity: i32,
) -> transaction::Model {
    transaction::ActiveModel {
        portfolio_id: Set(portfolio_id),
        product_id: Set(product_id),
        side: Set(TradeSide::Buy),
        quantity: Set(quantity),
        price_per_unit: Set(Decimal::new(1000, 2)),
        commission_fee: Set(Decimal::new(200, 2)),
        transaction_date: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create transaction")
}

pub async fn seed_user(
    db: &DatabaseConnection,
    username: &str,
    role: Role,
    owned: EntityRef,
) -> user::Model {
    let (customer_id, employee_id) = match owned.kind {
        EntityKind::Customer => (Some(owned.id), None),
        EntityKind::Employee => (None, Some(owned.id)),
    };
    user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(hash_with_iterations("password", 1_000).expect("hash")),
        role: Set(role),
        customer_id: Set(customer_id),
        employee_id: Set(employee_id),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create user")
}
