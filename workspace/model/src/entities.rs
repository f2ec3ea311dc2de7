//! SeaORM entities for the back-office schema: the two principal kinds
//! (customers and employees), the instruments they trade, the portfolios that
//! hold them and the login accounts linked to the principals.

pub mod customer;
pub mod customer_details;
pub mod customer_email;
pub mod customer_phone;
pub mod employee;
pub mod holding;
pub mod portfolio;
pub mod product;
pub mod transaction;
pub mod user;

pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::customer::Entity as Customer;
    pub use super::customer_details::Entity as CustomerDetails;
    pub use super::customer_email::Entity as CustomerEmail;
    pub use super::customer_phone::Entity as CustomerPhone;
    pub use super::employee::Entity as Employee;
    pub use super::holding::Entity as Holding;
    pub use super::portfolio::Entity as Portfolio;
    pub use super::product::Entity as Product;
    pub use super::transaction::Entity as Transaction;
    pub use super::user::Entity as User;
}

#[cfg(test)]
mod test {
    use chrono::{NaiveDate, Utc};
    use migration::{Migrator, MigratorTrait};
    use rust_decimal::Decimal;
    use sea_orm::{
        ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr,
        EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, Set,
    };

    use super::*;
    use prelude::*;

    async fn setup_db() -> Result<DatabaseConnection, DbErr> {
        let db = Database::connect("sqlite::memory:").await?;

        // Enable foreign keys
        db.execute_unprepared("PRAGMA foreign_keys = ON;").await?;

        Migrator::up(&db, None).await.expect("Migrations failed.");
        Ok(db)
    }

    async fn insert_customer(db: &DatabaseConnection, first: &str) -> Result<customer::Model, DbErr> {
        customer::ActiveModel {
            first_name: Set(first.to_string()),
            last_name: Set("Sharma".to_string()),
            date_of_birth: Set(NaiveDate::from_ymd_opt(1990, 4, 12)),
            address: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    #[tokio::test]
    async fn test_entity_integration() -> Result<(), DbErr> {
        let db = setup_db().await?;

        let customer = insert_customer(&db, "Asha").await?;

        let boss = employee::ActiveModel {
            name: Set("Meera Iyer".to_string()),
            job_title: Set(Some("Head of Desk".to_string())),
            hire_date: Set(NaiveDate::from_ymd_opt(2015, 1, 5)),
            specialization: Set(None),
            manager_id: Set(None),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let analyst = employee::ActiveModel {
            name: Set("Ravi Kumar".to_string()),
            job_title: Set(Some("Analyst".to_string())),
            hire_date: Set(None),
            specialization: Set(Some("Equities".to_string())),
            manager_id: Set(Some(boss.id)),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let product = product::ActiveModel {
            name: Set("Acme Corp".to_string()),
            ticker_symbol: Set("ACME".to_string()),
            current_price: Set(Some(Decimal::new(5000, 2))),
            sector: Set(Some("Tech".to_string())),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let portfolio = portfolio::ActiveModel {
            name: Set("Retirement".to_string()),
            customer_id: Set(Some(customer.id)),
            employee_id: Set(None),
            creation_date: Set(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            risk_level: Set(Some(portfolio::RiskLevel::Medium)),
            currency: Set(Some("INR".to_string())),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let trade = transaction::ActiveModel {
            portfolio_id: Set(portfolio.id),
            product_id: Set(product.id),
            side: Set(transaction::TradeSide::Buy),
            quantity: Set(10),
            price_per_unit: Set(Decimal::new(5000, 2)),
            commission_fee: Set(Decimal::new(10000, 2)),
            transaction_date: Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        holding::ActiveModel {
            portfolio_id: Set(portfolio.id),
            product_id: Set(product.id),
            quantity: Set(10),
        }
        .insert(&db)
        .await?;

        user::ActiveModel {
            username: Set("asha".to_string()),
            password_hash: Set("pbkdf2:sha256:1$c2FsdA$aGFzaA".to_string()),
            role: Set(user::Role::Regular),
            customer_id: Set(Some(customer.id)),
            employee_id: Set(None),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        // Read back through relations
        let portfolios = customer.find_related(Portfolio).all(&db).await?;
        assert_eq!(portfolios.len(), 1);
        assert_eq!(portfolios[0].name, "Retirement");

        let trades = portfolio.find_related(Transaction).all(&db).await?;
        assert_eq!(trades, vec![trade]);

        let reports = Employee::find()
            .filter(employee::Column::ManagerId.eq(boss.id))
            .all(&db)
            .await?;
        assert_eq!(reports, vec![analyst]);

        let stored_user = User::find()
            .filter(user::Column::Username.eq("asha"))
            .one(&db)
            .await?
            .expect("user should exist");
        assert_eq!(stored_user.role, user::Role::Regular);
        assert_eq!(stored_user.customer_id, Some(customer.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_portfolio_requires_an_owner() -> Result<(), DbErr> {
        let db = setup_db().await?;

        let result = portfolio::ActiveModel {
            name: Set("Orphan".to_string()),
            customer_id: Set(None),
            employee_id: Set(None),
            creation_date: Set(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            risk_level: Set(None),
            currency: Set(None),
            ..Default::default()
        }
        .insert(&db)
        .await;

        assert!(result.is_err(), "a portfolio without owner must be rejected");
        assert_eq!(Portfolio::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_user_links_exactly_one_entity() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let customer = insert_customer(&db, "Nila").await?;
        let staff = employee::ActiveModel {
            name: Set("Dev".to_string()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let both = user::ActiveModel {
            username: Set("both".to_string()),
            password_hash: Set("x".to_string()),
            role: Set(user::Role::Manager),
            customer_id: Set(Some(customer.id)),
            employee_id: Set(Some(staff.id)),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&db)
        .await;
        assert!(both.is_err());

        let neither = user::ActiveModel {
            username: Set("neither".to_string()),
            password_hash: Set("x".to_string()),
            role: Set(user::Role::Regular),
            customer_id: Set(None),
            employee_id: Set(None),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&db)
        .await;
        assert!(neither.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_ticker_symbol_is_unique() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let make = |name: &str| product::ActiveModel {
            name: Set(name.to_string()),
            ticker_symbol: Set("DUP".to_string()),
            current_price: Set(None),
            sector: Set(None),
            ..Default::default()
        };

        make("First").insert(&db).await?;
        assert!(make("Second").insert(&db).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_customer_delete_cascades_to_kyc_records() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let customer = insert_customer(&db, "Kiran").await?;

        customer_details::ActiveModel {
            customer_id: Set(customer.id),
            ssn: Set(None),
            pan_number: Set("ABCDE1234F".to_string()),
            aadhar_number: Set("1234-5678-9012".to_string()),
            occupation: Set(None),
            annual_income: Set(None),
            risk_tolerance: Set(Some(portfolio::RiskLevel::Low)),
        }
        .insert(&db)
        .await?;

        customer_phone::ActiveModel {
            customer_id: Set(customer.id),
            phone_number: Set("+91 98450 00000".to_string()),
            phone_type: Set(Some(customer_phone::PhoneType::Mobile)),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        customer.delete(&db).await?;

        assert_eq!(CustomerDetails::find().count(&db).await?, 0);
        assert_eq!(CustomerPhone::find().count(&db).await?, 0);
        Ok(())
    }
}
