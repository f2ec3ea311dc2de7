//! Persistence seam of the trade workflow.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use model::entities::transaction::TradeSide;
use model::entities::{holding, portfolio, product, transaction};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel, Set, TransactionTrait,
};
use tracing::{debug, instrument};

use crate::error::{DeskError, Result};

/// A fully priced trade ready to be booked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOrder {
    pub portfolio_id: i32,
    pub product_id: i32,
    pub side: TradeSide,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub commission_fee: Decimal,
    pub transaction_date: NaiveDateTime,
}

/// Reads the trade workflow validates against and the atomic primitive it
/// delegates execution to.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn portfolio(&self, id: i32) -> Result<Option<portfolio::Model>>;

    async fn product(&self, id: i32) -> Result<Option<product::Model>>;

    /// Quantity of the product currently held in the portfolio, zero when
    /// there is no position.
    async fn holding(&self, portfolio_id: i32, product_id: i32) -> Result<i64>;

    /// Insert the transaction row and move the holding as one all-or-nothing
    /// unit.
    async fn execute_trade(&self, order: &TradeOrder) -> Result<transaction::Model>;
}

/// [`EntityStore`] over any SeaORM connection or open transaction.
pub struct SeaOrmStore<'c, C> {
    conn: &'c C,
}

impl<'c, C> SeaOrmStore<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C> EntityStore for SeaOrmStore<'_, C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync,
{
    async fn portfolio(&self, id: i32) -> Result<Option<portfolio::Model>> {
        Ok(portfolio::Entity::find_by_id(id).one(self.conn).await?)
    }

    async fn product(&self, id: i32) -> Result<Option<product::Model>> {
        Ok(product::Entity::find_by_id(id).one(self.conn).await?)
    }

    async fn holding(&self, portfolio_id: i32, product_id: i32) -> Result<i64> {
        Ok(holding::Entity::find_by_id((portfolio_id, product_id))
            .one(self.conn)
            .await?
            .map(|h| h.quantity)
            .unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn execute_trade(&self, order: &TradeOrder) -> Result<transaction::Model> {
        // Nested inside an open transaction this becomes a savepoint.
        let txn = self.conn.begin().await?;

        let row = transaction::ActiveModel {
            portfolio_id: Set(order.portfolio_id),
            product_id: Set(order.product_id),
            side: Set(order.side),
            quantity: Set(order.quantity),
            price_per_unit: Set(order.price_per_unit),
            commission_fee: Set(order.commission_fee),
            transaction_date: Set(order.transaction_date),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        debug!(transaction_id = row.id, "Inserted transaction row");

        let delta = match order.side {
            TradeSide::Buy => i64::from(order.quantity),
            TradeSide::Sell => -i64::from(order.quantity),
        };

        let existing = holding::Entity::find_by_id((order.portfolio_id, order.product_id))
            .one(&txn)
            .await?;
        let held = existing.as_ref().map(|h| h.quantity).unwrap_or(0);
        let new_quantity = held + delta;
        if new_quantity < 0 {
            // Dropping `txn` rolls the savepoint back.
            return Err(DeskError::validation("insufficient holdings"));
        }

        match existing {
            Some(position) => {
                let mut position = position.into_active_model();
                position.quantity = Set(new_quantity);
                position.update(&txn).await?;
            }
            None => {
                holding::ActiveModel {
                    portfolio_id: Set(order.portfolio_id),
                    product_id: Set(order.product_id),
                    quantity: Set(new_quantity),
                }
                .insert(&txn)
                .await?;
            }
        }
        debug!(held, new_quantity, "Moved holding");

        txn.commit().await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityRef;
    use crate::test_support::*;
    use chrono::Utc;
    use sea_orm::PaginatorTrait;

    fn order(portfolio_id: i32, product_id: i32, side: TradeSide, quantity: i32) -> TradeOrder {
        TradeOrder {
            portfolio_id,
            product_id,
            side,
            quantity,
            price_per_unit: Decimal::new(5000, 2),
            commission_fee: Decimal::new(1000, 2),
            transaction_date: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn test_execute_trade_books_row_and_holding() {
        let db = setup_db().await;
        let customer = seed_customer(&db, "Asha").await;
        let product = seed_product(&db, "ACME", None).await;
        let pf = seed_portfolio(&db, "PF", EntityRef::customer(customer.id)).await;
        let store = SeaOrmStore::new(&db);

        let first = store.execute_trade(&order(pf.id, product.id, TradeSide::Buy, 10)).await.unwrap();
        assert_eq!(first.quantity, 10);
        assert_eq!(store.holding(pf.id, product.id).await.unwrap(), 10);

        store.execute_trade(&order(pf.id, product.id, TradeSide::Sell, 4)).await.unwrap();
        assert_eq!(store.holding(pf.id, product.id).await.unwrap(), 6);
        assert_eq!(transaction::Entity::find().count(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_oversell_leaves_nothing_behind() {
        let db = setup_db().await;
        let customer = seed_customer(&db, "Asha").await;
        let product = seed_product(&db, "ACME", None).await;
        let pf = seed_portfolio(&db, "PF", EntityRef::customer(customer.id)).await;
        let store = SeaOrmStore::new(&db);

        store.execute_trade(&order(pf.id, product.id, TradeSide::Buy, 2)).await.unwrap();
        let result = store.execute_trade(&order(pf.id, product.id, TradeSide::Sell, 3)).await;

        assert!(matches!(result, Err(DeskError::Validation(_))));
        assert_eq!(transaction::Entity::find().count(&db).await.unwrap(), 1);
        assert_eq!(store.holding(pf.id, product.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_execute_trade_inside_outer_transaction() {
        let db = setup_db().await;
        let customer = seed_customer(&db, "Asha").await;
        let product = seed_product(&db, "ACME", None).await;
        let pf = seed_portfolio(&db, "PF", EntityRef::customer(customer.id)).await;

        let txn = db.begin().await.unwrap();
        SeaOrmStore::new(&txn)
            .execute_trade(&order(pf.id, product.id, TradeSide::Buy, 5))
            .await
            .unwrap();
        // Outer rollback discards the savepoint's work too
        txn.rollback().await.unwrap();

        assert_eq!(transaction::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(holding::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_execute_trade_unknown_product_fails() {
        let db = setup_db().await;
        let customer = seed_customer(&db, "Asha").await;
        let pf = seed_portfolio(&db, "PF", EntityRef::customer(customer.id)).await;
        let store = SeaOrmStore::new(&db);

        let result = store.execute_trade(&order(pf.id, 4242, TradeSide::Buy, 1)).await;
        assert!(matches!(result, Err(DeskError::Persistence(_))));
        assert_eq!(transaction::Entity::find().count(&db).await.unwrap(), 0);
    }
}
