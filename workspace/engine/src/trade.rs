//! Trade submission.
//!
//! A request starts as a [`TradeDraft`], becomes a [`ValidatedTrade`] once
//! acting identity, ownership, price and commission are settled, and ends as
//! a [`TradeReceipt`] when the store has booked it. Any failure on the way
//! rejects the trade and nothing is written.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use model::entities::portfolio;
use model::entities::transaction::{self, TradeSide};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::access::portfolio_owned_by;
use crate::commission::{CommissionPolicy, MAX_PRICE};
use crate::error::{DeskError, Result};
use crate::identity::{EntityRef, Identity, can_access_all};
use crate::store::{EntityStore, SeaOrmStore, TradeOrder};

/// Lifecycle of a trade as reported in logs and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeState {
    Draft,
    Validated,
    Committed,
    Rejected,
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeState::Draft => "draft",
            TradeState::Validated => "validated",
            TradeState::Committed => "committed",
            TradeState::Rejected => "rejected",
        })
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    /// Entity the trade is booked for. Required for elevated identities,
    /// defaults to the caller's own entity otherwise.
    pub acting_as: Option<EntityRef>,
    pub portfolio_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price_override: Option<Decimal>,
    pub side: TradeSide,
}

/// An unvalidated trade together with the identity submitting it.
#[derive(Debug)]
pub struct TradeDraft<'a> {
    identity: &'a Identity,
    request: TradeRequest,
}

/// A trade that passed every check and only awaits execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTrade {
    pub acting_as: EntityRef,
    pub commission_rate: Decimal,
    pub order: TradeOrder,
}

/// A booked trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeReceipt {
    pub transaction: transaction::Model,
    pub acting_as: EntityRef,
    pub commission_rate: Decimal,
    pub state: TradeState,
}

impl<'a> TradeDraft<'a> {
    pub fn new(identity: &'a Identity, request: TradeRequest) -> Self {
        Self { identity, request }
    }

    /// Settle who the trade is for. Elevated callers must say; everyone else
    /// trades as themselves.
    fn acting_identity(&self) -> Result<EntityRef> {
        let owned = self.identity.owned;
        match (can_access_all(self.identity), self.request.acting_as) {
            (true, Some(acting_as)) => Ok(acting_as),
            (true, None) => Err(DeskError::validation(
                "acting_as is required when trading on behalf of others",
            )),
            (false, None) => Ok(owned),
            (false, Some(acting_as)) if acting_as == owned => Ok(owned),
            (false, Some(acting_as)) => {
                warn!(
                    user_id = self.identity.user_id,
                    %owned,
                    %acting_as,
                    "Denied trade on behalf of another entity"
                );
                Err(DeskError::forbidden("you can only trade as yourself"))
            }
        }
    }

    /// Run every check against the store and price the trade.
    pub async fn validate<S: EntityStore + ?Sized>(
        self,
        store: &S,
        policy: &CommissionPolicy,
    ) -> Result<ValidatedTrade> {
        let request = &self.request;
        if request.quantity <= 0 {
            return Err(DeskError::validation("quantity must be a positive integer"));
        }
        let acting_as = self.acting_identity()?;

        let portfolio = store
            .portfolio(request.portfolio_id)
            .await?
            .ok_or_else(|| DeskError::not_found(format!("portfolio {}", request.portfolio_id)))?;
        let product = store
            .product(request.product_id)
            .await?
            .ok_or_else(|| DeskError::not_found(format!("product {}", request.product_id)))?;

        if !portfolio_owned_by(&portfolio, acting_as) {
            if can_access_all(self.identity) {
                return Err(DeskError::validation(format!(
                    "portfolio {} is not owned by {acting_as}",
                    portfolio.id
                )));
            }
            warn!(
                user_id = self.identity.user_id,
                portfolio_id = portfolio.id,
                "Denied trade on a foreign portfolio"
            );
            return Err(DeskError::forbidden("you can only trade on your own portfolios"));
        }

        let commission_rate = policy.rate_for(acting_as.kind);

        let price = match request.price_override {
            Some(price) if price > Decimal::ZERO => price,
            Some(_) => return Err(DeskError::validation("no price available")),
            None => match product.current_price {
                Some(price) if price > Decimal::ZERO => price,
                _ => return Err(DeskError::validation("no price available")),
            },
        };
        if price > MAX_PRICE {
            return Err(DeskError::validation("price or quantity out of range"));
        }

        let commission_fee = policy.fee(acting_as.kind, request.quantity, price)?;

        if request.side == TradeSide::Sell {
            let held = store.holding(portfolio.id, product.id).await?;
            if held < i64::from(request.quantity) {
                debug!(held, wanted = request.quantity, "Sell exceeds holding");
                return Err(DeskError::validation("insufficient holdings"));
            }
        }

        debug!(
            %acting_as,
            %price,
            %commission_rate,
            %commission_fee,
            state = %TradeState::Validated,
            "Trade validated"
        );
        Ok(ValidatedTrade {
            acting_as,
            commission_rate,
            order: TradeOrder {
                portfolio_id: portfolio.id,
                product_id: product.id,
                side: request.side,
                quantity: request.quantity,
                price_per_unit: price,
                commission_fee,
                transaction_date: Utc::now().naive_utc(),
            },
        })
    }
}

impl ValidatedTrade {
    /// Hand the order to the store's atomic trade primitive.
    pub async fn execute<S: EntityStore + ?Sized>(self, store: &S) -> Result<TradeReceipt> {
        let transaction = store.execute_trade(&self.order).await?;
        Ok(TradeReceipt {
            transaction,
            acting_as: self.acting_as,
            commission_rate: self.commission_rate,
            state: TradeState::Committed,
        })
    }
}

/// Validate and execute a trade against `store`, logging the rejection when
/// any step fails. The caller owns the surrounding unit of work.
pub async fn run_trade<S: EntityStore + ?Sized>(
    store: &S,
    policy: &CommissionPolicy,
    identity: &Identity,
    request: TradeRequest,
) -> Result<TradeReceipt> {
    debug!(state = %TradeState::Draft, ?request, "Trade drafted");
    let outcome = match TradeDraft::new(identity, request).validate(store, policy).await {
        Ok(validated) => validated.execute(store).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        warn!(state = %TradeState::Rejected, error = %e, "Trade rejected");
    }
    outcome
}

/// Submit a trade as one database transaction.
///
/// Trades on the same portfolio are serialized through `locks` so the
/// holdings check and the booking cannot interleave inside this process.
#[instrument(skip(db, locks, policy, identity), fields(user_id = identity.user_id))]
pub async fn submit_trade<C>(
    db: &C,
    locks: &PortfolioLocks,
    policy: &CommissionPolicy,
    identity: &Identity,
    request: TradeRequest,
) -> Result<TradeReceipt>
where
    C: ConnectionTrait + TransactionTrait,
{
    // Only real portfolios get a lock entry.
    let exists = portfolio::Entity::find()
        .filter(portfolio::Column::Id.eq(request.portfolio_id))
        .count(db)
        .await?;
    if exists == 0 {
        warn!(state = %TradeState::Rejected, portfolio_id = request.portfolio_id, "Trade rejected");
        return Err(DeskError::not_found(format!("portfolio {}", request.portfolio_id)));
    }

    let _guard = locks.acquire(request.portfolio_id).await;

    let txn = db.begin().await?;
    let receipt = run_trade(&SeaOrmStore::new(&txn), policy, identity, request).await?;
    if let Err(e) = txn.commit().await {
        warn!(state = %TradeState::Rejected, error = %e, "Trade commit failed");
        return Err(e.into());
    }

    info!(
        transaction_id = receipt.transaction.id,
        portfolio_id = receipt.transaction.portfolio_id,
        acting_as = %receipt.acting_as,
        state = %receipt.state,
        "Trade committed"
    );
    Ok(receipt)
}

type LockMap = Arc<Mutex<HashMap<i32, Arc<AsyncMutex<()>>>>>;

/// One async mutex per portfolio id. Entries live only while a trade holds
/// or waits for them.
#[derive(Clone, Default)]
pub struct PortfolioLocks {
    inner: LockMap,
}

impl fmt::Debug for PortfolioLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortfolioLocks").finish_non_exhaustive()
    }
}

impl PortfolioLocks {
    pub async fn acquire(&self, portfolio_id: i32) -> PortfolioGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(portfolio_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        PortfolioGuard {
            portfolio_id,
            map: self.inner.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of portfolios with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

/// Holds a portfolio lock and drops the map entry once nobody else wants it.
pub struct PortfolioGuard {
    portfolio_id: i32,
    map: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PortfolioGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if map
            .get(&self.portfolio_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.portfolio_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use async_trait::async_trait;
    use model::entities::user::Role;
    use model::entities::{holding, portfolio, product};
    use sea_orm::{DatabaseConnection, DbErr, EntityTrait, PaginatorTrait};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn buy(portfolio_id: i32, product_id: i32, quantity: i32) -> TradeRequest {
        TradeRequest {
            acting_as: None,
            portfolio_id,
            product_id,
            quantity,
            price_override: None,
            side: TradeSide::Buy,
        }
    }

    struct Desk {
        db: DatabaseConnection,
        locks: PortfolioLocks,
        policy: CommissionPolicy,
        customer_id: i32,
        employee_id: i32,
        customer_pf: i32,
        employee_pf: i32,
        product_id: i32,
    }

    impl Desk {
        async fn new() -> Self {
            init_test_tracing();
            let db = setup_db().await;
            let customer = seed_customer(&db, "Asha").await;
            let employee = seed_employee(&db, "Ravi", None).await;
            let product = seed_product(&db, "ACME", Some(dec("50.00"))).await;
            let customer_pf = seed_portfolio(&db, "Asha PF", EntityRef::customer(customer.id)).await;
            let employee_pf = seed_portfolio(&db, "Ravi PF", EntityRef::employee(employee.id)).await;
            Self {
                db,
                locks: PortfolioLocks::default(),
                policy: CommissionPolicy::default(),
                customer_id: customer.id,
                employee_id: employee.id,
                customer_pf: customer_pf.id,
                employee_pf: employee_pf.id,
                product_id: product.id,
            }
        }

        async fn submit(&self, who: &Identity, request: TradeRequest) -> Result<TradeReceipt> {
            submit_trade(&self.db, &self.locks, &self.policy, who, request).await
        }

        async fn transaction_count(&self) -> u64 {
            transaction::Entity::find().count(&self.db).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_customer_buy_uses_product_price_and_customer_rate() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));

        let receipt = desk
            .submit(&asha, buy(desk.customer_pf, desk.product_id, 10))
            .await
            .unwrap();

        assert_eq!(receipt.state, TradeState::Committed);
        assert_eq!(receipt.acting_as, EntityRef::customer(desk.customer_id));
        assert_eq!(receipt.commission_rate, dec("0.20"));
        assert_eq!(receipt.transaction.price_per_unit, dec("50.00"));
        assert_eq!(receipt.transaction.commission_fee, dec("100.00"));

        let stored = transaction::Entity::find_by_id(receipt.transaction.id)
            .one(&desk.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.quantity, 10);
        assert_eq!(stored.price_per_unit, dec("50.00"));
        assert_eq!(stored.commission_fee, dec("100.00"));
        assert_eq!(stored.side, TradeSide::Buy);
    }

    #[tokio::test]
    async fn test_employee_rate_applies_to_staff_book() {
        let desk = Desk::new().await;
        let ravi = identity_for(Role::Employee, EntityRef::employee(desk.employee_id));

        let receipt = desk
            .submit(&ravi, buy(desk.employee_pf, desk.product_id, 10))
            .await
            .unwrap();
        assert_eq!(receipt.commission_rate, dec("0.10"));
        assert_eq!(receipt.transaction.commission_fee, dec("50.00"));
    }

    #[tokio::test]
    async fn test_non_privileged_foreign_portfolio_is_forbidden() {
        let desk = Desk::new().await;
        // Employee trading on a customer's portfolio
        let ravi = identity_for(Role::Employee, EntityRef::employee(desk.employee_id));
        let result = desk.submit(&ravi, buy(desk.customer_pf, desk.product_id, 1)).await;
        assert!(matches!(result, Err(DeskError::Forbidden(_))));

        // Naming another entity as acting identity
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));
        let mut request = buy(desk.customer_pf, desk.product_id, 1);
        request.acting_as = Some(EntityRef::employee(desk.employee_id));
        let result = desk.submit(&asha, request).await;
        assert!(matches!(result, Err(DeskError::Forbidden(_))));

        assert_eq!(desk.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_privileged_must_name_matching_acting_identity() {
        let desk = Desk::new().await;
        let boss = identity_for(Role::Manager, EntityRef::employee(desk.employee_id));

        let missing = desk.submit(&boss, buy(desk.customer_pf, desk.product_id, 1)).await;
        assert!(matches!(missing, Err(DeskError::Validation(_))));

        let mut mismatched = buy(desk.customer_pf, desk.product_id, 1);
        mismatched.acting_as = Some(EntityRef::employee(desk.employee_id));
        let result = desk.submit(&boss, mismatched).await;
        assert!(matches!(result, Err(DeskError::Validation(_))));

        let mut on_behalf = buy(desk.customer_pf, desk.product_id, 2);
        on_behalf.acting_as = Some(EntityRef::customer(desk.customer_id));
        let receipt = desk.submit(&boss, on_behalf).await.unwrap();
        // Commission follows the acting entity, not the caller
        assert_eq!(receipt.commission_rate, dec("0.20"));
        assert_eq!(receipt.transaction.commission_fee, dec("20.00"));
    }

    #[tokio::test]
    async fn test_missing_portfolio_and_product_are_not_found() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));

        let result = desk.submit(&asha, buy(9999, desk.product_id, 1)).await;
        assert!(matches!(result, Err(DeskError::NotFound(_))));

        let result = desk.submit(&asha, buy(desk.customer_pf, 9999, 1)).await;
        assert!(matches!(result, Err(DeskError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_price_rules() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));

        let mut zero = buy(desk.customer_pf, desk.product_id, 1);
        zero.price_override = Some(Decimal::ZERO);
        match desk.submit(&asha, zero).await {
            Err(DeskError::Validation(msg)) => assert_eq!(msg, "no price available"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let mut negative = buy(desk.customer_pf, desk.product_id, 1);
        negative.price_override = Some(dec("-1"));
        assert!(matches!(
            desk.submit(&asha, negative).await,
            Err(DeskError::Validation(_))
        ));

        let mut overridden = buy(desk.customer_pf, desk.product_id, 3);
        overridden.price_override = Some(dec("12.345"));
        let receipt = desk.submit(&asha, overridden).await.unwrap();
        assert_eq!(receipt.transaction.price_per_unit, dec("12.345"));
        // 3 × 12.345 × 0.20 = 7.407
        assert_eq!(receipt.transaction.commission_fee, dec("7.41"));

        let unpriced = seed_product(&desk.db, "NOPX", None).await;
        match desk.submit(&asha, buy(desk.customer_pf, unpriced.id, 1)).await {
            Err(DeskError::Validation(msg)) => assert_eq!(msg, "no price available"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_price_is_rejected() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));

        let mut huge = buy(desk.customer_pf, desk.product_id, i32::MAX);
        huge.price_override = Some(Decimal::MAX);
        match desk.submit(&asha, huge).await {
            Err(DeskError::Validation(msg)) => assert_eq!(msg, "price or quantity out of range"),
            other => panic!("expected validation error, got {other:?}"),
        }

        // In range price, fee too large for the column
        let mut large = buy(desk.customer_pf, desk.product_id, i32::MAX);
        large.price_override = Some(MAX_PRICE);
        assert!(matches!(
            desk.submit(&asha, large).await,
            Err(DeskError::Validation(_))
        ));

        let pricey = seed_product(&desk.db, "HUGE", Some(dec("1000000000000"))).await;
        assert!(matches!(
            desk.submit(&asha, buy(desk.customer_pf, pricey.id, 1)).await,
            Err(DeskError::Validation(_))
        ));
        assert_eq!(desk.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_lock_entries_do_not_outlive_trades() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));

        for portfolio_id in 1000..1200 {
            let result = desk.submit(&asha, buy(portfolio_id, desk.product_id, 1)).await;
            assert!(matches!(result, Err(DeskError::NotFound(_))));
        }
        assert_eq!(desk.locks.tracked(), 0);

        desk.submit(&asha, buy(desk.customer_pf, desk.product_id, 1)).await.unwrap();
        assert_eq!(desk.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_released_after_waiter() {
        let locks = PortfolioLocks::default();
        let first = locks.acquire(7).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _second = locks.acquire(7).await;
            })
        };
        tokio::task::yield_now().await;
        drop(first);
        waiter.await.unwrap();

        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_quantity_must_be_positive() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));
        for quantity in [0, -5] {
            let result = desk.submit(&asha, buy(desk.customer_pf, desk.product_id, quantity)).await;
            assert!(matches!(result, Err(DeskError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_resubmission_creates_second_transaction() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));

        let first = desk.submit(&asha, buy(desk.customer_pf, desk.product_id, 1)).await.unwrap();
        let second = desk.submit(&asha, buy(desk.customer_pf, desk.product_id, 1)).await.unwrap();

        assert_ne!(first.transaction.id, second.transaction.id);
        assert_eq!(desk.transaction_count().await, 2);
    }

    #[tokio::test]
    async fn test_sell_against_holdings() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));
        desk.submit(&asha, buy(desk.customer_pf, desk.product_id, 5)).await.unwrap();

        let mut oversell = buy(desk.customer_pf, desk.product_id, 6);
        oversell.side = TradeSide::Sell;
        match desk.submit(&asha, oversell).await {
            Err(DeskError::Validation(msg)) => assert_eq!(msg, "insufficient holdings"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let mut sell = buy(desk.customer_pf, desk.product_id, 5);
        sell.side = TradeSide::Sell;
        desk.submit(&asha, sell).await.unwrap();

        let position = holding::Entity::find_by_id((desk.customer_pf, desk.product_id))
            .one(&desk.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.quantity, 0);
        assert_eq!(desk.transaction_count().await, 2);
    }

    /// Store that reads from a real connection but fails to book.
    struct FailingStore<'c> {
        inner: SeaOrmStore<'c, DatabaseConnection>,
    }

    #[async_trait]
    impl EntityStore for FailingStore<'_> {
        async fn portfolio(&self, id: i32) -> Result<Option<portfolio::Model>> {
            self.inner.portfolio(id).await
        }

        async fn product(&self, id: i32) -> Result<Option<product::Model>> {
            self.inner.product(id).await
        }

        async fn holding(&self, portfolio_id: i32, product_id: i32) -> Result<i64> {
            self.inner.holding(portfolio_id, product_id).await
        }

        async fn execute_trade(&self, _order: &TradeOrder) -> Result<transaction::Model> {
            Err(DeskError::Persistence(DbErr::Custom("disk full".to_string())))
        }
    }

    #[tokio::test]
    async fn test_failing_execution_rejects_without_writes() {
        let desk = Desk::new().await;
        let asha = identity_for(Role::Regular, EntityRef::customer(desk.customer_id));
        let store = FailingStore {
            inner: SeaOrmStore::new(&desk.db),
        };

        let result = run_trade(
            &store,
            &desk.policy,
            &asha,
            buy(desk.customer_pf, desk.product_id, 10),
        )
        .await;

        assert!(matches!(result, Err(DeskError::Persistence(_))));
        assert_eq!(desk.transaction_count().await, 0);
        assert_eq!(holding::Entity::find().count(&desk.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_portfolio_locks_serialize_same_portfolio() {
        let locks = PortfolioLocks::default();
        let first = locks.acquire(1).await;

        // A different portfolio is not blocked
        let other = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(2)).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(1)).await;
        assert!(same.is_err());

        drop(first);
        let again = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(1)).await;
        assert!(again.is_ok());
    }
}
