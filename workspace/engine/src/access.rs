//! Read and write decisions for entity-scoped records, and the query
//! pre-filters list endpoints build on.

use std::fmt;

use model::entities::{customer, employee, portfolio, transaction};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, RelationTrait,
    Select,
    sea_query::{Expr, JoinType},
};
use tracing::{debug, instrument, warn};

use crate::error::{DeskError, Result};
use crate::identity::{EntityKind, EntityRef, Identity, can_access_all};

/// Kinds of record guarded by ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Customer,
    Employee,
    Portfolio,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Customer => "customer",
            Resource::Employee => "employee",
            Resource::Portfolio => "portfolio",
        })
    }
}

impl From<EntityKind> for Resource {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Customer => Resource::Customer,
            EntityKind::Employee => Resource::Employee,
        }
    }
}

/// Whether the portfolio belongs to `owner`, comparing only the owner column
/// that matches the owner's kind.
pub fn portfolio_owned_by(portfolio: &portfolio::Model, owner: EntityRef) -> bool {
    match owner.kind {
        EntityKind::Customer => portfolio.customer_id == Some(owner.id),
        EntityKind::Employee => portfolio.employee_id == Some(owner.id),
    }
}

/// Decide whether `identity` may see or act on the record.
///
/// Elevated identities may access everything. Everyone else may access only
/// the entity their account is linked to and the portfolios it owns. An
/// unknown portfolio is simply not accessible.
#[instrument(skip(conn, identity), fields(user_id = identity.user_id))]
pub async fn can_access<C: ConnectionTrait>(
    conn: &C,
    identity: &Identity,
    resource: Resource,
    id: i32,
) -> Result<bool> {
    if can_access_all(identity) {
        return Ok(true);
    }

    let allowed = match resource {
        Resource::Customer => identity.owned == EntityRef::customer(id),
        Resource::Employee => identity.owned == EntityRef::employee(id),
        Resource::Portfolio => portfolio::Entity::find_by_id(id)
            .one(conn)
            .await?
            .is_some_and(|p| portfolio_owned_by(&p, identity.owned)),
    };
    debug!(%resource, id, allowed, "Access decision");
    Ok(allowed)
}

/// [`can_access`] turning a denial into [`DeskError::Forbidden`].
pub async fn require_access<C: ConnectionTrait>(
    conn: &C,
    identity: &Identity,
    resource: Resource,
    id: i32,
) -> Result<()> {
    if can_access(conn, identity, resource, id).await? {
        return Ok(());
    }
    warn!(
        user_id = identity.user_id,
        owned = %identity.owned,
        %resource,
        id,
        "Access denied"
    );
    Err(DeskError::forbidden(format!("no access to this {resource}")))
}

/// Matches nothing.
fn nothing() -> Condition {
    Condition::all().add(Expr::val(1).eq(0))
}

pub fn scope_customers(identity: &Identity) -> Select<customer::Entity> {
    let query = customer::Entity::find();
    if can_access_all(identity) {
        return query;
    }
    match identity.owned.kind {
        EntityKind::Customer => query.filter(customer::Column::Id.eq(identity.owned.id)),
        EntityKind::Employee => query.filter(nothing()),
    }
}

pub fn scope_employees(identity: &Identity) -> Select<employee::Entity> {
    let query = employee::Entity::find();
    if can_access_all(identity) {
        return query;
    }
    match identity.owned.kind {
        EntityKind::Employee => query.filter(employee::Column::Id.eq(identity.owned.id)),
        EntityKind::Customer => query.filter(nothing()),
    }
}

fn portfolio_owner_condition(owner: EntityRef) -> Condition {
    match owner.kind {
        EntityKind::Customer => Condition::all().add(portfolio::Column::CustomerId.eq(owner.id)),
        EntityKind::Employee => Condition::all().add(portfolio::Column::EmployeeId.eq(owner.id)),
    }
}

pub fn scope_portfolios(identity: &Identity) -> Select<portfolio::Entity> {
    let query = portfolio::Entity::find();
    if can_access_all(identity) {
        return query;
    }
    query.filter(portfolio_owner_condition(identity.owned))
}

/// Transactions are visible through the portfolio they were booked in.
pub fn scope_transactions(identity: &Identity) -> Select<transaction::Entity> {
    let query = transaction::Entity::find();
    if can_access_all(identity) {
        return query;
    }
    query
        .join(JoinType::InnerJoin, transaction::Relation::Portfolio.def())
        .filter(portfolio_owner_condition(identity.owned))
}

/// A non-elevated identity may only open portfolios for itself and never on
/// behalf of a second owner.
pub fn require_portfolio_owners(
    identity: &Identity,
    customer_id: Option<i32>,
    employee_id: Option<i32>,
) -> Result<()> {
    if customer_id.is_none() && employee_id.is_none() {
        return Err(DeskError::validation(
            "a portfolio needs a customer or an employee owner",
        ));
    }
    if can_access_all(identity) {
        return Ok(());
    }

    let own = match identity.owned.kind {
        EntityKind::Customer => customer_id == Some(identity.owned.id) && employee_id.is_none(),
        EntityKind::Employee => employee_id == Some(identity.owned.id) && customer_id.is_none(),
    };
    if own {
        Ok(())
    } else {
        warn!(
            user_id = identity.user_id,
            owned = %identity.owned,
            ?customer_id,
            ?employee_id,
            "Denied portfolio creation for another owner"
        );
        Err(DeskError::forbidden("portfolios can only be opened for yourself"))
    }
}
