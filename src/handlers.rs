pub mod auth;
pub mod customers;
pub mod employees;
pub mod health;
pub mod portfolios;
pub mod products;
pub mod trades;
pub mod users;

use sea_orm::{EntityTrait, Order, QueryOrder, Select};

/// Order a list query by `columns`, breaking ties by insertion order.
pub(crate) fn sorted<E: EntityTrait>(
    mut select: Select<E>,
    columns: &[E::Column],
    tie_break: E::Column,
    descending: bool,
) -> Select<E> {
    let order = if descending { Order::Desc } else { Order::Asc };
    for column in columns {
        select = select.order_by(*column, order.clone());
    }
    select.order_by(tie_break, order)
}
