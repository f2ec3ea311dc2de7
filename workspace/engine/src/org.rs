//! Reporting lines between employees.

use std::collections::HashSet;

use model::entities::employee;
use sea_orm::{ConnectionTrait, EntityTrait};
use tracing::debug;

use crate::error::{DeskError, Result};

/// Check that `manager_id` may become the manager of `employee_id`.
///
/// The manager must exist and the assignment must not close a loop in the
/// reporting chain. `employee_id` is `None` for an employee that is still
/// being created, which can never be part of a loop.
pub async fn ensure_manager_assignable<C: ConnectionTrait>(
    conn: &C,
    employee_id: Option<i32>,
    manager_id: Option<i32>,
) -> Result<()> {
    let Some(manager_id) = manager_id else {
        return Ok(());
    };
    if employee_id == Some(manager_id) {
        return Err(DeskError::validation("an employee cannot manage themselves"));
    }

    let mut visited = HashSet::new();
    let mut cursor = Some(manager_id);
    while let Some(current) = cursor {
        if !visited.insert(current) {
            // Pre-existing loop above the new manager; it does not pass
            // through this employee.
            break;
        }
        let Some(row) = employee::Entity::find_by_id(current).one(conn).await? else {
            if current == manager_id {
                return Err(DeskError::validation(format!(
                    "manager {manager_id} does not exist"
                )));
            }
            break;
        };
        if employee_id.is_some() && row.manager_id == employee_id {
            debug!(?employee_id, manager_id, "Rejected cyclic reporting line");
            return Err(DeskError::validation("manager assignment would create a cycle"));
        }
        cursor = row.manager_id;
    }
    Ok(())
}
