//! Login accounts: self-service signup, administration by elevated users and
//! password authentication.

use model::entities::user::{self, Role};
use model::entities::{customer, employee};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, Set,
};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DeskError, Result};
use crate::identity::{EntityKind, EntityRef, Identity, require_elevated};
use crate::password::{hash_password, verify_password};

const MIN_PASSWORD_LENGTH: usize = 6;

/// Self-service registration against an existing customer or employee.
#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub password_confirm: String,
    pub entity: EntityRef,
}

/// Account created by an administrator or the command line.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub customer_id: Option<i32>,
    pub employee_id: Option<i32>,
    pub is_active: bool,
}

/// Full replacement of an account's editable fields. The password is only
/// changed when one is given.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    pub password: Option<String>,
    pub customer_id: Option<i32>,
    pub employee_id: Option<i32>,
}

fn check_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(DeskError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn normalize_username(username: &str) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(DeskError::validation("username is required"));
    }
    Ok(username.to_string())
}

/// Exactly one of the two links, matching the role convention.
fn resolve_link(role: Role, customer_id: Option<i32>, employee_id: Option<i32>) -> Result<EntityRef> {
    let link = match (customer_id, employee_id) {
        (Some(id), None) => EntityRef::customer(id),
        (None, Some(id)) => EntityRef::employee(id),
        (None, None) => {
            return Err(DeskError::validation("select either a customer or an employee"));
        }
        (Some(_), Some(_)) => {
            return Err(DeskError::validation(
                "an account links a customer or an employee, not both",
            ));
        }
    };
    let expected = if role.links_customer() {
        EntityKind::Customer
    } else {
        EntityKind::Employee
    };
    if link.kind != expected {
        return Err(DeskError::validation(format!(
            "role {} must be linked to a {expected}",
            role.as_str()
        )));
    }
    Ok(link)
}

async fn ensure_username_free<C: ConnectionTrait>(
    conn: &C,
    username: &str,
    except_user: Option<i32>,
) -> Result<()> {
    let taken = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(conn)
        .await?;
    match taken {
        Some(other) if Some(other.id) != except_user => {
            Err(DeskError::validation("username already taken"))
        }
        _ => Ok(()),
    }
}

/// The entity must exist and must not back another account.
async fn ensure_linkable<C: ConnectionTrait>(
    conn: &C,
    link: EntityRef,
    except_user: Option<i32>,
) -> Result<()> {
    let (exists, column) = match link.kind {
        EntityKind::Customer => (
            customer::Entity::find_by_id(link.id).one(conn).await?.is_some(),
            user::Column::CustomerId,
        ),
        EntityKind::Employee => (
            employee::Entity::find_by_id(link.id).one(conn).await?.is_some(),
            user::Column::EmployeeId,
        ),
    };
    if !exists {
        return Err(DeskError::validation(format!("{} {} not found", link.kind, link.id)));
    }

    let linked = user::Entity::find()
        .filter(column.eq(link.id))
        .one(conn)
        .await?;
    match linked {
        Some(other) if Some(other.id) != except_user => Err(DeskError::validation(format!(
            "{} {} is already linked to user '{}'",
            link.kind, link.id, other.username
        ))),
        _ => Ok(()),
    }
}

fn link_columns(link: EntityRef) -> (Option<i32>, Option<i32>) {
    match link.kind {
        EntityKind::Customer => (Some(link.id), None),
        EntityKind::Employee => (None, Some(link.id)),
    }
}

/// Register an account for an existing customer or employee. The role follows
/// from the kind of entity.
#[instrument(skip(conn, request), fields(username = %request.username, entity = %request.entity))]
pub async fn signup<C: ConnectionTrait>(conn: &C, request: SignupRequest) -> Result<user::Model> {
    if request.password != request.password_confirm {
        return Err(DeskError::validation("passwords do not match"));
    }
    check_password_strength(&request.password)?;
    let username = normalize_username(&request.username)?;
    ensure_username_free(conn, &username, None).await?;
    ensure_linkable(conn, request.entity, None).await?;

    let role = match request.entity.kind {
        EntityKind::Customer => Role::Regular,
        EntityKind::Employee => Role::Employee,
    };
    let (customer_id, employee_id) = link_columns(request.entity);

    let user = user::ActiveModel {
        username: Set(username),
        password_hash: Set(hash_password(&request.password)?),
        role: Set(role),
        customer_id: Set(customer_id),
        employee_id: Set(employee_id),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    info!(user_id = user.id, role = role.as_str(), "Account signed up");
    Ok(user)
}

/// Create an account without an acting identity. Used to bootstrap the
/// first administrator.
#[instrument(skip(conn, account), fields(username = %account.username))]
pub async fn provision_account<C: ConnectionTrait>(
    conn: &C,
    account: NewAccount,
) -> Result<user::Model> {
    check_password_strength(&account.password)?;
    let username = normalize_username(&account.username)?;
    let link = resolve_link(account.role, account.customer_id, account.employee_id)?;
    ensure_username_free(conn, &username, None).await?;
    ensure_linkable(conn, link, None).await?;
    let (customer_id, employee_id) = link_columns(link);

    let user = user::ActiveModel {
        username: Set(username),
        password_hash: Set(hash_password(&account.password)?),
        role: Set(account.role),
        customer_id: Set(customer_id),
        employee_id: Set(employee_id),
        is_active: Set(account.is_active),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    info!(user_id = user.id, role = account.role.as_str(), %link, "Account created");
    Ok(user)
}

/// Create an account on behalf of an elevated identity.
pub async fn create_account<C: ConnectionTrait>(
    conn: &C,
    actor: &Identity,
    account: NewAccount,
) -> Result<user::Model> {
    require_elevated(actor, "creating accounts")?;
    provision_account(conn, account).await
}

#[instrument(skip(conn, actor, update), fields(actor = actor.user_id))]
pub async fn update_account<C: ConnectionTrait>(
    conn: &C,
    actor: &Identity,
    user_id: i32,
    update: AccountUpdate,
) -> Result<user::Model> {
    require_elevated(actor, "editing accounts")?;
    let existing = user::Entity::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| DeskError::not_found(format!("user {user_id}")))?;

    let username = normalize_username(&update.username)?;
    let link = resolve_link(update.role, update.customer_id, update.employee_id)?;
    ensure_username_free(conn, &username, Some(user_id)).await?;
    ensure_linkable(conn, link, Some(user_id)).await?;

    let password_hash = match update.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            check_password_strength(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let (customer_id, employee_id) = link_columns(link);

    let mut active = existing.into_active_model();
    active.username = Set(username);
    active.role = Set(update.role);
    active.is_active = Set(update.is_active);
    active.customer_id = Set(customer_id);
    active.employee_id = Set(employee_id);
    if let Some(hash) = password_hash {
        active.password_hash = Set(hash);
    }
    let user = active.update(conn).await?;

    info!(user_id = user.id, role = user.role.as_str(), "Account updated");
    Ok(user)
}

/// Hard delete. The linked customer or employee is left untouched.
#[instrument(skip(conn, actor), fields(actor = actor.user_id))]
pub async fn delete_account<C: ConnectionTrait>(
    conn: &C,
    actor: &Identity,
    user_id: i32,
) -> Result<()> {
    require_elevated(actor, "deleting accounts")?;
    let user = user::Entity::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| DeskError::not_found(format!("user {user_id}")))?;
    let username = user.username.clone();
    user.delete(conn).await?;
    info!(user_id, username = %username, "Account deleted");
    Ok(())
}

/// Check a username and password. Unknown users, inactive users and wrong
/// passwords all yield `None`.
#[instrument(skip(conn, password))]
pub async fn authenticate<C: ConnectionTrait>(
    conn: &C,
    username: &str,
    password: &str,
) -> Result<Option<user::Model>> {
    let user = user::Entity::find()
        .filter(user::Column::Username.eq(username.trim()))
        .one(conn)
        .await?;

    let Some(user) = user.filter(|u| u.is_active) else {
        debug!("Unknown or inactive user");
        return Ok(None);
    };

    match verify_password(password, &user.password_hash) {
        Ok(true) => {
            debug!(user_id = user.id, "Password accepted");
            Ok(Some(user))
        }
        Ok(false) => {
            warn!(user_id = user.id, "Wrong password");
            Ok(None)
        }
        Err(e) => {
            error!(user_id = user.id, error = %e, "Stored password hash is unusable");
            Ok(None)
        }
    }
}
