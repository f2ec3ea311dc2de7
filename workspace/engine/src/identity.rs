//! Who is asking: resolves a session token to a user and the user to the
//! customer or employee it stands for.

use std::fmt;

use model::entities::user::{self, PrivilegeTier, Role};
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{DeskError, Result};
use crate::session::SessionManager;

/// The two kinds of principal an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Employee,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Employee => "employee",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a customer or an employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i32,
}

impl EntityRef {
    pub fn customer(id: i32) -> Self {
        Self { kind: EntityKind::Customer, id }
    }

    pub fn employee(id: i32) -> Self {
        Self { kind: EntityKind::Employee, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
    pub owned: EntityRef,
}

impl Identity {
    /// Build the identity of an account, or `None` when the account is
    /// inactive or linked to nothing.
    pub fn from_user(user: &user::Model) -> Option<Self> {
        if !user.is_active {
            return None;
        }
        let owned = match (user.customer_id, user.employee_id) {
            (Some(id), _) => EntityRef::customer(id),
            (None, Some(id)) => EntityRef::employee(id),
            (None, None) => return None,
        };
        Some(Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            owned,
        })
    }

    pub fn tier(&self) -> PrivilegeTier {
        self.role.tier()
    }
}

/// Managers and superadmins see and act on every record.
pub fn can_access_all(identity: &Identity) -> bool {
    identity.tier() == PrivilegeTier::Elevated
}

/// Gate for actions reserved to elevated roles.
pub fn require_elevated(identity: &Identity, action: &str) -> Result<()> {
    if can_access_all(identity) {
        return Ok(());
    }
    warn!(
        user_id = identity.user_id,
        role = identity.role.as_str(),
        action = action,
        "Denied action reserved to elevated roles"
    );
    Err(DeskError::forbidden(format!("{action} requires a manager role")))
}

/// Resolve the identity behind a session token.
///
/// Every way a token can fail to name a usable account yields `Ok(None)`;
/// only database failures are errors.
#[instrument(skip(conn, sessions, token))]
pub async fn resolve_identity<C: ConnectionTrait>(
    conn: &C,
    sessions: &SessionManager,
    token: Option<&str>,
) -> Result<Option<Identity>> {
    let Some(token) = token else {
        debug!("No session token presented");
        return Ok(None);
    };

    let Some(claims) = sessions.verify(token).await else {
        return Ok(None);
    };

    let Some(user) = user::Entity::find_by_id(claims.sub).one(conn).await? else {
        debug!(user_id = claims.sub, "Session names a user that no longer exists");
        return Ok(None);
    };

    let identity = Identity::from_user(&user);
    match &identity {
        Some(identity) => debug!(
            user_id = identity.user_id,
            owned = %identity.owned,
            "Resolved identity"
        ),
        None => debug!(user_id = user.id, "User is inactive or linked to nothing"),
    }
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_customer, seed_employee, seed_user, setup_db};
    use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

    fn identity(role: Role, owned: EntityRef) -> Identity {
        Identity {
            user_id: 1,
            username: "someone".to_string(),
            role,
            owned,
        }
    }

    #[test]
    fn test_role_tiers() {
        assert_eq!(Role::Regular.tier(), PrivilegeTier::Standard);
        assert_eq!(Role::Employee.tier(), PrivilegeTier::Staff);
        assert_eq!(Role::Manager.tier(), PrivilegeTier::Elevated);
        assert_eq!(Role::SuperAdmin.tier(), PrivilegeTier::Elevated);
        assert!(PrivilegeTier::Standard < PrivilegeTier::Staff);
        assert!(PrivilegeTier::Staff < PrivilegeTier::Elevated);
    }

    #[test]
    fn test_can_access_all_only_for_elevated_roles() {
        assert!(!can_access_all(&identity(Role::Regular, EntityRef::customer(1))));
        assert!(!can_access_all(&identity(Role::Employee, EntityRef::employee(1))));
        assert!(can_access_all(&identity(Role::Manager, EntityRef::employee(1))));
        assert!(can_access_all(&identity(Role::SuperAdmin, EntityRef::employee(1))));
    }

    #[test]
    fn test_require_elevated() {
        let staff = identity(Role::Employee, EntityRef::employee(3));
        assert!(matches!(
            require_elevated(&staff, "create product"),
            Err(DeskError::Forbidden(_))
        ));
        let boss = identity(Role::Manager, EntityRef::employee(4));
        assert!(require_elevated(&boss, "create product").is_ok());
    }

    #[tokio::test]
    async fn test_resolve_identity() {
        let db = setup_db().await;
        let sessions = SessionManager::new("test-secret", 1);
        let customer = seed_customer(&db, "Asha").await;
        let user = seed_user(&db, "asha", Role::Regular, EntityRef::customer(customer.id)).await;

        let token = sessions.issue(user.id, &user.username).unwrap().token;
        let resolved = resolve_identity(&db, &sessions, Some(&token))
            .await
            .unwrap()
            .expect("identity should resolve");

        assert_eq!(resolved.user_id, user.id);
        assert_eq!(resolved.role, Role::Regular);
        assert_eq!(resolved.owned, EntityRef::customer(customer.id));
    }

    #[tokio::test]
    async fn test_resolve_identity_absent_cases() {
        let db = setup_db().await;
        let sessions = SessionManager::new("test-secret", 1);
        let employee = seed_employee(&db, "Ravi", None).await;
        let user = seed_user(&db, "ravi", Role::Employee, EntityRef::employee(employee.id)).await;

        // No token and garbage token
        assert!(resolve_identity(&db, &sessions, None).await.unwrap().is_none());
        assert!(resolve_identity(&db, &sessions, Some("junk")).await.unwrap().is_none());

        // Token for a user that does not exist
        let ghost = sessions.issue(9999, "ghost").unwrap().token;
        assert!(resolve_identity(&db, &sessions, Some(&ghost)).await.unwrap().is_none());

        // Revoked token
        let revoked = sessions.issue(user.id, "ravi").unwrap().token;
        sessions.revoke(&revoked).await;
        assert!(resolve_identity(&db, &sessions, Some(&revoked)).await.unwrap().is_none());

        // Inactive user
        let token = sessions.issue(user.id, "ravi").unwrap().token;
        let mut active = user.into_active_model();
        active.is_active = Set(false);
        active.update(&db).await.unwrap();
        assert!(resolve_identity(&db, &sessions, Some(&token)).await.unwrap().is_none());
    }
}
