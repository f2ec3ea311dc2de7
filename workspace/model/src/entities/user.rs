use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a login account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A customer using the self-service side.
    #[sea_orm(string_value = "regular")]
    Regular,
    #[sea_orm(string_value = "employee")]
    Employee,
    #[sea_orm(string_value = "manager")]
    Manager,
    #[sea_orm(string_value = "superadmin")]
    SuperAdmin,
}

/// Coarse privilege level derived from a [`Role`]. Ordered from least to most
/// privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeTier {
    Standard,
    Staff,
    Elevated,
}

impl Role {
    pub fn tier(&self) -> PrivilegeTier {
        match self {
            Role::Regular => PrivilegeTier::Standard,
            Role::Employee => PrivilegeTier::Staff,
            Role::Manager | Role::SuperAdmin => PrivilegeTier::Elevated,
        }
    }

    /// Whether accounts with this role must be linked to a customer rather
    /// than an employee.
    pub fn links_customer(&self) -> bool {
        matches!(self, Role::Regular)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::SuperAdmin => "superadmin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Role::Regular),
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            "superadmin" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A login account. Each account is linked to exactly one customer or one
/// employee, never both, and each of those can back at most one account.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    /// Werkzeug style `pbkdf2:sha256:<iterations>$<salt>$<hash>`.
    pub password_hash: String,
    pub role: Role,
    #[sea_orm(unique)]
    pub customer_id: Option<i32>,
    #[sea_orm(unique)]
    pub employee_id: Option<i32>,
    #[sea_orm(default_value = "true")]
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::employee::Entity",
        from = "Column::EmployeeId",
        to = "super::employee::Column::Id"
    )]
    Employee,
}

impl ActiveModelBehavior for ActiveModel {}
