use super::portfolio::RiskLevel;
use sea_orm::entity::prelude::*;

/// Know-your-customer record. One per customer, keyed by the customer id.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "customer_details")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: i32,
    #[sea_orm(unique)]
    pub ssn: Option<String>,
    #[sea_orm(unique)]
    pub pan_number: String,
    #[sea_orm(unique)]
    pub aadhar_number: String,
    pub occupation: Option<String>,
    pub annual_income: Option<Decimal>,
    pub risk_tolerance: Option<RiskLevel>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
