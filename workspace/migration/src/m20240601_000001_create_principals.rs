use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create customers table
        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(pk_auto(Customers::Id))
                    .col(string(Customers::FirstName))
                    .col(string(Customers::LastName))
                    .col(date_null(Customers::DateOfBirth))
                    .col(string_null(Customers::Address))
                    .to_owned(),
            )
            .await?;

        // Create customer_details table (one row per customer)
        manager
            .create_table(
                Table::create()
                    .table(CustomerDetails::Table)
                    .if_not_exists()
                    .col(integer(CustomerDetails::CustomerId).primary_key())
                    .col(string_null(CustomerDetails::Ssn).unique_key())
                    .col(string(CustomerDetails::PanNumber).unique_key())
                    .col(string(CustomerDetails::AadharNumber).unique_key())
                    .col(string_null(CustomerDetails::Occupation))
                    .col(decimal_len_null(CustomerDetails::AnnualIncome, 16, 2))
                    .col(string_len_null(CustomerDetails::RiskTolerance, 10))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_details_customer")
                            .from(CustomerDetails::Table, CustomerDetails::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create customer_phones table
        manager
            .create_table(
                Table::create()
                    .table(CustomerPhones::Table)
                    .if_not_exists()
                    .col(pk_auto(CustomerPhones::Id))
                    .col(integer(CustomerPhones::CustomerId))
                    .col(string(CustomerPhones::PhoneNumber))
                    .col(string_len_null(CustomerPhones::PhoneType, 10))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_phones_customer")
                            .from(CustomerPhones::Table, CustomerPhones::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create customer_emails table
        manager
            .create_table(
                Table::create()
                    .table(CustomerEmails::Table)
                    .if_not_exists()
                    .col(pk_auto(CustomerEmails::Id))
                    .col(integer(CustomerEmails::CustomerId))
                    .col(string(CustomerEmails::EmailAddress).unique_key())
                    .col(string_len_null(CustomerEmails::EmailType, 10))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_emails_customer")
                            .from(CustomerEmails::Table, CustomerEmails::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create employees table
        manager
            .create_table(
                Table::create()
                    .table(Employees::Table)
                    .if_not_exists()
                    .col(pk_auto(Employees::Id))
                    .col(string(Employees::Name))
                    .col(string_null(Employees::JobTitle))
                    .col(date_null(Employees::HireDate))
                    .col(string_null(Employees::Specialization))
                    .col(integer_null(Employees::ManagerId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_employee_manager")
                            .from(Employees::Table, Employees::ManagerId)
                            .to(Employees::Table, Employees::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create users table; every account backs exactly one principal
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string(Users::Username).unique_key())
                    .col(string(Users::PasswordHash))
                    .col(string_len(Users::Role, 20))
                    .col(integer_null(Users::CustomerId).unique_key())
                    .col(integer_null(Users::EmployeeId).unique_key())
                    .col(boolean(Users::IsActive).default(true))
                    .check(Expr::cust("(customer_id IS NULL) <> (employee_id IS NULL)"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_customer")
                            .from(Users::Table, Users::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_employee")
                            .from(Users::Table, Users::EmployeeId)
                            .to(Employees::Table, Employees::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Employees::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CustomerEmails::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CustomerPhones::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CustomerDetails::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Customers {
    Table,
    Id,
    FirstName,
    LastName,
    DateOfBirth,
    Address,
}

#[derive(DeriveIden)]
enum CustomerDetails {
    Table,
    CustomerId,
    Ssn,
    PanNumber,
    AadharNumber,
    Occupation,
    AnnualIncome,
    RiskTolerance,
}

#[derive(DeriveIden)]
enum CustomerPhones {
    Table,
    Id,
    CustomerId,
    PhoneNumber,
    PhoneType,
}

#[derive(DeriveIden)]
enum CustomerEmails {
    Table,
    Id,
    CustomerId,
    EmailAddress,
    EmailType,
}

#[derive(DeriveIden)]
pub(crate) enum Employees {
    Table,
    Id,
    Name,
    JobTitle,
    HireDate,
    Specialization,
    ManagerId,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    PasswordHash,
    Role,
    CustomerId,
    EmployeeId,
    IsActive,
}
