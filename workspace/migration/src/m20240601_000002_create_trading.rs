use sea_orm_migration::{prelude::*, schema::*};

use crate::m20240601_000001_create_principals::{Customers, Employees};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create products table
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(pk_auto(Products::Id))
                    .col(string(Products::Name))
                    .col(string_len(Products::TickerSymbol, 16).unique_key())
                    .col(decimal_len_null(Products::CurrentPrice, 16, 4))
                    .col(string_null(Products::Sector))
                    .to_owned(),
            )
            .await?;

        // Create portfolios table, owned by a customer, an employee or both
        manager
            .create_table(
                Table::create()
                    .table(Portfolios::Table)
                    .if_not_exists()
                    .col(pk_auto(Portfolios::Id))
                    .col(string(Portfolios::Name))
                    .col(integer_null(Portfolios::CustomerId))
                    .col(integer_null(Portfolios::EmployeeId))
                    .col(date(Portfolios::CreationDate))
                    .col(string_len_null(Portfolios::RiskLevel, 10))
                    .col(string_len_null(Portfolios::Currency, 3))
                    .check(Expr::cust("customer_id IS NOT NULL OR employee_id IS NOT NULL"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_portfolio_customer")
                            .from(Portfolios::Table, Portfolios::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_portfolio_employee")
                            .from(Portfolios::Table, Portfolios::EmployeeId)
                            .to(Employees::Table, Employees::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create transactions table; rows are never updated once written
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(pk_auto(Transactions::Id))
                    .col(integer(Transactions::PortfolioId))
                    .col(integer(Transactions::ProductId))
                    .col(string_len(Transactions::Side, 4).default("buy"))
                    .col(integer(Transactions::Quantity))
                    .col(decimal(Transactions::PricePerUnit).decimal_len(16, 4))
                    .col(decimal(Transactions::CommissionFee).decimal_len(16, 2))
                    .col(date_time(Transactions::TransactionDate))
                    .check(Expr::cust("quantity > 0"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_portfolio")
                            .from(Transactions::Table, Transactions::PortfolioId)
                            .to(Portfolios::Table, Portfolios::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_product")
                            .from(Transactions::Table, Transactions::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create holdings table (one position per portfolio and product)
        manager
            .create_table(
                Table::create()
                    .table(Holdings::Table)
                    .if_not_exists()
                    .col(integer(Holdings::PortfolioId))
                    .col(integer(Holdings::ProductId))
                    .col(big_integer(Holdings::Quantity).default(0))
                    .check(Expr::cust("quantity >= 0"))
                    .primary_key(
                        Index::create()
                            .name("pk_holdings")
                            .col(Holdings::PortfolioId)
                            .col(Holdings::ProductId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_holding_portfolio")
                            .from(Holdings::Table, Holdings::PortfolioId)
                            .to(Portfolios::Table, Portfolios::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_holding_product")
                            .from(Holdings::Table, Holdings::ProductId)
                            .to(Products::Table, Products::Id)
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
            .drop_table(Table::drop().table(Holdings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Portfolios::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    TickerSymbol,
    CurrentPrice,
    Sector,
}

#[derive(DeriveIden)]
enum Portfolios {
    Table,
    Id,
    Name,
    CustomerId,
    EmployeeId,
    CreationDate,
    RiskLevel,
    Currency,
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    PortfolioId,
    ProductId,
    Side,
    Quantity,
    PricePerUnit,
    CommissionFee,
    TransactionDate,
}

#[derive(DeriveIden)]
enum Holdings {
    Table,
    PortfolioId,
    ProductId,
    Quantity,
}
