use anyhow::Result;
use chrono::{NaiveDate, Utc};
use engine::Role;
use engine::accounts::{NewAccount, provision_account};
use model::entities::employee;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, Set};
use tracing::{debug, error, info, trace};

pub async fn create_employee(
    database_url: &str,
    name: &str,
    job_title: Option<String>,
    hire_date: Option<NaiveDate>,
) -> Result<()> {
    trace!("Entering create_employee function");
    let db = Database::connect(database_url).await?;

    let employee = insert_employee(&db, name, job_title, hire_date).await?;
    println!("Created employee {} ({})", employee.id, employee.name);
    Ok(())
}

pub(crate) async fn insert_employee<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    job_title: Option<String>,
    hire_date: Option<NaiveDate>,
) -> Result<employee::Model> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("employee name must not be empty");
    }

    let hire_date = hire_date.unwrap_or_else(|| Utc::now().date_naive());
    debug!("Creating employee '{}' hired on {}", name, hire_date);

    let active = employee::ActiveModel {
        name: Set(name.to_string()),
        job_title: Set(job_title),
        hire_date: Set(Some(hire_date)),
        ..Default::default()
    };
    match active.insert(conn).await {
        Ok(employee) => {
            info!("Employee created with ID: {}", employee.id);
            Ok(employee)
        }
        Err(e) => {
            error!("Failed to create employee '{}': {}", name, e);
            Err(e.into())
        }
    }
}

pub async fn create_user(
    database_url: &str,
    username: &str,
    password: &str,
    role: Role,
    entity_id: Option<i32>,
) -> Result<()> {
    trace!("Entering create_user function");
    let db = Database::connect(database_url).await?;

    let user = insert_user(&db, username, password, role, entity_id).await?;
    println!("Created {} account '{}' with id {}", user.role.as_str(), user.username, user.id);
    Ok(())
}

pub(crate) async fn insert_user<C: ConnectionTrait>(
    conn: &C,
    username: &str,
    password: &str,
    role: Role,
    entity_id: Option<i32>,
) -> Result<model::entities::user::Model> {
    let (customer_id, employee_id) = if role.links_customer() {
        (entity_id, None)
    } else {
        (None, entity_id)
    };

    let account = NewAccount {
        username: username.to_string(),
        password: password.to_string(),
        role,
        customer_id,
        employee_id,
        is_active: true,
    };
    match provision_account(conn, account).await {
        Ok(user) => {
            info!("Account '{}' created with ID: {}", user.username, user.id);
            Ok(user)
        }
        Err(e) => {
            error!("Failed to create account '{}': {}", username, e);
            Err(e.into())
        }
    }
}
