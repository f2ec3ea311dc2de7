pub mod accounts;
pub mod initdb;
pub mod migrate_and_serve;
pub mod serve;

pub use accounts::{create_employee, create_user};
pub use initdb::init_database;
pub use migrate_and_serve::migrate_and_serve;
pub use serve::serve;
