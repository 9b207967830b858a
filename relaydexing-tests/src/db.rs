use dotenvy::dotenv;
use std::env;

/// Postgres-backed tests only run when `TEST_DATABASE_URL` is set
pub fn database_url() -> Option<String> {
    dotenv().ok();

    env::var("TEST_DATABASE_URL").ok()
}
