use crate::repos::repo::{RepoMigrations, SQLikeMigrations};

use super::PostgresRepo;

impl RepoMigrations for PostgresRepo {
    fn create_scan_progress_migration() -> &'static [&'static str] {
        SQLikeMigrations::create_scan_progress()
    }

    fn create_events_migration() -> &'static [&'static str] {
        SQLikeMigrations::create_events()
    }

    fn create_relay_hash_infos_migration() -> &'static [&'static str] {
        SQLikeMigrations::create_relay_hash_infos()
    }

    fn create_webhooks_migration() -> &'static [&'static str] {
        SQLikeMigrations::create_webhooks()
    }
}
