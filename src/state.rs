use crate::{
    cache::Cache,
    db::{DbPool, OrmConn},
    services::notification_service::Notifier,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub cache: Cache,
    pub notifier: Notifier,
}
