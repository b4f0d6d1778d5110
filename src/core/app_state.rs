use crate::core::aliases::DbPool;
use crate::realtime::RealtimePublisher;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub realtime: RealtimePublisher,
}
