use crate::storage::Pool;
use crate::tasks::TaskRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub registry: TaskRegistry,
}
