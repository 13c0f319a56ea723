//! Application state shared by the HTTP handlers

use std::sync::Arc;

use crate::domain::CatalogClient;
use crate::infrastructure::store::LocalStore;
use crate::services::QueryView;
use crate::sync::SyncCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub store: LocalStore,
    pub coordinator: Arc<SyncCoordinator>,
    pub view: Arc<QueryView>,
}

impl AppState {
    /// Wire the coordinator and read models over one store.
    pub async fn new(
        store: LocalStore,
        catalog: Arc<dyn CatalogClient>,
    ) -> Result<Self, crate::domain::StoreError> {
        let coordinator = Arc::new(SyncCoordinator::new(store.clone(), catalog));
        let view = Arc::new(QueryView::new(store.clone()).await?);

        Ok(Self {
            store,
            coordinator,
            view,
        })
    }
}
