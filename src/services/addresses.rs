use std::sync::Arc;
use uuid::Uuid;

use super::load_user;
use crate::domain::aggregates::Address;
use crate::error::AppError;
use crate::store::Store;

/// The user's address book. Orders keep their own copy of the address they
/// were shipped to, so removing an entry here never touches an order.
#[derive(Clone)]
pub struct AddressService {
    store: Arc<dyn Store>,
}

impl AddressService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[tracing::instrument(skip(self, alias, city, details))]
    pub async fn add(&self, user_id: Uuid, alias: String, city: String, details: String) -> Result<Address, AppError> {
        load_user(self.store.as_ref(), user_id).await?;
        let address = self.store.add_address(user_id, Address::new(alias, city, details)).await?;
        tracing::debug!(address_id = %address.id, "address added");
        Ok(address)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Address>, AppError> {
        Ok(load_user(self.store.as_ref(), user_id).await?.addresses)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, address_id: Uuid) -> Result<(), AppError> {
        if self.store.remove_address(user_id, address_id).await? {
            Ok(())
        } else {
            Err(AppError::AddressNotFound(address_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Role, User};
    use crate::store::MemoryStore;
    use testresult::TestResult;

    #[tokio::test]
    async fn add_list_remove() -> TestResult {
        let store = Arc::new(MemoryStore::new());
        let user = store.insert_user(User::new("Ana", "ana@example.com", Role::User)).await?;
        let service = AddressService::new(store.clone());

        let home = service.add(user.id, "home".into(), "Cairo".into(), "12 Nile St".into()).await?;
        assert_eq!(service.list(user.id).await?, vec![home.clone()]);

        service.remove(user.id, home.id).await?;
        assert!(service.list(user.id).await?.is_empty());
        assert!(matches!(service.remove(user.id, home.id).await, Err(AppError::AddressNotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_is_unauthorized() {
        let service = AddressService::new(Arc::new(MemoryStore::new()));
        let result = service.add(Uuid::now_v7(), "home".into(), "Giza".into(), "1 Pyramid Rd".into()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}
