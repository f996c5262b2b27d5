use async_trait::async_trait;
use keyring::Entry;

use super::{KeyValueStore, StoreError};

/// Sessions kept in the OS keychain, one entry per key.
///
/// Keychain calls block, so each one runs on the blocking pool.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl KeyValueStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>, StoreError> {
            let entry = Entry::new(&service, &key)?;
            match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let entry = Entry::new(&service, &key)?;
            entry.set_password(&value)?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "needs an unlocked OS keychain"]
    async fn test_keeps_what_it_writes() {
        let store = KeyringStore::new(format!("postcache-test-{}", std::process::id()));
        let key = format!("alice-{:08x}", rand::random::<u32>());

        assert_eq!(store.get(&key).await.unwrap(), None);
        store.put(&key, "[1]".to_string()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("[1]"));
        store.put(&key, "[2]".to_string()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("[2]"));

        Entry::new(&store.service, &key).unwrap().delete_credential().unwrap();
    }
}
