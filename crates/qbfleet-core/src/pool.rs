//! The Client Pool: process-wide registry of memoized Upstream Clients.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::OnceCell;

use crate::cache::SmallObjectCache;
use crate::client::{QbittorrentClient, UpstreamClient};
use crate::error::{ProxyError, ProxyResult};
use crate::instance_store::InstanceStore;
use crate::model::{ConnectionStatus, Instance, InstanceId};

/// Number of consecutive failed health checks before a memoized client is dropped.
const HEALTH_CHECK_FAILURE_LIMIT: u32 = 3;

/// TTL for cached `ConnectionStatus` entries, per spec.md §3 ("ephemeral,
/// per instance ... TTL ≈ 5 s").
const CONNECTION_STATUS_TTL: Duration = Duration::from_secs(5);

type ClientSlot = Arc<OnceCell<Arc<dyn UpstreamClient>>>;

/// Process-wide registry mapping `InstanceId` to its memoized `UpstreamClient`.
pub struct ClientPool {
    instance_store: Arc<dyn InstanceStore>,
    encryption_key: [u8; 32],
    slots: Mutex<HashMap<InstanceId, ClientSlot>>,
    decryption_errors: Mutex<HashSet<InstanceId>>,
    health_failures: Mutex<HashMap<InstanceId, u32>>,
    cache: Arc<SmallObjectCache<String, ConnectionStatus>>,
}

impl ClientPool {
    /// Build a pool reading instances from `instance_store`.
    #[must_use]
    pub fn new(instance_store: Arc<dyn InstanceStore>, encryption_key: [u8; 32]) -> Self {
        Self {
            instance_store,
            encryption_key,
            slots: Mutex::new(HashMap::new()),
            decryption_errors: Mutex::new(HashSet::new()),
            health_failures: Mutex::new(HashMap::new()),
            cache: Arc::new(SmallObjectCache::new(4_096)),
        }
    }

    /// Fetch the memoized client for `id`, constructing and logging in on
    /// first use. Concurrent callers for the same id share the in-flight
    /// construction via `tokio::sync::OnceCell`.
    ///
    /// # Errors
    ///
    /// `InstanceNotFound`/`InstanceDisabled` if the row is missing or
    /// inactive, `DecryptionError` if the stored credentials cannot be
    /// decrypted, or whatever the first login attempt returns.
    pub async fn get_client(&self, id: InstanceId) -> ProxyResult<Arc<dyn UpstreamClient>> {
        let slot = self.slot_for(id);
        slot.get_or_try_init(|| self.construct(id))
            .await
            .cloned()
    }

    /// Same as [`Self::get_client`] but bounded by `timeout`; a timeout
    /// returns `ProxyError::Unavailable` and does not poison the slot so a
    /// later call may succeed.
    pub async fn get_client_with_timeout(
        &self,
        id: InstanceId,
        timeout: Duration,
    ) -> ProxyResult<Arc<dyn UpstreamClient>> {
        match tokio::time::timeout(timeout, self.get_client(id)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ProxyError::Unavailable { instance_id: id }),
        }
    }

    /// Drop the memoized client for `id`; the next `get_client` reconstructs
    /// it from a fresh `Instance` row. Callers MUST invoke this after any
    /// instance row update.
    pub fn remove(&self, id: InstanceId) {
        self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
        self.health_failures.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
    }

    /// Snapshot of instance ids currently flagged with a decryption error.
    #[must_use]
    pub fn instances_with_decryption_errors(&self) -> HashSet<InstanceId> {
        self.decryption_errors.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Snapshot of instance ids currently accumulating consecutive failed
    /// health checks (not yet evicted).
    #[must_use]
    pub fn instances_with_health_failures(&self) -> HashSet<InstanceId> {
        self.health_failures.lock().unwrap_or_else(std::sync::PoisonError::into_inner).keys().copied().collect()
    }

    /// Shared small-object TTL cache handle.
    #[must_use]
    pub fn cache(&self) -> Arc<SmallObjectCache<String, ConnectionStatus>> {
        Arc::clone(&self.cache)
    }

    /// Number of instances with a currently memoized client.
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Record the outcome of a health check against the memoized client for
    /// `id`, dropping it once it has failed `HEALTH_CHECK_FAILURE_LIMIT`
    /// consecutive times.
    pub async fn record_health_check(&self, id: InstanceId, healthy: bool) {
        if healthy {
            self.health_failures.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
            self.record_connection_status(id, ConnectionStatus { connected: true, last_error: None }).await;
            return;
        }
        let count = {
            let mut failures = self.health_failures.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let count = failures.entry(id).or_insert(0);
            *count += 1;
            *count
        };
        self.record_connection_status(
            id,
            ConnectionStatus { connected: false, last_error: Some("health check failed".to_string()) },
        )
        .await;
        if count >= HEALTH_CHECK_FAILURE_LIMIT {
            self.health_failures.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
            self.remove(id);
        }
    }

    /// Cache `status` for `id` under spec.md §3's ≈5 s connection-status TTL.
    async fn record_connection_status(&self, id: InstanceId, status: ConnectionStatus) {
        self.cache.set_with_ttl(id.to_string(), status, 1, CONNECTION_STATUS_TTL).await;
    }

    fn slot_for(&self, id: InstanceId) -> ClientSlot {
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(slots.entry(id).or_insert_with(|| Arc::new(OnceCell::new())))
    }

    async fn construct(&self, id: InstanceId) -> ProxyResult<Arc<dyn UpstreamClient>> {
        let instance = self
            .instance_store
            .instance(id)
            .await
            .map_err(|_source| ProxyError::InstanceNotFound { instance_id: id })?;
        if !instance.is_active {
            return Err(ProxyError::InstanceDisabled { instance_id: id });
        }
        let password = match decrypt_credential(&self.encryption_key, &instance.encrypted_password, &instance.password_nonce) {
            Ok(password) => password,
            Err(()) => {
                self.decryption_errors
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(id);
                self.record_connection_status(
                    id,
                    ConnectionStatus { connected: false, last_error: Some("credential decryption failed".to_string()) },
                )
                .await;
                return Err(ProxyError::DecryptionError { instance_id: id });
            }
        };
        let client = QbittorrentClient::new(id, &instance.base_url, instance.username.clone(), password)?;
        if let Err(err) = client.login().await {
            self.record_connection_status(id, ConnectionStatus { connected: false, last_error: Some(err.to_string()) })
                .await;
            return Err(err);
        }
        self.decryption_errors.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
        self.record_connection_status(id, ConnectionStatus { connected: true, last_error: None }).await;
        Ok(Arc::new(client) as Arc<dyn UpstreamClient>)
    }
}

/// Decrypt one AES-256-GCM-encrypted credential, both fields base64-encoded.
fn decrypt_credential(key: &[u8; 32], ciphertext_b64: &str, nonce_b64: &str) -> Result<String, ()> {
    let ciphertext = BASE64.decode(ciphertext_b64).map_err(|_| ())?;
    let nonce_bytes = BASE64.decode(nonce_b64).map_err(|_| ())?;
    if nonce_bytes.len() != 12 {
        return Err(());
    }
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher.decrypt(nonce, ciphertext.as_slice()).map_err(|_| ())?;
    String::from_utf8(plaintext).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance_store::InstanceStoreError;
    use aes_gcm::AeadCore;
    use aes_gcm::aead::OsRng;
    use async_trait::async_trait;
    use chrono::Utc;

    fn encrypt(key: &[u8; 32], plaintext: &str) -> (String, String) {
        let cipher = Aes256Gcm::new(key.into());
        let nonce = Aes256Gcm::generate_nonce(OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext.as_bytes()).expect("encrypt succeeds");
        (BASE64.encode(ciphertext), BASE64.encode(nonce))
    }

    struct FakeStore {
        instance: Instance,
    }

    #[async_trait]
    impl InstanceStore for FakeStore {
        async fn instance(&self, id: InstanceId) -> Result<Instance, InstanceStoreError> {
            if id == self.instance.id {
                Ok(self.instance.clone())
            } else {
                Err(InstanceStoreError::NotFound { id })
            }
        }

        async fn active_instance_ids(&self) -> Result<Vec<InstanceId>, InstanceStoreError> {
            Ok(vec![self.instance.id])
        }
    }

    fn sample_instance(id: InstanceId, key: &[u8; 32], active: bool) -> Instance {
        let (encrypted_password, password_nonce) = encrypt(key, "hunter2");
        Instance {
            id,
            name: "demo".into(),
            base_url: "http://127.0.0.1:0".into(),
            username: "admin".into(),
            encrypted_password,
            password_nonce,
            basic_username: None,
            encrypted_basic_password: None,
            basic_password_nonce: None,
            is_active: active,
            has_local_filesystem_access: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn decrypt_credential_roundtrips() {
        let key = [7_u8; 32];
        let (ciphertext, nonce) = encrypt(&key, "hunter2");
        let decrypted = decrypt_credential(&key, &ciphertext, &nonce).expect("decrypts");
        assert_eq!(decrypted, "hunter2");
    }

    #[test]
    fn decrypt_credential_rejects_wrong_key() {
        let key = [7_u8; 32];
        let wrong_key = [9_u8; 32];
        let (ciphertext, nonce) = encrypt(&key, "hunter2");
        assert!(decrypt_credential(&wrong_key, &ciphertext, &nonce).is_err());
    }

    #[tokio::test]
    async fn get_client_reports_disabled_instance() {
        let key = [1_u8; 32];
        let store = Arc::new(FakeStore {
            instance: sample_instance(1, &key, false),
        });
        let pool = ClientPool::new(store, key);
        let err = pool.get_client(1).await.expect_err("disabled instance errors");
        assert!(matches!(err, ProxyError::InstanceDisabled { instance_id: 1 }));
    }

    #[tokio::test]
    async fn get_client_reports_not_found() {
        let key = [1_u8; 32];
        let store = Arc::new(FakeStore {
            instance: sample_instance(1, &key, true),
        });
        let pool = ClientPool::new(store, key);
        let err = pool.get_client(999).await.expect_err("missing instance errors");
        assert!(matches!(err, ProxyError::InstanceNotFound { instance_id: 999 }));
    }

    #[tokio::test]
    async fn record_health_check_evicts_after_limit() {
        let key = [1_u8; 32];
        let store = Arc::new(FakeStore {
            instance: sample_instance(1, &key, true),
        });
        let pool = ClientPool::new(store, key);
        // A slot is created without constructing a live client.
        let _ = pool.slot_for(1);
        pool.record_health_check(1, false).await;
        pool.record_health_check(1, false).await;
        assert!(pool.slots.lock().unwrap().contains_key(&1));
        pool.record_health_check(1, false).await;
        assert!(!pool.slots.lock().unwrap().contains_key(&1));
    }
}
