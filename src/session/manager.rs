//! `SessionManager`: owns the session map and the key-id
//! index, runs the expiry sweeper, and offers zeroizing teardown.
//!
//! Follows the usual `touch`/`age`/`idle_time` per-session bookkeeping
//! shape, generalized to a manager-owned map, with a shutdown-channel
//! pattern for the sweeper's own lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::error::{ManagerError, SessionError};
use crate::core::SessionPolicy;
use crate::crypto::DirectionalKeys;
use crate::session::session::Session;
use crate::session::types::{KeyId, Role, SessionId};

/// Aggregate statistics over the live session set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerStats {
    /// Number of sessions not yet expired.
    pub active_count: usize,
    /// Number of sessions that are expired but not yet swept.
    pub expired_count: usize,
    /// Mean age, across all tracked sessions.
    pub average_age: Duration,
    /// Maximum age among all tracked sessions.
    pub oldest_age: Duration,
}

struct Maps {
    sessions: HashMap<SessionId, Arc<RwLock<Session>>>,
    key_ids: HashMap<KeyId, SessionId>,
}

/// Owns every live [`Session`], the `KeyId -> SessionId` index, and the
/// background expiry sweeper.
pub struct SessionManager {
    maps: RwLock<Maps>,
    policy: SessionPolicy,
    sweeper: std::sync::Mutex<Option<(JoinHandle<()>, oneshot::Sender<()>)>>,
}

impl SessionManager {
    /// Construct a manager with no sweeper running yet; call [`Self::spawn_sweeper`]
    /// to start one (tests that don't need a sweeper can skip it).
    pub fn new(policy: SessionPolicy) -> Arc<Self> {
        Arc::new(Self {
            maps: RwLock::new(Maps {
                sessions: HashMap::new(),
                key_ids: HashMap::new(),
            }),
            policy,
            sweeper: std::sync::Mutex::new(None),
        })
    }

    /// Spawn the periodic expiry sweeper at `policy.sweep_interval`.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let (tx, mut rx) = oneshot::channel();
        let this = Arc::clone(self);
        let interval = this.policy.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.sweep(Instant::now());
                    }
                    _ = &mut rx => break,
                }
            }
        });
        *self.sweeper.lock().unwrap() = Some((handle, tx));
    }

    /// Create a session with a previously-derived seed's directional keys.
    pub fn create(
        &self,
        id: SessionId,
        role: Role,
        keys: DirectionalKeys,
    ) -> Result<Arc<RwLock<Session>>, ManagerError> {
        let mut maps = self.maps.write();
        if maps.sessions.contains_key(&id) {
            return Err(ManagerError::AlreadyExists);
        }
        let session = Arc::new(RwLock::new(Session::new(
            id.clone(),
            role,
            keys,
            self.policy.clone(),
        )));
        maps.sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Bind `key_id` to `session_id`. Idempotent when the binding already
    /// matches; `Conflict` if bound to a different session; `NotFound` if
    /// `session_id` is absent.
    pub fn bind_key_id(&self, key_id: KeyId, session_id: SessionId) -> Result<(), ManagerError> {
        let mut maps = self.maps.write();
        if !maps.sessions.contains_key(&session_id) {
            return Err(ManagerError::NotFound);
        }
        match maps.key_ids.get(&key_id) {
            Some(existing) if *existing == session_id => Ok(()),
            Some(_) => {
                warn!(session_id = %session_id.as_str(), "key id already bound to a different session");
                Err(ManagerError::Conflict)
            }
            None => {
                maps.key_ids.insert(key_id, session_id);
                Ok(())
            }
        }
    }

    /// Look up a session by its own identifier.
    pub fn get_by_id(&self, session_id: &SessionId) -> Option<Arc<RwLock<Session>>> {
        self.maps.read().sessions.get(session_id).cloned()
    }

    /// Look up a session by its bound key id.
    pub fn get_by_key_id(&self, key_id: &KeyId) -> Option<Arc<RwLock<Session>>> {
        let maps = self.maps.read();
        let session_id = maps.key_ids.get(key_id)?;
        maps.sessions.get(session_id).cloned()
    }

    /// Look up the session bound to `key_id`, reject it if expired, and
    /// verify `tag` over `signature_base` with its inbound MAC key.
    pub fn verify_with_key_id(
        &self,
        key_id: &KeyId,
        signature_base: &[u8],
        tag: &[u8],
    ) -> Result<(), ManagerError> {
        let session = self.get_by_key_id(key_id).ok_or(ManagerError::NotFound)?;
        let session = session.read();
        if session.is_expired(Instant::now()) {
            return Err(ManagerError::Expired);
        }
        session
            .verify_inbound_mac(signature_base, tag)
            .map_err(ManagerError::from)
    }

    /// Collect and close every session expired as of `now`, dropping their
    /// key-id bindings. Takes the manager lock only to collect the expired
    /// id list; sessions are closed outside the lock.
    pub fn sweep(&self, now: Instant) {
        let expired: Vec<SessionId> = {
            let maps = self.maps.read();
            maps.sessions
                .iter()
                .filter(|(_, session)| session.read().is_expired(now))
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &expired {
            if let Some(session) = self.get_by_id(id) {
                session.write().close();
            }
        }

        let mut maps = self.maps.write();
        for id in &expired {
            maps.sessions.remove(id);
        }
        maps.key_ids.retain(|_, sid| !expired.contains(sid));

        if !expired.is_empty() {
            debug!(count = expired.len(), "swept expired sessions");
        }
    }

    /// Aggregate stats over every tracked session.
    pub fn stats(&self, now: Instant) -> ManagerStats {
        let maps = self.maps.read();
        let mut active_count = 0;
        let mut expired_count = 0;
        let mut total_age = Duration::ZERO;
        let mut oldest_age = Duration::ZERO;

        for session in maps.sessions.values() {
            let session = session.read();
            let age = session.age(now);
            total_age += age;
            oldest_age = oldest_age.max(age);
            if session.is_expired(now) {
                expired_count += 1;
            } else {
                active_count += 1;
            }
        }

        let n = maps.sessions.len().max(1) as u32;
        ManagerStats {
            active_count,
            expired_count,
            average_age: total_age / n,
            oldest_age,
        }
    }

    /// Close every session, zeroizing their keys, and stop the sweeper.
    pub fn shutdown(&self) {
        if let Some((handle, tx)) = self.sweeper.lock().unwrap().take() {
            let _ = tx.send(());
            handle.abort();
        }
        let mut maps = self.maps.write();
        for session in maps.sessions.values() {
            session.write().close();
        }
        maps.sessions.clear();
        maps.key_ids.clear();
    }
}

impl From<SessionError> for ManagerError {
    fn from(err: SessionError) -> Self {
        ManagerError::Session(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_directional_keys;

    fn sample_keys() -> DirectionalKeys {
        derive_directional_keys(&[3u8; 32], "sess-1")
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let manager = SessionManager::new(SessionPolicy::default());
        let id = SessionId::new("sess-1".into());
        manager.create(id.clone(), Role::Initiator, sample_keys()).unwrap();
        assert!(matches!(
            manager.create(id, Role::Initiator, sample_keys()),
            Err(ManagerError::AlreadyExists)
        ));
    }

    #[test]
    fn bind_key_id_is_idempotent_and_detects_conflict() {
        let manager = SessionManager::new(SessionPolicy::default());
        let id = SessionId::new("sess-1".into());
        manager.create(id.clone(), Role::Initiator, sample_keys()).unwrap();

        let key_id = KeyId::generate();
        manager.bind_key_id(key_id.clone(), id.clone()).unwrap();
        manager.bind_key_id(key_id.clone(), id.clone()).unwrap();

        let other_id = SessionId::new("sess-2".into());
        manager
            .create(other_id.clone(), Role::Responder, sample_keys())
            .unwrap();
        assert!(matches!(
            manager.bind_key_id(key_id, other_id),
            Err(ManagerError::Conflict)
        ));
    }

    #[test]
    fn bind_key_id_requires_existing_session() {
        let manager = SessionManager::new(SessionPolicy::default());
        let missing = SessionId::new("nope".into());
        assert!(matches!(
            manager.bind_key_id(KeyId::generate(), missing),
            Err(ManagerError::NotFound)
        ));
    }

    #[test]
    fn sweep_removes_expired_sessions_and_bindings() {
        let policy = SessionPolicy::builder()
            .max_age(Duration::from_millis(0))
            .build();
        let manager = SessionManager::new(policy);
        let id = SessionId::new("sess-1".into());
        manager.create(id.clone(), Role::Initiator, sample_keys()).unwrap();
        let key_id = KeyId::generate();
        manager.bind_key_id(key_id.clone(), id.clone()).unwrap();

        manager.sweep(Instant::now() + Duration::from_millis(1));

        assert!(manager.get_by_id(&id).is_none());
        assert!(manager.get_by_key_id(&key_id).is_none());
    }
}
