//! Corral create handler: the create-or-detect-conflict decision logic.
//!
//! One invocation is a stateless transaction over the injected store:
//! authenticate, validate, check existence, create. Every outcome is
//! terminal; retries belong to the caller.

#![forbid(unsafe_code)]

use std::sync::Arc;

use metrics::counter;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use corral_crd::Cattle;
use corral_store::{CattleStore, StoreError};

/// Creation request payload. Only the name is client controlled; every
/// other spec field comes from fixed defaults. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: String,
}

/// Bearer token compared against the `Authorization` header value.
///
/// Comparison goes through SHA-256 digests so the equality check runs over
/// fixed-length data regardless of the attacker-controlled input.
#[derive(Clone)]
pub struct AuthToken {
    digest: [u8; 32],
}

impl AuthToken {
    pub fn new(token: &str) -> Self {
        Self {
            digest: Sha256::digest(token.as_bytes()).into(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        candidate == self.digest
    }
}

/// Terminal classification of one create invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created { name: String },
    AlreadyExists { name: String },
    Unauthorized,
    InvalidRequest { name: String },
    GetFailed { name: String },
    CreateFailed { name: String },
}

impl Outcome {
    /// User-visible message; these strings are part of the wire contract.
    pub fn message(&self) -> String {
        match self {
            Outcome::Created { name } => {
                format!("Successfully created new Cattle CRD {name}")
            }
            Outcome::AlreadyExists { name } => {
                format!("CRD already exists in cluster: {name}")
            }
            Outcome::Unauthorized => "Unauthorized".to_string(),
            Outcome::InvalidRequest { name } => {
                format!("Invalid token create request: {name}")
            }
            Outcome::GetFailed { name } => {
                format!("Failed to get CRD from cluster {name}")
            }
            Outcome::CreateFailed { name } => {
                format!("Failed to create new Cattle CRD {name}")
            }
        }
    }
}

/// Create handler. Holds no mutable state; concurrent invocations share
/// only the store and the read-only token.
pub struct CreateHandler {
    store: Arc<dyn CattleStore>,
    token: AuthToken,
    conflict_on_create_race: bool,
}

impl CreateHandler {
    pub fn new(store: Arc<dyn CattleStore>, token: AuthToken) -> Self {
        Self {
            store,
            token,
            conflict_on_create_race: false,
        }
    }

    /// Report a create-time `AlreadyExists` (a lost creation race) as the
    /// conflict outcome instead of a generic backend failure. Off by
    /// default: the race-lost case is then indistinguishable from any other
    /// create failure, which matches the historical behavior of this API.
    pub fn conflict_on_create_race(mut self, on: bool) -> Self {
        self.conflict_on_create_race = on;
        self
    }

    /// Decide the fate of one creation request.
    ///
    /// The existence check is a fast-path optimization only; two racing
    /// requests can both observe "absent", and the store's atomic create is
    /// what actually enforces at-most-one record per name.
    pub async fn handle_create(
        &self,
        auth_header: Option<&str>,
        request: &CreateRequest,
    ) -> Outcome {
        counter!("create_requests", 1u64);

        match auth_header {
            Some(value) if !value.is_empty() && self.token.matches(value) => {}
            _ => {
                counter!("create_unauthorized", 1u64);
                return Outcome::Unauthorized;
            }
        }

        let name = request.name.as_str();
        if name.is_empty() {
            let out = Outcome::InvalidRequest {
                name: name.to_string(),
            };
            info!("{}", out.message());
            return out;
        }

        match self.store.get_by_name(name).await {
            Ok(Some(_)) => {
                counter!("create_conflicts", 1u64);
                return Outcome::AlreadyExists {
                    name: name.to_string(),
                };
            }
            Err(e) => {
                let out = Outcome::GetFailed {
                    name: name.to_string(),
                };
                error!(error = %e, "{}", out.message());
                counter!("create_store_errors", 1u64);
                return out;
            }
            Ok(None) => {}
        }

        info!(name, "creating a new cattle record");
        match self.store.create(&Cattle::with_defaults(name)).await {
            Ok(()) => {
                let out = Outcome::Created {
                    name: name.to_string(),
                };
                info!("{}", out.message());
                counter!("create_ok", 1u64);
                out
            }
            Err(StoreError::AlreadyExists { .. }) if self.conflict_on_create_race => {
                counter!("create_conflicts", 1u64);
                Outcome::AlreadyExists {
                    name: name.to_string(),
                }
            }
            Err(e) => {
                let out = Outcome::CreateFailed {
                    name: name.to_string(),
                };
                error!(error = %e, "{}", out.message());
                counter!("create_store_errors", 1u64);
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use corral_store::{MemoryStore, StoreResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN: &str = "sekrit";

    /// Wraps a MemoryStore and counts calls, to assert the handler stays
    /// away from the store on auth/validation failures.
    struct RecordingStore {
        inner: MemoryStore,
        gets: AtomicUsize,
        creates: AtomicUsize,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                gets: AtomicUsize::new(0),
                creates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CattleStore for RecordingStore {
        async fn get_by_name(&self, name: &str) -> StoreResult<Option<Cattle>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get_by_name(name).await
        }

        async fn create(&self, cattle: &Cattle) -> StoreResult<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create(cattle).await
        }
    }

    /// Store whose configured calls fail.
    struct FailingStore {
        fail_get: bool,
        create_conflict: bool,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl CattleStore for FailingStore {
        async fn get_by_name(&self, _name: &str) -> StoreResult<Option<Cattle>> {
            if self.fail_get {
                Err(corral_store::StoreError::backend("connection refused"))
            } else {
                Ok(None)
            }
        }

        async fn create(&self, cattle: &Cattle) -> StoreResult<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.create_conflict {
                Err(corral_store::StoreError::already_exists(
                    cattle.spec.name.clone(),
                ))
            } else {
                Err(corral_store::StoreError::backend("write timeout"))
            }
        }
    }

    fn handler(store: Arc<dyn CattleStore>) -> CreateHandler {
        CreateHandler::new(store, AuthToken::new(TOKEN))
    }

    fn req(name: &str) -> CreateRequest {
        CreateRequest {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn created_then_conflict_never_created_twice() {
        let store = Arc::new(MemoryStore::new());
        let h = handler(store.clone());

        let first = h.handle_create(Some(TOKEN), &req("bessie")).await;
        assert_eq!(
            first,
            Outcome::Created {
                name: "bessie".into()
            }
        );

        let second = h.handle_create(Some(TOKEN), &req("bessie")).await;
        assert_eq!(
            second,
            Outcome::AlreadyExists {
                name: "bessie".into()
            }
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn auth_gate_makes_zero_store_calls() {
        let store = Arc::new(RecordingStore::new());
        let h = handler(store.clone());

        for bad in [None, Some(""), Some("wrong"), Some("sekrit ")] {
            let out = h.handle_create(bad, &req("bessie")).await;
            assert_eq!(out, Outcome::Unauthorized);
        }
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_name_rejected_before_store() {
        let store = Arc::new(RecordingStore::new());
        let h = handler(store.clone());

        let out = h.handle_create(Some(TOKEN), &req("")).await;
        assert_eq!(out, Outcome::InvalidRequest { name: String::new() });
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn created_record_carries_fixed_defaults() {
        let store = Arc::new(MemoryStore::new());
        let h = handler(store.clone());

        // Extra request fields are ignored by the typed decode; only the
        // name survives into the record.
        let request: CreateRequest =
            serde_json::from_str(r#"{"name":"bessie","size":42,"beefParts":["brisket"]}"#)
                .unwrap();
        h.handle_create(Some(TOKEN), &request).await;

        let got = store.get("bessie").await.unwrap();
        assert_eq!(got.spec.size, 1);
        assert_eq!(got.spec.beef_parts, vec!["chuck", "ribs", "plate"]);
    }

    #[tokio::test]
    async fn get_failure_skips_create() {
        let store = Arc::new(FailingStore {
            fail_get: true,
            create_conflict: false,
            creates: AtomicUsize::new(0),
        });
        let h = handler(store.clone());

        let out = h.handle_create(Some(TOKEN), &req("bessie")).await;
        assert_eq!(
            out,
            Outcome::GetFailed {
                name: "bessie".into()
            }
        );
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_failure_is_terminal() {
        let store = Arc::new(FailingStore {
            fail_get: false,
            create_conflict: false,
            creates: AtomicUsize::new(0),
        });
        let h = handler(store.clone());

        let out = h.handle_create(Some(TOKEN), &req("bessie")).await;
        assert_eq!(
            out,
            Outcome::CreateFailed {
                name: "bessie".into()
            }
        );
        // No retry.
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn race_lost_create_is_generic_failure_by_default() {
        let store = Arc::new(FailingStore {
            fail_get: false,
            create_conflict: true,
            creates: AtomicUsize::new(0),
        });
        let h = handler(store);

        let out = h.handle_create(Some(TOKEN), &req("bessie")).await;
        assert_eq!(
            out,
            Outcome::CreateFailed {
                name: "bessie".into()
            }
        );
    }

    #[tokio::test]
    async fn race_lost_create_maps_to_conflict_when_enabled() {
        let store = Arc::new(FailingStore {
            fail_get: false,
            create_conflict: true,
            creates: AtomicUsize::new(0),
        });
        let h = handler(store).conflict_on_create_race(true);

        let out = h.handle_create(Some(TOKEN), &req("bessie")).await;
        assert_eq!(
            out,
            Outcome::AlreadyExists {
                name: "bessie".into()
            }
        );
    }

    #[test]
    fn messages_match_wire_contract() {
        let name = "bessie".to_string();
        assert_eq!(
            Outcome::Created { name: name.clone() }.message(),
            "Successfully created new Cattle CRD bessie"
        );
        assert_eq!(
            Outcome::AlreadyExists { name: name.clone() }.message(),
            "CRD already exists in cluster: bessie"
        );
        assert_eq!(Outcome::Unauthorized.message(), "Unauthorized");
        assert_eq!(
            Outcome::InvalidRequest { name: String::new() }.message(),
            "Invalid token create request: "
        );
        assert_eq!(
            Outcome::GetFailed { name: name.clone() }.message(),
            "Failed to get CRD from cluster bessie"
        );
        assert_eq!(
            Outcome::CreateFailed { name }.message(),
            "Failed to create new Cattle CRD bessie"
        );
    }
}
