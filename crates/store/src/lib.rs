//! Corral store adapter: get/create access to Cattle records.
//!
//! The backing API server is the single enforcement point for name
//! uniqueness; this crate only classifies its answers. `get_by_name` keeps
//! "absent" (`Ok(None)`) distinguishable from backend failures because the
//! create handler branches on exactly that.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use kube::{
    api::{Api, PostParams},
    Client,
};
use tokio::sync::RwLock;
use tracing::debug;

use corral_crd::Cattle;

/// Namespace Cattle records live in unless overridden.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Errors surfaced by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this name already exists. Surfaces from the atomic
    /// create when a concurrent creator won the race after the existence
    /// check.
    #[error("cattle already exists: {name}")]
    AlreadyExists { name: String },

    /// Any other backend failure; the record state is indeterminate.
    #[error("backend: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Cattle record access. No ordering or transactional guarantee is assumed
/// between a `get_by_name` and a later `create`; the two calls are not
/// atomic and callers must treat `create` as the only uniqueness gate.
#[async_trait]
pub trait CattleStore: Send + Sync {
    /// `Ok(None)` means the record does not exist (and only that).
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Cattle>>;

    /// Atomic create; fails with `AlreadyExists` when the name is taken.
    async fn create(&self, cattle: &Cattle) -> StoreResult<()>;
}

/// Store backed by the cluster API server through a namespaced `Api<Cattle>`.
pub struct KubeCattleStore {
    api: Api<Cattle>,
}

impl KubeCattleStore {
    /// Build a store over the current kube context (kubeconfig or in-cluster).
    pub async fn connect(namespace: &str) -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, namespace))
    }

    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

fn classify_create_err(err: kube::Error, name: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => StoreError::already_exists(name),
        other => StoreError::backend(other.to_string()),
    }
}

#[async_trait]
impl CattleStore for KubeCattleStore {
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Cattle>> {
        // get_opt folds the 404 case into Ok(None); anything else is a
        // genuine backend failure.
        self.api
            .get_opt(name)
            .await
            .map_err(|e| StoreError::backend(e.to_string()))
    }

    async fn create(&self, cattle: &Cattle) -> StoreResult<()> {
        let name = cattle.spec.name.clone();
        self.api
            .create(&PostParams::default(), cattle)
            .await
            .map_err(|e| classify_create_err(e, &name))?;
        debug!(name = %name, "cattle record created");
        Ok(())
    }
}

/// In-memory store for tests and local runs, with the same conflict
/// semantics as the kube-backed one.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Cattle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.records.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, name: &str) -> Option<Cattle> {
        self.records.read().await.get(name).cloned()
    }
}

#[async_trait]
impl CattleStore for MemoryStore {
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Cattle>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn create(&self, cattle: &Cattle) -> StoreResult<()> {
        let name = cattle.spec.name.clone();
        let mut records = self.records.write().await;
        if records.contains_key(&name) {
            return Err(StoreError::already_exists(name));
        }
        records.insert(name, cattle.clone());
        Ok(())
    }
}
