//! API key verification.
//!
//! Keys are never stored in the clear: both backends keep the SHA-256 hex
//! digest of each key.

use std::collections::HashSet;

use async_trait::async_trait;
use exrate_common::{RateError, RateResult};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info};

/// Compute SHA-256 hash and return as hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash: [u8; 32] = hasher.finalize().into();
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Checks credentials presented at the request boundary.
#[async_trait]
pub trait AccessGate: Send + Sync {
    /// Check whether `key` is registered. An empty key is never valid.
    async fn verify(&self, key: &str) -> RateResult<bool>;

    /// Register `key`. Registering a known key is a no-op.
    async fn register(&self, key: &str) -> RateResult<()>;
}

fn require_key(operation: &'static str, key: &str) -> RateResult<()> {
    if key.trim().is_empty() {
        return Err(RateError::validation(operation, "API key must not be empty"));
    }
    Ok(())
}

/// API keys held in process memory.
#[derive(Debug, Default)]
pub struct MemoryAccessGate {
    hashes: RwLock<HashSet<String>>,
}

impl MemoryAccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.hashes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }
}

#[async_trait]
impl AccessGate for MemoryAccessGate {
    async fn verify(&self, key: &str) -> RateResult<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        Ok(self.hashes.read().contains(&sha256_hex(key.as_bytes())))
    }

    async fn register(&self, key: &str) -> RateResult<()> {
        require_key("access.register", key)?;
        if self.hashes.write().insert(sha256_hex(key.as_bytes())) {
            debug!("Registered API key");
        }
        Ok(())
    }
}

/// API keys stored in the `api_keys` table.
#[derive(Debug, Clone)]
pub struct PgAccessGate {
    pool: PgPool,
}

impl PgAccessGate {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessGate for PgAccessGate {
    async fn verify(&self, key: &str) -> RateResult<bool> {
        if key.is_empty() {
            return Ok(false);
        }

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM api_keys WHERE key_hash = $1)")
                .bind(sha256_hex(key.as_bytes()))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RateError::storage("access.verify", e))?;

        Ok(exists)
    }

    async fn register(&self, key: &str) -> RateResult<()> {
        const OP: &str = "access.register";

        require_key(OP, key)?;
        let result = sqlx::query(
            "INSERT INTO api_keys (key_hash) VALUES ($1) ON CONFLICT (key_hash) DO NOTHING",
        )
        .bind(sha256_hex(key.as_bytes()))
        .execute(&self.pool)
        .await
        .map_err(|e| RateError::storage(OP, e))?;

        if result.rows_affected() > 0 {
            info!("Registered API key");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exrate_common::ErrorKind;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_memory_gate() {
        let gate = MemoryAccessGate::new();
        assert!(!gate.verify("secret").await.unwrap());

        gate.register("secret").await.unwrap();
        gate.register("secret").await.unwrap();

        assert_eq!(gate.len(), 1);
        assert!(gate.verify("secret").await.unwrap());
        assert!(!gate.verify("Secret").await.unwrap());
        assert!(!gate.verify("").await.unwrap());
    }

    #[test]
    fn test_register_rejects_blank_key() {
        let gate = MemoryAccessGate::new();
        let err = tokio_test::block_on(gate.register("  ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(gate.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Postgres at DATABASE_URL"]
    async fn test_pg_gate_register_and_verify() {
        let pool = crate::test_pool().await;
        let gate = PgAccessGate::new(pool.clone());
        let key = "pg-gate-registration-key";

        sqlx::query("DELETE FROM api_keys WHERE key_hash = $1")
            .bind(sha256_hex(key.as_bytes()))
            .execute(&pool)
            .await
            .unwrap();

        assert!(!gate.verify(key).await.unwrap());

        gate.register(key).await.unwrap();
        gate.register(key).await.unwrap();

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE key_hash = $1")
            .bind(sha256_hex(key.as_bytes()))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);

        assert!(gate.verify(key).await.unwrap());
        assert!(!gate.verify("").await.unwrap());
        assert_eq!(
            gate.register(" ").await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }
}
