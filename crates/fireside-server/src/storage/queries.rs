//! Config store queries.

use fireside_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{TunnelCredentials, keys};

impl Database {
    /// Get a config value, `None` when the key was never set.
    pub async fn get_config(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM server_config WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Get a config value, treating a missing key as the empty string.
    pub async fn config_value(&self, key: &str) -> Result<String, DatabaseError> {
        Ok(self.get_config(key).await?.unwrap_or_default())
    }

    /// Insert or overwrite a config value. Last write wins.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO server_config (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Stored named-tunnel credentials, if both parts are present.
    pub async fn tunnel_credentials(&self) -> Result<Option<TunnelCredentials>, DatabaseError> {
        let creds = TunnelCredentials {
            token: self.config_value(keys::TUNNEL_TOKEN).await?,
            subdomain: self.config_value(keys::TUNNEL_SUBDOMAIN).await?,
        };
        Ok(creds.is_complete().then_some(creds))
    }

    /// Whether a named tunnel has been claimed on this installation.
    pub async fn has_named_tunnel(&self) -> Result<bool, DatabaseError> {
        Ok(!self.config_value(keys::TUNNEL_TOKEN).await?.is_empty())
    }

    /// Persist freshly claimed credentials and the permanent URL they imply.
    pub async fn store_tunnel_credentials(
        &self,
        creds: &TunnelCredentials,
    ) -> Result<(), DatabaseError> {
        self.set_config(keys::TUNNEL_TOKEN, &creds.token).await?;
        self.set_config(keys::TUNNEL_SUBDOMAIN, &creds.subdomain)
            .await?;
        self.set_config(keys::TUNNEL_URL, &creds.public_url()).await
    }

    /// Return the installation's instance id, generating it on first use.
    pub async fn ensure_instance_id(&self) -> Result<String, DatabaseError> {
        let existing = self.config_value(keys::INSTANCE_ID).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.set_config(keys::INSTANCE_ID, &id).await?;
        Ok(id)
    }

    /// Persisted pause flag.
    pub async fn is_paused(&self) -> Result<bool, DatabaseError> {
        Ok(self.config_value(keys::SERVER_PAUSED).await? == "true")
    }

    pub async fn set_paused(&self, paused: bool) -> Result<(), DatabaseError> {
        self.set_config(keys::SERVER_PAUSED, if paused { "true" } else { "false" })
            .await
    }
}
