use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use crate::config::Config;

/// Stripe credentials stored under `<kv_mount>/stripe`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StripeSecrets {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
}

impl StripeSecrets {
    fn from_map(secret: &HashMap<String, String>) -> Self {
        let pick = |key: &str| {
            secret
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            secret_key: pick("secret_key"),
            webhook_secret: pick("webhook_secret"),
        }
    }

    /// Overrides the environment values with whatever Vault holds.
    pub fn apply_to(self, config: &mut Config) {
        if let Some(key) = self.secret_key {
            config.stripe.secret_key = Some(key);
        }
        if let Some(secret) = self.webhook_secret {
            config.stripe.webhook_secret = Some(secret);
        }
    }
}

pub struct SecretsManager {
    client: VaultClient,
    kv_mount: String,
}

impl SecretsManager {
    /// Vault is opt-in: only used when `VAULT_ROLE_ID` is set.
    pub fn is_enabled() -> bool {
        env::var("VAULT_ROLE_ID").map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub async fn new() -> Result<Self> {
        let vault_addr =
            env::var("VAULT_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8200".to_string());
        let role_id = env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?;
        let secret_id = env::var("VAULT_SECRET_ID").context("VAULT_SECRET_ID is required")?;
        let auth_mount = env::var("VAULT_AUTH_MOUNT").unwrap_or_else(|_| "auth/approle".to_string());
        let kv_mount = env::var("VAULT_KV_MOUNT").unwrap_or_else(|_| "secret".to_string());

        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(&vault_addr)
                .build()
                .context("failed to build Vault client settings")?,
        )
        .context("failed to create Vault client")?;

        let auth = approle::login(&mut client, &auth_mount, &role_id, &secret_id)
            .await
            .context("failed to authenticate to Vault with AppRole")?;
        client.set_token(&auth.client_token);

        Ok(Self { client, kv_mount })
    }

    pub async fn get_stripe_secrets(&self) -> Result<StripeSecrets> {
        let secret: HashMap<String, String> = kv2::read(&self.client, &self.kv_mount, "stripe")
            .await
            .context("failed to read secret/stripe from Vault")?;

        Ok(StripeSecrets::from_map(&secret))
    }
}

/// Loads Stripe secrets from Vault into `config` when Vault is enabled.
pub async fn load_into(config: &mut Config) -> Result<()> {
    if !SecretsManager::is_enabled() {
        return Ok(());
    }

    let manager = SecretsManager::new().await?;
    manager.get_stripe_secrets().await?.apply_to(config);
    tracing::info!("Stripe secrets loaded from Vault");
    Ok(())
}
