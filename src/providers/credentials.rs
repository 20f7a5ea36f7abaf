//! API keys supplied by the user
//!
//! Keys live in a [`KeyStore`]; a query takes a [`Credentials`] snapshot so
//! the provider client never reads process-wide state.

use super::{copy_secret, Provider};
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Storage for per-provider API keys and the selected provider
pub trait KeyStore: Send + Sync {
    fn get(&self, provider: Provider) -> Option<SecretString>;

    fn set(&self, provider: Provider, key: SecretString);

    fn selected_provider(&self) -> Provider;

    fn select(&self, provider: Provider);
}

/// In-process key store
#[derive(Debug)]
pub struct InMemoryKeyStore {
    keys: DashMap<Provider, SecretString>,
    selected: Mutex<Provider>,
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self {
            keys: DashMap::new(),
            selected: Mutex::new(Provider::Groq),
        }
    }
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed keys from `GROQ_API_KEY`, `OPENAI_API_KEY`, `GEMINI_API_KEY`, `DEEPSEEK_API_KEY`
    pub fn from_env(self) -> Self {
        for provider in Provider::ALL {
            let var = format!("{}_API_KEY", provider.as_str().to_uppercase());
            if let Ok(val) = std::env::var(&var) {
                if !val.trim().is_empty() {
                    debug!(%provider, "Loaded API key from environment");
                    self.keys.insert(provider, SecretString::new(val));
                }
            }
        }

        if let Ok(val) = std::env::var("RAG_PROVIDER") {
            if let Ok(provider) = val.parse() {
                self.select(provider);
            }
        }

        self
    }
}

impl KeyStore for InMemoryKeyStore {
    fn get(&self, provider: Provider) -> Option<SecretString> {
        self.keys.get(&provider).map(|k| copy_secret(k.value()))
    }

    fn set(&self, provider: Provider, key: SecretString) {
        self.keys.insert(provider, key);
    }

    fn selected_provider(&self) -> Provider {
        *self.selected.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn select(&self, provider: Provider) {
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = provider;
    }
}

/// Snapshot of user-supplied keys for one query
#[derive(Debug, Default)]
pub struct Credentials {
    keys: HashMap<Provider, SecretString>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, SecretString::new(key.into()));
        self
    }

    /// Copy every key currently held by `store`
    pub fn from_store(store: &dyn KeyStore) -> Self {
        let keys = Provider::ALL
            .iter()
            .filter_map(|p| store.get(*p).map(|k| (*p, k)))
            .collect();
        Self { keys }
    }

    /// Trimmed key for `provider`, `None` when missing or blank
    pub fn resolve(&self, provider: Provider) -> Option<SecretString> {
        self.keys
            .get(&provider)
            .map(|k| k.expose_secret().trim())
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::new(k.to_string()))
    }
}
