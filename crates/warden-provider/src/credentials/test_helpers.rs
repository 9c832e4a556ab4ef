//! Shared setup for the credential service tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use warden_core::ScopeSet;
use warden_core::config::CredentialConfig;
use warden_crypto::{CryptoError, SecureTokenGenerator, TokenGenerator, generate_hex_token};

use super::{ClientRegistration, Provider};
use crate::storage::{Client, ProviderDatabase};

/// Hands out queued values first, then random ones.
#[derive(Default)]
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    pub fn new<I: IntoIterator<Item = &'static str>>(values: I) -> Self {
        Self {
            queue: Mutex::new(values.into_iter().map(str::to_string).collect()),
        }
    }
}

impl TokenGenerator for ScriptedGenerator {
    fn generate(&self, byte_len: usize) -> Result<String, CryptoError> {
        match self.queue.lock().unwrap().pop_front() {
            Some(value) => Ok(value),
            None => generate_hex_token(byte_len),
        }
    }
}

pub async fn setup() -> Provider {
    setup_with(Arc::new(SecureTokenGenerator::new()), CredentialConfig::default()).await
}

pub async fn setup_with(generator: Arc<dyn TokenGenerator>, config: CredentialConfig) -> Provider {
    let db = ProviderDatabase::open_in_memory().await.unwrap();
    Provider::new(db, generator, config)
}

/// Register a client allowed `read` and `write` with a fixed redirect URI.
pub async fn register_client(provider: &Provider, name: &str) -> Client {
    provider
        .clients
        .register(ClientRegistration {
            display_name: Some(name.into()),
            link: Some(format!("https://{name}.example.com")),
            redirect_uri: Some("https://example.com/callback".into()),
            scope: ScopeSet::from(["read", "write"]),
            ..ClientRegistration::default()
        })
        .await
        .unwrap()
}
