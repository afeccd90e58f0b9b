//! Mail-dispatch capability: the third-party client the contact form sends
//! through, and the loader that acquires it at runtime.

use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{PublicKey, ServiceId, TemplateId},
    protocol::{ContactPayload, EmailSendRequest},
};
use tracing::{debug, warn};
use url::Url;

const EMAILJS_SEND_PATH: &str = "api/v1.0/email/send";

#[async_trait]
pub trait MailDispatchClient: Send + Sync {
    /// Called at most once, right after the client is loaded.
    fn init(&self, public_key: &PublicKey);

    /// Resolves when the service accepts the message.
    async fn send(
        &self,
        service_id: &ServiceId,
        template_id: &TemplateId,
        payload: &ContactPayload,
    ) -> Result<()>;
}

#[async_trait]
pub trait MailClientLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn MailDispatchClient>>;
}

pub struct MissingMailClientLoader;

#[async_trait]
impl MailClientLoader for MissingMailClientLoader {
    async fn load(&self) -> Result<Arc<dyn MailDispatchClient>> {
        Err(anyhow!("mail dispatch client loader is unavailable"))
    }
}

/// Whether the dispatch client has finished loading.
#[derive(Clone, Default)]
pub enum MailCapability {
    #[default]
    NotReady,
    Ready(Arc<dyn MailDispatchClient>),
}

impl MailCapability {
    pub fn is_ready(&self) -> bool {
        matches!(self, MailCapability::Ready(_))
    }

    pub fn client(&self) -> Option<Arc<dyn MailDispatchClient>> {
        match self {
            MailCapability::NotReady => None,
            MailCapability::Ready(client) => Some(Arc::clone(client)),
        }
    }
}

impl std::fmt::Debug for MailCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailCapability::NotReady => f.write_str("NotReady"),
            MailCapability::Ready(_) => f.write_str("Ready(..)"),
        }
    }
}

/// HTTP client for the EmailJS send endpoint.
pub struct EmailJsClient {
    http: Client,
    send_url: Url,
    public_key: OnceLock<PublicKey>,
}

impl EmailJsClient {
    pub fn new(api_base: &str) -> Result<Self> {
        let mut base =
            Url::parse(api_base).with_context(|| format!("invalid mail api base '{api_base}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let send_url = base
            .join(EMAILJS_SEND_PATH)
            .with_context(|| format!("failed to build send url from '{api_base}'"))?;

        Ok(Self {
            http: Client::new(),
            send_url,
            public_key: OnceLock::new(),
        })
    }

    pub fn send_url(&self) -> &Url {
        &self.send_url
    }
}

#[async_trait]
impl MailDispatchClient for EmailJsClient {
    fn init(&self, public_key: &PublicKey) {
        if self.public_key.set(public_key.clone()).is_err() {
            warn!("mail client already initialized; keeping the first public key");
        }
    }

    async fn send(
        &self,
        service_id: &ServiceId,
        template_id: &TemplateId,
        payload: &ContactPayload,
    ) -> Result<()> {
        let public_key = self
            .public_key
            .get()
            .ok_or_else(|| anyhow!("mail client used before init"))?;

        self.http
            .post(self.send_url.clone())
            .json(&EmailSendRequest {
                service_id: service_id.clone(),
                template_id: template_id.clone(),
                user_id: public_key.clone(),
                template_params: payload.clone(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub struct EmailJsLoader {
    api_base: String,
}

impl EmailJsLoader {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl MailClientLoader for EmailJsLoader {
    async fn load(&self) -> Result<Arc<dyn MailDispatchClient>> {
        let client = EmailJsClient::new(&self.api_base)?;
        debug!(url = %client.send_url(), "mail dispatch client loaded");
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
#[path = "tests/mail_tests.rs"]
mod tests;
