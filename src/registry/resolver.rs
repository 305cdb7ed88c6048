//! Reference resolution and the entry point for fetchers and pushers

use crate::config::ResolverConfig;
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use crate::manifest::detect_media_type;
use crate::media_types::SUPPORTED_IMAGE_MEDIA_TYPES;
use crate::reference::RegistryReference;
use crate::registry::api::{EcrApi, Session};
use crate::registry::base::RegistryBase;
use crate::registry::fetcher::Fetcher;
use crate::registry::pusher::Pusher;
use crate::upload::progress::{InMemoryTracker, StatusTracker};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Region-bound API clients, created at most once per region
#[derive(Default)]
struct ClientCache {
    clients: Mutex<HashMap<String, Arc<dyn EcrApi>>>,
}

impl ClientCache {
    fn get_or_create(&self, region: &str, session: Option<&Arc<dyn Session>>) -> Result<Arc<dyn EcrApi>> {
        // Creation happens under the lock so racing callers share one client
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(region) {
            return Ok(Arc::clone(client));
        }

        let session = session.ok_or_else(|| {
            RegistryError::Configuration(format!("no session configured to create a client for region {}", region))
        })?;
        debug!(region = %region, "creating registry client");
        let client = session.client_for_region(region)?;
        clients.insert(region.to_string(), Arc::clone(&client));
        Ok(client)
    }

    fn insert(&self, region: String, client: Arc<dyn EcrApi>) {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(region, client);
    }

    fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

pub struct ResolverBuilder {
    session: Option<Arc<dyn Session>>,
    tracker: Option<Arc<dyn StatusTracker>>,
    config: ResolverConfig,
    http: Option<Client>,
    clients: Vec<(String, Arc<dyn EcrApi>)>,
    cancel: Option<CancellationToken>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            session: None,
            tracker: None,
            config: ResolverConfig::default(),
            http: None,
            clients: Vec::new(),
            cancel: None,
        }
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn StatusTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_layer_download_parallelism(mut self, parallelism: usize) -> Self {
        self.config.layer_download_parallelism = parallelism;
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// HTTP client used for layer downloads
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Use `client` for every reference in `region` instead of asking the session
    pub fn with_client(mut self, region: impl Into<String>, client: Arc<dyn EcrApi>) -> Self {
        self.clients.push((region.into(), client));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<Resolver> {
        let http = match self.http {
            Some(http) => http,
            None => Client::builder().build()?,
        };

        let cache = ClientCache::default();
        for (region, client) in self.clients {
            cache.insert(region, client);
        }

        Ok(Resolver {
            cache,
            session: self.session,
            tracker: self
                .tracker
                .unwrap_or_else(|| Arc::new(InMemoryTracker::new())),
            config: self.config,
            http,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves references to descriptors and hands out fetchers and pushers.
///
/// Each resolver owns its own client cache, so independent resolvers never
/// share API clients.
pub struct Resolver {
    cache: ClientCache,
    session: Option<Arc<dyn Session>>,
    tracker: Arc<dyn StatusTracker>,
    config: ResolverConfig,
    http: Client,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("regions", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<dyn StatusTracker> {
        &self.tracker
    }

    /// Token whose cancellation stops every fetch and push started from this resolver
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn client_for_region(&self, region: &str) -> Result<Arc<dyn EcrApi>> {
        self.cache.get_or_create(region, self.session.as_ref())
    }

    fn base_for(&self, reference: RegistryReference) -> Result<RegistryBase> {
        let client = self.client_for_region(reference.region())?;
        Ok(RegistryBase::new(client, reference))
    }

    /// Resolve a reference to its canonical form and the descriptor of its root manifest
    pub async fn resolve(&self, reference: &str) -> Result<(String, Descriptor)> {
        let parsed = RegistryReference::parse(reference)?;
        if !parsed.has_object() {
            return Err(RegistryError::ObjectRequired);
        }

        let base = self.base_for(parsed)?;
        let accepted: Vec<String> = SUPPORTED_IMAGE_MEDIA_TYPES.iter().map(|t| t.to_string()).collect();
        let image = base
            .get_image(base.reference().image_id(), accepted.clone(), &self.cancel)
            .await
            .inspect_err(|err| warn!(reference = %reference, error = %err, "failed to look up image"))?;

        let manifest = image.image_manifest.unwrap_or_default();
        let media_type = detect_media_type(manifest.as_bytes());
        debug!(reference = %reference, media_type = %media_type, "resolved manifest media type");
        if !accepted.contains(&media_type) {
            return Err(RegistryError::FailedPrecondition(format!(
                "resolved media type {:?} not in accepted types",
                media_type
            )));
        }

        let digest = image
            .image_id
            .image_digest
            .as_deref()
            .ok_or_else(|| RegistryError::InvalidDigest("registry returned an image without a digest".to_string()))
            .and_then(Digest::parse)?;
        let desc = Descriptor {
            media_type,
            digest: Some(digest),
            size: manifest.len() as u64,
            ..Default::default()
        };

        if let Some(expected) = base.reference().digest() {
            if desc.digest.as_ref() != Some(expected) {
                return Err(RegistryError::FailedPrecondition(format!(
                    "resolved image digest mismatch: expected {}, got {}",
                    expected,
                    desc.digest_str()
                )));
            }
        }

        Ok((base.reference().canonical(), desc))
    }

    /// Fetcher bound to the repository, and tag if any, named by `reference`
    pub fn fetcher(&self, reference: &str) -> Result<Fetcher> {
        debug!(reference = %reference, "fetcher");
        let base = self.base_for(RegistryReference::parse(reference)?)?;
        Ok(Fetcher::new(
            base,
            self.http.clone(),
            self.config.layer_download_parallelism,
            self.cancel.child_token(),
        ))
    }

    /// Pusher for `reference`, which must carry both the target tag and the root digest
    pub fn pusher(&self, reference: &str) -> Result<Pusher> {
        debug!(reference = %reference, "pusher");
        let parsed = RegistryReference::parse(reference)?;

        // A pushed image always lands on a tag; the digest names its root manifest
        if parsed.tag().is_none() && parsed.digest().is_some() {
            return Err(RegistryError::InvalidReference(
                "cannot push by digest, a tag is required".to_string(),
            ));
        }
        if parsed.digest().is_none() {
            return Err(RegistryError::InvalidReference(
                "root descriptor missing from push reference".to_string(),
            ));
        }

        let base = self.base_for(parsed)?;
        Ok(Pusher::new(base, Arc::clone(&self.tracker), self.cancel.child_token()))
    }
}
