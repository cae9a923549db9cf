use std::{net::IpAddr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use shared::{domain::VisitorId, protocol::IpLookupResponse};
use url::Url;

use crate::error::EngagementError;

pub const DEFAULT_LOOKUP_URL: &str = "https://api.ipify.org?format=json";

/// Source of the visitor's public network address.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn lookup_public_address(&self) -> Result<String>;
}

/// Asks an HTTP service answering `GET` with `{ "ip": "<address>" }`.
pub struct HttpAddressLookup {
    http: Client,
    url: Url,
}

impl HttpAddressLookup {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(http: Client, url: &str) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid lookup url '{url}'"))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl AddressLookup for HttpAddressLookup {
    async fn lookup_public_address(&self) -> Result<String> {
        let body = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let response: IpLookupResponse = serde_json::from_slice(&body)
            .context("address lookup returned an unexpected body")?;

        let address = response.ip.trim();
        address
            .parse::<IpAddr>()
            .map_err(|_| anyhow!("address lookup returned malformed ip '{address}'"))?;
        Ok(address.to_string())
    }
}

/// Fixed address, for simulations and tests.
pub struct StaticAddressLookup(pub String);

#[async_trait]
impl AddressLookup for StaticAddressLookup {
    async fn lookup_public_address(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// One-way SHA-256 of the address, lowercase hex.
pub fn hash_address(address: &str) -> VisitorId {
    VisitorId(hex::encode(Sha256::digest(address.trim().as_bytes())))
}

#[derive(Clone)]
pub struct IdentityResolver {
    lookup: Arc<dyn AddressLookup>,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn AddressLookup>) -> Self {
        Self { lookup }
    }

    pub async fn resolve(&self) -> Result<VisitorId, EngagementError> {
        let address = self
            .lookup
            .lookup_public_address()
            .await
            .map_err(|err| EngagementError::IdentityUnavailable(format!("{err:#}")))?;
        if address.trim().is_empty() {
            return Err(EngagementError::IdentityUnavailable(
                "address lookup returned an empty address".to_string(),
            ));
        }
        Ok(hash_address(&address))
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
