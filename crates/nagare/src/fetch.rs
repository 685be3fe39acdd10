use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::{header::ACCEPT, Client};

use crate::{
    error::{NagareError, NagareResult},
    locator::FragmentLocator,
};

/// Resolves a locator to the fragment body.
///
/// Implementations must not retry, the controller owns the retry policy.
pub trait FragmentFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        locator: &FragmentLocator,
    ) -> impl Future<Output = NagareResult<Bytes>> + Send;
}

impl<F> FragmentFetcher for Arc<F>
where
    F: FragmentFetcher,
{
    fn fetch(
        &self,
        locator: &FragmentLocator,
    ) -> impl Future<Output = NagareResult<Bytes>> + Send {
        self.as_ref().fetch(locator)
    }
}

#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> NagareResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client))
    }
}

impl FragmentFetcher for HttpFetcher {
    fn fetch(
        &self,
        locator: &FragmentLocator,
    ) -> impl Future<Output = NagareResult<Bytes>> + Send {
        let request = self
            .client
            .get(locator.url().clone())
            .header(ACCEPT, "video/mp4, */*");
        async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                if let Ok(body) = response.text().await {
                    tracing::warn!("Error body: {body}");
                }
                return Err(NagareError::HttpError(status));
            }

            let bytes = response.bytes().await?;
            Ok(bytes)
        }
    }
}
