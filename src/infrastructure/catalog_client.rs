use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::domain::{CatalogClient, CatalogError};
use crate::models::CatalogRecord;

const USER_AGENT: &str = concat!("bookcache/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed client for the catalog REST surface (`{base}/Books`).
pub struct HttpCatalogClient {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::Network(format!("Invalid catalog URL: {}", e)))?;

        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Network(format!("Failed to build client: {}", e)))?;

        Ok(Self { base_url, http })
    }

    fn books_url(&self) -> Result<Url, CatalogError> {
        self.base_url
            .join("Books")
            .map_err(|e| CatalogError::Network(e.to_string()))
    }

    fn book_url(&self, id: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(&format!("Books/{}", urlencoding::encode(id)))
            .map_err(|e| CatalogError::Network(e.to_string()))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CatalogError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound);
        }
        if !status.is_success() {
            tracing::warn!("Catalog returned status: {}", status);
            return Err(CatalogError::Server(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn search(&self, title: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
        let mut url = self.books_url()?;
        url.set_query(Some(&format!("title={}", urlencoding::encode(title))));

        match self.send_json(self.http.get(url)).await {
            // Filtered list endpoints answer 404 when nothing matches
            Err(CatalogError::NotFound) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn get_recommended(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let url = self.books_url()?;
        self.send_json(self.http.get(url)).await
    }

    async fn get_by_id(&self, id: &str) -> Result<CatalogRecord, CatalogError> {
        let url = self.book_url(id)?;
        self.send_json(self.http.get(url)).await
    }

    async fn create(&self, record: &CatalogRecord) -> Result<CatalogRecord, CatalogError> {
        let url = self.books_url()?;
        self.send_json(self.http.post(url).json(record)).await
    }

    async fn update(
        &self,
        id: &str,
        record: &CatalogRecord,
    ) -> Result<CatalogRecord, CatalogError> {
        let url = self.book_url(id)?;
        self.send_json(self.http.put(url).json(record)).await
    }

    async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let url = self.book_url(id)?;
        let response = self.http.delete(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound);
        }
        if !status.is_success() {
            tracing::warn!("Catalog delete returned status: {}", status);
            return Err(CatalogError::Server(status.as_u16()));
        }
        Ok(())
    }
}
