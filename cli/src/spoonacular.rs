use anyhow::{Context, Result, bail};
use reqwest::StatusCode;

use larder_core::error::Error;
use larder_core::models::{CanonicalIngredient, ExternalRecipeSummary, SavedRecipe};
use larder_core::service::{clamp_page, external_base};
use larder_core::spoonacular::{RecipeInformation, SearchResponse, summaries};

const DEFAULT_BASE_URL: &str = "https://api.spoonacular.com";

/// Shared HTTP client for outbound API calls.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!(
            "larder/{} (recipe manager)",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(std::time::Duration::from_secs(10))
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

pub struct SpoonacularClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SpoonacularClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("Recipe search is not configured. Set LARDER_SPOONACULAR_KEY"),
        }
    }

    /// Search the catalogue. A blank query is a validation error; transport
    /// and API failures are upstream errors.
    pub async fn search_async(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> larder_core::error::Result<Vec<ExternalRecipeSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("search query must not be empty"));
        }
        let (limit, offset) = clamp_page(limit, offset);
        self.complex_search(query, limit, offset)
            .await
            .map_err(|e| Error::Upstream(format!("recipe search: {e:#}")))
    }

    async fn complex_search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExternalRecipeSummary>> {
        let key = self.key()?;
        let resp = self
            .client
            .get(format!("{}/recipes/complexSearch", self.base_url))
            .query(&[("query", query), ("apiKey", key)])
            .query(&[("number", limit), ("offset", offset)])
            .send()
            .await
            .context("Failed to reach Spoonacular API")?
            .error_for_status()
            .context("Spoonacular search request failed")?;

        let data: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse Spoonacular search response")?;

        tracing::debug!(query, total = data.total_results, "Spoonacular search");
        Ok(summaries(data))
    }

    pub async fn information_async(&self, external_id: i64) -> Result<Option<RecipeInformation>> {
        let key = self.key()?;
        let resp = self
            .client
            .get(format!(
                "{}/recipes/{external_id}/information",
                self.base_url
            ))
            .query(&[("includeNutrition", "false"), ("apiKey", key)])
            .send()
            .await
            .context("Failed to reach Spoonacular API")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let info: RecipeInformation = resp
            .error_for_status()
            .context("Spoonacular recipe lookup failed")?
            .json()
            .await
            .context("Failed to parse Spoonacular recipe response")?;

        Ok(Some(info))
    }

    /// Title and live canonical ingredients of an external recipe.
    pub async fn ingredients_async(
        &self,
        external_id: i64,
    ) -> larder_core::error::Result<(String, Vec<CanonicalIngredient>)> {
        let info = self
            .information_async(external_id)
            .await
            .map_err(|e| Error::Upstream(format!("recipe lookup: {e:#}")))?;
        external_base(external_id, info.as_ref())
    }

    /// Live ingredients of a saved recipe, listed under the title it was
    /// saved with.
    pub async fn saved_ingredients_async(
        &self,
        saved: &SavedRecipe,
    ) -> larder_core::error::Result<(String, Vec<CanonicalIngredient>)> {
        let (_, base) = self.ingredients_async(saved.external_id).await?;
        Ok((saved.title.clone(), base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let client = SpoonacularClient::new(None).unwrap();
        let err = client.search_async("soup", 10, 0).await.unwrap_err();
        assert!(
            matches!(&err, Error::Upstream(detail) if detail.contains("LARDER_SPOONACULAR_KEY"))
        );
        assert!(matches!(
            client.ingredients_async(1).await,
            Err(Error::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_any_request() {
        let client = SpoonacularClient::new(Some("abc".to_string())).unwrap();
        assert!(matches!(
            client.search_async("   ", 10, 0).await,
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let client = SpoonacularClient::new(Some("  ".to_string())).unwrap();
        assert!(client.key().is_err());
        let client = SpoonacularClient::new(Some("abc".to_string())).unwrap();
        assert_eq!(client.key().unwrap(), "abc");
    }
}
