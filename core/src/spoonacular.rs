use serde::Deserialize;

use crate::models::{CanonicalIngredient, ExternalRecipeSummary};
use crate::normalize::{ExternalIngredient, from_external};

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default, rename = "totalResults")]
    pub total_results: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub id: i64,
    pub title: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecipeInformation {
    pub id: i64,
    pub title: Option<String>,
    pub image: Option<String>,
    #[serde(rename = "sourceUrl")]
    pub source_url: Option<String>,
    pub servings: Option<i64>,
    #[serde(default, rename = "extendedIngredients")]
    pub extended_ingredients: Vec<ExternalIngredient>,
}

/// Canonical ingredients of a recipe, numbered from 1 in API order.
#[must_use]
pub fn ingredients_from_information(info: &RecipeInformation) -> Vec<CanonicalIngredient> {
    from_external(&info.extended_ingredients)
}

#[must_use]
pub fn summary_from_result(r: SearchResult) -> Option<ExternalRecipeSummary> {
    let title = r.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    Some(ExternalRecipeSummary {
        external_id: r.id,
        title,
        image_url: r.image.unwrap_or_default(),
    })
}

#[must_use]
pub fn summaries(resp: SearchResponse) -> Vec<ExternalRecipeSummary> {
    resp.results
        .into_iter()
        .filter_map(summary_from_result)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summaries_skip_untitled() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{
                "results": [
                    {"id": 716429, "title": "Pasta with Garlic", "image": "https://img.spoonacular.com/716429.jpg", "imageType": "jpg"},
                    {"id": 1, "title": "  "},
                    {"id": 2, "title": "Plain Rice"}
                ],
                "offset": 0,
                "number": 10,
                "totalResults": 3
            }"#,
        )
        .unwrap();
        assert_eq!(resp.total_results, 3);
        let list = summaries(resp);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].external_id, 716_429);
        assert_eq!(list[0].image_url, "https://img.spoonacular.com/716429.jpg");
        assert_eq!(list[1].title, "Plain Rice");
        assert_eq!(list[1].image_url, "");
    }

    #[test]
    fn test_information_to_canonical() {
        let info: RecipeInformation = serde_json::from_str(
            r#"{
                "id": 716429,
                "title": "Pasta with Garlic",
                "sourceUrl": "https://example.com/pasta",
                "servings": 2,
                "extendedIngredients": [
                    {"id": 1001, "original": "1 tbsp butter", "amount": 1.0, "unit": "tbsp", "name": "butter"},
                    {"id": 1102, "original": "2 cloves garlic", "amount": 2, "unit": "cloves", "name": "garlic"}
                ]
            }"#,
        )
        .unwrap();
        let canon = ingredients_from_information(&info);
        assert_eq!(canon.len(), 2);
        assert_eq!(canon[0].id, 1);
        assert_eq!(canon[1].id, 2);
        assert_eq!(canon[1].ingredient, "garlic");
        assert_eq!(canon[1].unit, "cloves");
        assert_eq!(canon[1].quantity, "2");
        assert_eq!(info.source_url.as_deref(), Some("https://example.com/pasta"));
    }

    #[test]
    fn test_information_without_ingredients() {
        let info: RecipeInformation =
            serde_json::from_str(r#"{"id": 5, "title": "Water"}"#).unwrap();
        assert!(ingredients_from_information(&info).is_empty());
    }
}
