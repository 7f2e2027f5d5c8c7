use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::normalize::lenient_string;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// A freshly created account together with the code that verifies it.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub user: User,
    pub verification_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub servings: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ingredient {
    pub id: i64,
    pub recipe_id: i64,
    pub user_id: i64,
    pub ingredient: String,
    pub quantity: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub id: i64,
    pub recipe_id: i64,
    pub step_number: i64,
    pub description: String,
}

/// Recipe header plus its children, as read back from one consistent snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
}

/// One incoming ingredient row. Rows carrying an `id` update an existing
/// ingredient; rows without one are inserted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngredientInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub ingredient: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: String,
}

impl IngredientInput {
    #[must_use]
    pub fn new(ingredient: &str, quantity: &str, unit: &str) -> Self {
        Self {
            id: None,
            ingredient: ingredient.to_string(),
            quantity: quantity.to_string(),
            unit: unit.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub servings: i64,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub ingredients: Vec<IngredientInput>,
    pub steps: Vec<String>,
}

/// Full-replace edit of a recipe. `image: None` keeps the current image.
#[derive(Debug, Clone)]
pub struct RecipeUpdate {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub servings: i64,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub ingredients: Vec<IngredientInput>,
    pub steps: Vec<String>,
}

/// Uniform ingredient record used for display and grocery lists, whatever
/// the origin (persisted row or external API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalIngredient {
    pub id: i64,
    pub ingredient: String,
    pub quantity: String,
    pub unit: String,
    #[serde(default, alias = "isCustom")]
    pub is_custom: bool,
}

impl From<&Ingredient> for CanonicalIngredient {
    fn from(ing: &Ingredient) -> Self {
        Self {
            id: ing.id,
            ingredient: ing.ingredient.clone(),
            quantity: ing.quantity.clone(),
            unit: ing.unit.clone(),
            is_custom: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedRecipe {
    pub id: i64,
    pub user_id: i64,
    pub external_id: i64,
    pub link: String,
    pub title: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub saved_at: String,
}

#[derive(Debug, Clone)]
pub struct NewSavedRecipe {
    pub user_id: i64,
    pub external_id: i64,
    pub link: String,
    pub title: String,
    pub image_url: String,
    pub notes: Option<String>,
}

/// Result row of an external recipe search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRecipeSummary {
    pub external_id: i64,
    pub title: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

pub const MAX_SERVINGS: i64 = 1000;
pub const MAX_PAGE_SIZE: i64 = 100;

pub fn validate_recipe_header(title: &str, servings: i64) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    if servings <= 0 {
        bail!("servings must be a positive integer");
    }
    if servings > MAX_SERVINGS {
        bail!("servings must be at most {MAX_SERVINGS}");
    }
    Ok(())
}

/// Every ingredient needs a name; quantity and unit may be blank.
pub fn validate_ingredients(ingredients: &[IngredientInput]) -> Result<()> {
    if ingredients.is_empty() {
        bail!("at least one ingredient is required");
    }
    if let Some(pos) = ingredients
        .iter()
        .position(|i| i.ingredient.trim().is_empty())
    {
        bail!("ingredient {} has no name", pos + 1);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        bail!("Invalid email address '{email}'");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        bail!("Invalid email address '{email}'");
    }
    Ok(())
}

/// Accepts E.164-style numbers: optional leading `+`, then 7-15 digits.
pub fn validate_phone(phone: &str) -> Result<()> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!("Invalid phone number '{phone}'. Use international format, e.g. +15551234567");
    }
    Ok(())
}
