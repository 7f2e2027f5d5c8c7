//! Canonicalisation of ingredient and step payloads.
//!
//! Request bodies carry ingredient and step lists either as structured JSON
//! or as a JSON document encoded into a string field. Everything is decoded
//! once here, at the boundary, into the typed shapes the rest of the crate
//! works with.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    CanonicalIngredient, Ingredient, IngredientInput, NewRecipe, RecipeUpdate,
};

/// Deserialize a free-form text field that clients send as a string, a
/// number, or `null`. `null` becomes the empty string.
pub fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IngredientsPayload {
    List(Vec<IngredientInput>),
    Encoded(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StepInput {
    Text(String),
    Record {
        #[serde(default, alias = "stepNumber")]
        step_number: Option<i64>,
        description: String,
    },
}

impl StepInput {
    fn into_description(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Record { description, .. } => description,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StepsPayload {
    List(Vec<StepInput>),
    Encoded(String),
}

/// Decode an ingredient payload and trim every text field.
///
/// A string that does not decode into an ingredient list fails the whole
/// operation with [`Error::MalformedPayload`].
pub fn decode_ingredients(payload: IngredientsPayload) -> Result<Vec<IngredientInput>> {
    let list = match payload {
        IngredientsPayload::List(list) => list,
        IngredientsPayload::Encoded(raw) => serde_json::from_str::<Vec<IngredientInput>>(&raw)
            .map_err(|e| Error::MalformedPayload(format!("ingredients: {e}")))?,
    };
    Ok(list
        .into_iter()
        .map(|i| IngredientInput {
            id: i.id,
            ingredient: i.ingredient.trim().to_string(),
            quantity: i.quantity.trim().to_string(),
            unit: i.unit.trim().to_string(),
        })
        .collect())
}

/// Decode a step payload into trimmed, non-blank descriptions in the order given.
///
/// Incoming step numbers are ignored; steps are renumbered on write.
pub fn decode_steps(payload: StepsPayload) -> Result<Vec<String>> {
    let list = match payload {
        StepsPayload::List(list) => list,
        StepsPayload::Encoded(raw) => serde_json::from_str::<Vec<StepInput>>(&raw)
            .map_err(|e| Error::MalformedPayload(format!("steps: {e}")))?,
    };
    Ok(normalize_steps(list))
}

#[must_use]
pub fn normalize_steps(steps: Vec<StepInput>) -> Vec<String> {
    steps
        .into_iter()
        .map(StepInput::into_description)
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect()
}

/// Editable fields of a recipe as clients send them. Missing text fields
/// default to empty so validation can report them by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipePayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub servings: i64,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub ingredients: Option<IngredientsPayload>,
    pub steps: Option<StepsPayload>,
}

/// A [`RecipePayload`] with its lists decoded and its text trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecipe {
    pub title: String,
    pub description: String,
    pub servings: i64,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub ingredients: Vec<IngredientInput>,
    pub steps: Vec<String>,
}

impl RecipePayload {
    pub fn decode(self) -> Result<DecodedRecipe> {
        let ingredients = match self.ingredients {
            Some(payload) => decode_ingredients(payload)?,
            None => Vec::new(),
        };
        let steps = match self.steps {
            Some(payload) => decode_steps(payload)?,
            None => Vec::new(),
        };
        Ok(DecodedRecipe {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            servings: self.servings,
            notes: non_blank(self.notes),
            image: non_blank(self.image),
            ingredients,
            steps,
        })
    }
}

impl DecodedRecipe {
    #[must_use]
    pub fn into_new(self, user_id: i64) -> NewRecipe {
        NewRecipe {
            user_id,
            title: self.title,
            description: self.description,
            servings: self.servings,
            notes: self.notes,
            image: self.image,
            ingredients: self.ingredients,
            steps: self.steps,
        }
    }

    #[must_use]
    pub fn into_update(self, user_id: i64) -> RecipeUpdate {
        RecipeUpdate {
            user_id,
            title: self.title,
            description: self.description,
            servings: self.servings,
            notes: self.notes,
            image: self.image,
            ingredients: self.ingredients,
            steps: self.steps,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Ingredient object as returned by the external recipe API.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalIngredient {
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Map external ingredients onto the canonical shape with 1-based display ids.
///
/// The bare `name` carries the structured amount and unit. `original` is
/// free text that already spells out the amount, so it stands alone.
#[must_use]
pub fn from_external(items: &[ExternalIngredient]) -> Vec<CanonicalIngredient> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let id = idx as i64 + 1;
            match item.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                Some(name) => CanonicalIngredient {
                    id,
                    ingredient: name.to_string(),
                    quantity: item.amount.map(format_amount).unwrap_or_default(),
                    unit: item.unit.trim().to_string(),
                    is_custom: false,
                },
                None => CanonicalIngredient {
                    id,
                    ingredient: item.original.trim().to_string(),
                    quantity: String::new(),
                    unit: String::new(),
                    is_custom: false,
                },
            }
        })
        .collect()
}

#[must_use]
pub fn from_persisted(items: &[Ingredient]) -> Vec<CanonicalIngredient> {
    items.iter().map(CanonicalIngredient::from).collect()
}

/// Render a numeric amount for display: whole numbers without a decimal
/// point, fractions to at most two places. Zero and non-finite amounts render
/// as the empty string.
#[must_use]
pub fn format_amount(amount: f64) -> String {
    if !amount.is_finite() || amount <= 0.0 {
        return String::new();
    }
    if amount.fract() == 0.0 {
        return format!("{amount:.0}");
    }
    let fixed = format!("{amount:.2}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_structured_ingredients() {
        let payload: IngredientsPayload = serde_json::from_str(
            r#"[{"ingredient":" Flour ","quantity":"2","unit":"cups"},{"id":4,"ingredient":"Salt"}]"#,
        )
        .unwrap();
        let list = decode_ingredients(payload).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], IngredientInput::new("Flour", "2", "cups"));
        assert_eq!(list[1].id, Some(4));
        assert_eq!(list[1].unit, "");
    }

    #[test]
    fn test_decode_encoded_ingredients() {
        let payload: IngredientsPayload = serde_json::from_value(Value::String(
            r#"[{"ingredient":"Milk","quantity":"1 1/2","unit":"cups"}]"#.to_string(),
        ))
        .unwrap();
        let list = decode_ingredients(payload).unwrap();
        assert_eq!(list, vec![IngredientInput::new("Milk", "1 1/2", "cups")]);
    }

    #[test]
    fn test_decode_malformed_ingredients() {
        let payload = IngredientsPayload::Encoded("[{\"ingredient\":".to_string());
        let err = decode_ingredients(payload).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn test_blank_steps_dropped() {
        let payload: StepsPayload = serde_json::from_str(r#"["", "  ", "Mix well"]"#).unwrap();
        assert_eq!(decode_steps(payload).unwrap(), vec!["Mix well".to_string()]);
    }

    #[test]
    fn test_steps_accept_records_and_encoded_strings() {
        let payload: StepsPayload = serde_json::from_value(Value::String(
            r#"[{"stepNumber":2,"description":"Bake "},"Cool"]"#.to_string(),
        ))
        .unwrap();
        assert_eq!(
            decode_steps(payload).unwrap(),
            vec!["Bake".to_string(), "Cool".to_string()]
        );

        let bad = StepsPayload::Encoded("not json".to_string());
        assert!(matches!(decode_steps(bad), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_empty_step_list_is_accepted_by_decoder() {
        let payload: StepsPayload = serde_json::from_str("[]").unwrap();
        assert!(decode_steps(payload).unwrap().is_empty());
    }

    #[test]
    fn test_from_external() {
        let items: Vec<ExternalIngredient> = serde_json::from_str(
            r#"[
                {"original":"2 cups flour","amount":2.0,"unit":"cups","name":"flour"},
                {"original":"","amount":0.5,"unit":null,"name":"salt"},
                {"original":"pepper to taste","amount":1.0,"unit":"pinch"}
            ]"#,
        )
        .unwrap();
        let canon = from_external(&items);
        assert_eq!(canon.len(), 3);
        assert_eq!(canon[0].id, 1);
        assert_eq!(canon[0].ingredient, "flour");
        assert_eq!(canon[0].quantity, "2");
        assert_eq!(canon[0].unit, "cups");
        assert!(!canon[0].is_custom);
        assert_eq!(canon[1].id, 2);
        assert_eq!(canon[1].ingredient, "salt");
        assert_eq!(canon[1].quantity, "0.5");
        assert_eq!(canon[1].unit, "");
        assert_eq!(canon[2].ingredient, "pepper to taste");
        assert_eq!(canon[2].quantity, "");
        assert_eq!(canon[2].unit, "");
    }

    #[test]
    fn test_external_ingredients_compose_amount_once() {
        use crate::grocery::{ListLine, build_list, compose_message};
        use std::collections::HashMap;

        let items: Vec<ExternalIngredient> = serde_json::from_str(
            r#"[
                {"original":"2 cups flour","amount":2.0,"unit":"cups","name":"flour"},
                {"original":"a handful of basil","amount":1.0,"unit":"handful"}
            ]"#,
        )
        .unwrap();
        let list = build_list(&from_external(&items), &HashMap::new(), &[]);
        let lines: Vec<ListLine> = list.needed.iter().map(ListLine::from).collect();
        let message = compose_message(None, &lines).unwrap();
        assert!(message.text.contains("- 2 cups flour\n"));
        assert!(message.text.contains("- a handful of basil\n"));
        assert!(!message.text.contains("2 cups 2 cups"));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(3.0), "3");
        assert_eq!(format_amount(0.25), "0.25");
        assert_eq!(format_amount(1.0 / 3.0), "0.33");
        assert_eq!(format_amount(0.0), "");
        assert_eq!(format_amount(f64::NAN), "");
    }

    #[test]
    fn test_recipe_payload_accepts_detail_json() {
        // The shape `recipe show --json` prints, edited and sent back
        let payload: RecipePayload = serde_json::from_str(
            r#"{
                "id": 3, "user_id": 1, "title": " Cake ", "description": "",
                "servings": 8, "notes": "  ",
                "ingredients": [{"id": 5, "recipe_id": 3, "user_id": 1, "ingredient": "Flour", "quantity": "2", "unit": "cups"}],
                "steps": [{"id": 9, "recipe_id": 3, "step_number": 1, "description": "Mix"}]
            }"#,
        )
        .unwrap();
        let decoded = payload.decode().unwrap();
        assert_eq!(decoded.title, "Cake");
        assert_eq!(decoded.notes, None);
        assert_eq!(decoded.ingredients[0].id, Some(5));
        assert_eq!(decoded.steps, vec!["Mix".to_string()]);

        let update = decoded.into_update(1);
        assert_eq!(update.servings, 8);
        assert!(update.image.is_none());
    }

    #[test]
    fn test_recipe_payload_missing_lists_decode_empty() {
        let decoded = RecipePayload::default().decode().unwrap();
        assert!(decoded.ingredients.is_empty());
        assert!(decoded.steps.is_empty());
        assert_eq!(decoded.servings, 0);
    }
}
