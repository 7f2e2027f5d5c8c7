use std::path::Path;

use rand::Rng;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::grocery::{ListLine, OutboundMessage, compose_message};
use crate::images::{ImageStore, extension_for};
use crate::models::{
    CanonicalIngredient, Channel, MAX_PAGE_SIZE, NewRecipe,
    NewSavedRecipe, NewUser, RecipeDetail, RecipeUpdate, SavedRecipe, SignUp, User,
    validate_email, validate_ingredients, validate_phone, validate_recipe_header,
};
use crate::normalize::from_persisted;
use crate::spoonacular::{RecipeInformation, ingredients_from_information};

/// Side effect to run only after the owning transaction has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterCommit {
    DeleteImage(String),
}

/// A committed result plus the deferred work it scheduled.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub after_commit: Vec<AfterCommit>,
}

impl<T> Committed<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            after_commit: Vec::new(),
        }
    }

    fn with_image_cleanup(mut self, image: Option<String>) -> Self {
        if let Some(reference) = image {
            self.after_commit.push(AfterCommit::DeleteImage(reference));
        }
        self
    }
}

/// Run deferred tasks. Failures are logged and never reach the caller; the
/// data change they belong to has already committed.
pub fn run_after_commit(tasks: Vec<AfterCommit>, images: &dyn ImageStore) {
    for task in tasks {
        match task {
            AfterCommit::DeleteImage(reference) => {
                if let Err(e) = images.delete(&reference) {
                    tracing::warn!(image = %reference, error = %e, "Failed to delete replaced image");
                } else {
                    tracing::debug!(image = %reference, "Deleted replaced image");
                }
            }
        }
    }
}

/// Validate and store an uploaded image, returning its reference.
pub fn store_image(images: &dyn ImageStore, bytes: &[u8], content_type: &str) -> Result<String> {
    if bytes.is_empty() {
        return Err(Error::validation("image upload is empty"));
    }
    if extension_for(content_type).is_none() {
        return Err(Error::validation(format!(
            "unsupported image type '{content_type}'"
        )));
    }
    images
        .put(bytes, content_type)
        .map_err(|e| Error::Upstream(format!("image storage: {e:#}")))
}

/// A composed grocery message and where to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub to: String,
    pub message: OutboundMessage,
}

pub struct LarderService {
    db: Database,
}

impl LarderService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Users ---

    pub fn sign_up(&self, user: &NewUser) -> Result<SignUp> {
        let user = NewUser {
            name: user.name.trim().to_string(),
            email: user.email.trim().to_string(),
            phone: user
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        };
        if user.name.is_empty() {
            return Err(Error::validation("name must not be empty"));
        }
        validate_email(&user.email).map_err(|e| Error::validation(e.to_string()))?;
        if let Some(phone) = &user.phone {
            validate_phone(phone).map_err(|e| Error::validation(e.to_string()))?;
        }
        if self.db.get_user_by_email(&user.email)?.is_some() {
            return Err(Error::validation(format!(
                "an account already exists for {}",
                user.email
            )));
        }

        let code = format!("{:06}", rand::rng().random_range(0..1_000_000));
        let created = self.db.insert_user(&user, &code)?;
        tracing::info!(user_id = created.id, "Created account");
        Ok(SignUp {
            user: created,
            verification_code: code,
        })
    }

    /// Confirm an account with the code it was issued. Verifying an already
    /// verified account is a no-op.
    pub fn verify_user(&self, user_id: i64, code: &str) -> Result<User> {
        let user = self.get_user(user_id)?;
        if user.verified {
            return Ok(user);
        }
        let expected = self.db.get_verification_code(user_id)?;
        if expected.as_deref() != Some(code.trim()) {
            return Err(Error::validation("verification code does not match"));
        }
        self.db.mark_verified(user_id)?;
        tracing::info!(user_id, "Verified account");
        self.get_user(user_id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<User> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| Error::not_found(format!("user {user_id} not found")))
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<RecipeDetail> {
        check_recipe_fields(&recipe.title, recipe.servings, &recipe.ingredients, &recipe.steps)?;
        self.get_user(recipe.user_id)?;
        let detail = self.db.insert_recipe(recipe)?;
        tracing::info!(
            recipe_id = detail.recipe.id,
            user_id = recipe.user_id,
            ingredients = detail.ingredients.len(),
            steps = detail.steps.len(),
            "Created recipe"
        );
        Ok(detail)
    }

    /// Replace a recipe's header, ingredients, and steps atomically. A
    /// replaced image is scheduled for deletion after commit.
    pub fn update_recipe(
        &self,
        recipe_id: i64,
        update: &RecipeUpdate,
    ) -> Result<Committed<RecipeDetail>> {
        check_recipe_fields(&update.title, update.servings, &update.ingredients, &update.steps)?;
        let updated = self
            .db
            .update_recipe(recipe_id, update)?
            .ok_or_else(|| recipe_not_found(recipe_id))?;
        tracing::info!(recipe_id, user_id = update.user_id, "Updated recipe");
        Ok(Committed::new(updated.detail).with_image_cleanup(updated.replaced_image))
    }

    pub fn delete_recipe(&self, user_id: i64, recipe_id: i64) -> Result<Committed<()>> {
        let deleted = self
            .db
            .delete_recipe(user_id, recipe_id)?
            .ok_or_else(|| recipe_not_found(recipe_id))?;
        tracing::info!(recipe_id, user_id, "Deleted recipe");
        Ok(Committed::new(()).with_image_cleanup(deleted.orphaned_image))
    }

    /// Remove an image stored for a write that then failed, unless some
    /// recipe already references the same file.
    pub fn discard_unreferenced_image(&self, images: &dyn ImageStore, reference: &str) {
        match self.db.is_image_referenced(reference) {
            Ok(true) => {}
            Ok(false) => {
                run_after_commit(vec![AfterCommit::DeleteImage(reference.to_string())], images);
            }
            Err(e) => {
                tracing::warn!(image = %reference, error = %e, "Failed to check image references");
            }
        }
    }

    pub fn get_recipe(&self, user_id: i64, recipe_id: i64) -> Result<RecipeDetail> {
        self.db
            .get_recipe(user_id, recipe_id)?
            .ok_or_else(|| recipe_not_found(recipe_id))
    }

    pub fn list_recipes(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<crate::models::Recipe>> {
        let (limit, offset) = clamp_page(limit, offset);
        Ok(self.db.list_recipes(user_id, limit, offset)?)
    }

    /// Canonical ingredient list of a stored recipe, the base of its grocery list.
    pub fn recipe_grocery_base(
        &self,
        user_id: i64,
        recipe_id: i64,
    ) -> Result<(String, Vec<CanonicalIngredient>)> {
        let recipe = self
            .db
            .get_recipe_header(user_id, recipe_id)?
            .ok_or_else(|| recipe_not_found(recipe_id))?;
        let ingredients = self.db.get_ingredients(recipe_id)?;
        Ok((recipe.title, from_persisted(&ingredients)))
    }

    // --- Saved recipes ---

    pub fn save_recipe(&self, saved: &NewSavedRecipe) -> Result<SavedRecipe> {
        if saved.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }
        self.get_user(saved.user_id)?;
        if self
            .db
            .find_saved_by_external(saved.user_id, saved.external_id)?
            .is_some()
        {
            return Err(Error::validation(format!(
                "recipe {} is already saved",
                saved.external_id
            )));
        }
        Ok(self.db.insert_saved(saved)?)
    }

    pub fn get_saved(&self, user_id: i64, id: i64) -> Result<SavedRecipe> {
        self.db
            .get_saved(user_id, id)?
            .ok_or_else(|| saved_not_found(id))
    }

    pub fn list_saved(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<SavedRecipe>> {
        let (limit, offset) = clamp_page(limit, offset);
        Ok(self.db.list_saved(user_id, limit, offset)?)
    }

    pub fn update_saved_notes(
        &self,
        user_id: i64,
        id: i64,
        notes: Option<&str>,
    ) -> Result<SavedRecipe> {
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        self.db
            .update_saved_notes(user_id, id, notes)?
            .ok_or_else(|| saved_not_found(id))
    }

    pub fn delete_saved(&self, user_id: i64, id: i64) -> Result<()> {
        if self.db.delete_saved(user_id, id)? {
            Ok(())
        } else {
            Err(saved_not_found(id))
        }
    }

    // --- Grocery delivery ---

    /// Resolve the destination and compose the message for a grocery list.
    ///
    /// Returns `Ok(None)` when no line has anything to send, before the
    /// account is looked at. Otherwise the account must be verified, and SMS
    /// requires a phone number on file.
    pub fn prepare_grocery_delivery(
        &self,
        user_id: i64,
        title: Option<&str>,
        lines: &[ListLine],
        channel: Channel,
    ) -> Result<Option<Delivery>> {
        let Some(message) = compose_message(title, lines) else {
            return Ok(None);
        };
        let user = self.get_user(user_id)?;
        if !user.verified {
            return Err(Error::validation(
                "verify your account before sending grocery lists",
            ));
        }
        let to = match channel {
            Channel::Email => user.email,
            Channel::Sms => user.phone.ok_or_else(|| {
                Error::validation("no phone number on file for SMS delivery")
            })?,
        };
        Ok(Some(Delivery {
            channel,
            to,
            message,
        }))
    }
}

fn check_recipe_fields(
    title: &str,
    servings: i64,
    ingredients: &[crate::models::IngredientInput],
    steps: &[String],
) -> Result<()> {
    validate_recipe_header(title, servings).map_err(|e| Error::validation(e.to_string()))?;
    validate_ingredients(ingredients).map_err(|e| Error::validation(e.to_string()))?;
    if steps.iter().all(|s| s.trim().is_empty()) {
        return Err(Error::validation("at least one step is required"));
    }
    Ok(())
}

/// Title and canonical ingredients of a fetched external recipe, or
/// [`Error::NotFound`] when there is nothing to list.
pub fn external_base(
    external_id: i64,
    info: Option<&RecipeInformation>,
) -> Result<(String, Vec<CanonicalIngredient>)> {
    let not_found = || Error::not_found(format!("no ingredients found for recipe {external_id}"));
    let info = info.ok_or_else(not_found)?;
    let ingredients = ingredients_from_information(info);
    if ingredients.is_empty() {
        return Err(not_found());
    }
    Ok((info.title.clone().unwrap_or_default(), ingredients))
}

pub fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
}

fn recipe_not_found(id: i64) -> Error {
    Error::not_found(format!("recipe {id} not found"))
}

fn saved_not_found(id: i64) -> Error {
    Error::not_found(format!("saved recipe {id} not found"))
}
