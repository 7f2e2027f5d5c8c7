use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Error;
use crate::models::{
    Ingredient, IngredientInput, NewRecipe, NewSavedRecipe, NewUser, Recipe, RecipeDetail,
    RecipeUpdate, SavedRecipe, Step, User,
};
use crate::sync::{number_steps, reconcile};

pub struct Database {
    conn: Connection,
}

/// Committed state of an updated recipe, plus the image it dropped if no
/// recipe references that image any more.
#[derive(Debug, Clone)]
pub struct UpdatedRecipe {
    pub detail: RecipeDetail,
    pub replaced_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeletedRecipe {
    pub recipe: Recipe,
    pub orphaned_image: Option<String>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL COLLATE NOCASE UNIQUE,
                    phone TEXT,
                    verified INTEGER NOT NULL DEFAULT 0,
                    verification_code TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
                    description TEXT NOT NULL DEFAULT '',
                    servings INTEGER NOT NULL CHECK (servings > 0),
                    notes TEXT,
                    image TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL,
                    ingredient TEXT NOT NULL CHECK (length(trim(ingredient)) > 0),
                    quantity TEXT NOT NULL DEFAULT '',
                    unit TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS steps (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    step_number INTEGER NOT NULL CHECK (step_number > 0),
                    description TEXT NOT NULL CHECK (length(trim(description)) > 0),
                    UNIQUE (recipe_id, step_number)
                );

                CREATE TABLE IF NOT EXISTS saved_recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    external_id INTEGER NOT NULL,
                    link TEXT NOT NULL DEFAULT '',
                    title TEXT NOT NULL,
                    image_url TEXT NOT NULL DEFAULT '',
                    notes TEXT,
                    saved_at TEXT NOT NULL,
                    UNIQUE (user_id, external_id)
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_user ON recipes(user_id);
                CREATE INDEX IF NOT EXISTS idx_ingredients_recipe ON ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_steps_recipe ON steps(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_saved_recipes_user ON saved_recipes(user_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            verified: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            servings: row.get(4)?,
            notes: row.get(5)?,
            image: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn saved_from_row(row: &rusqlite::Row) -> rusqlite::Result<SavedRecipe> {
        Ok(SavedRecipe {
            id: row.get(0)?,
            user_id: row.get(1)?,
            external_id: row.get(2)?,
            link: row.get(3)?,
            title: row.get(4)?,
            image_url: row.get(5)?,
            notes: row.get(6)?,
            saved_at: row.get(7)?,
        })
    }

    // --- Users ---

    pub fn insert_user(&self, user: &NewUser, verification_code: &str) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (name, email, phone, verified, verification_code, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5)",
            params![user.name, user.email, user.phone, verification_code, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email, phone, verified, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email, phone, verified, created_at FROM users WHERE email = ?1",
                params![email],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Pending verification code; `None` once the account is verified.
    pub fn get_verification_code(&self, user_id: i64) -> Result<Option<String>> {
        let code: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT verification_code FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(code.flatten())
    }

    pub fn mark_verified(&self, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET verified = 1, verification_code = NULL WHERE id = ?1",
            params![user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    /// Insert a recipe with its ingredients and steps in one transaction and
    /// return the committed state.
    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<RecipeDetail> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO recipes (user_id, title, description, servings, notes, image, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                recipe.user_id,
                recipe.title,
                recipe.description,
                recipe.servings,
                recipe.notes,
                recipe.image,
                now,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for ing in &recipe.ingredients {
            Self::insert_ingredient(&tx, id, recipe.user_id, ing)?;
        }
        Self::replace_steps(&tx, id, &recipe.steps)?;

        let detail =
            Self::load_detail(&tx, recipe.user_id, id)?.context("Recipe not found after insert")?;
        tx.commit()?;
        Ok(detail)
    }

    /// Apply a full edit: header fields replaced, ingredients reconciled by
    /// id, steps deleted and reinserted. Returns `None` if the recipe does not
    /// exist for this owner. Nothing is written unless every step succeeds.
    pub fn update_recipe(&self, id: i64, update: &RecipeUpdate) -> Result<Option<UpdatedRecipe>> {
        let tx = self.conn.unchecked_transaction()?;

        let Some(current) = Self::load_header(&tx, update.user_id, id)? else {
            return Ok(None);
        };

        let existing_ids = Self::ingredient_ids(&tx, id)?;
        let plan = reconcile(&existing_ids, &update.ingredients);
        if !plan.is_applicable() {
            let ids: Vec<String> = plan.unknown_ids.iter().map(ToString::to_string).collect();
            return Err(Error::validation(format!(
                "ingredient id(s) {} do not belong to recipe {id}",
                ids.join(", ")
            ))
            .into());
        }

        let image = update.image.clone().or_else(|| current.image.clone());

        let now = Local::now().to_rfc3339();
        tx.execute(
            "UPDATE recipes SET title = ?1, description = ?2, servings = ?3, notes = ?4,
             image = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                update.title,
                update.description,
                update.servings,
                update.notes,
                image,
                now,
                id
            ],
        )?;

        for ing_id in &plan.to_delete {
            tx.execute(
                "DELETE FROM ingredients WHERE id = ?1 AND recipe_id = ?2",
                params![ing_id, id],
            )?;
        }
        for (ing_id, ing) in &plan.to_update {
            tx.execute(
                "UPDATE ingredients SET ingredient = ?1, quantity = ?2, unit = ?3
                 WHERE id = ?4 AND recipe_id = ?5",
                params![ing.ingredient, ing.quantity, ing.unit, ing_id, id],
            )?;
        }
        for ing in &plan.to_insert {
            Self::insert_ingredient(&tx, id, update.user_id, ing)?;
        }
        Self::replace_steps(&tx, id, &update.steps)?;

        // Identical uploads share a file, so only report images nothing else uses
        let replaced_image = match (&update.image, current.image) {
            (Some(new), Some(old)) if *new != old && !Self::image_in_use(&tx, &old)? => Some(old),
            _ => None,
        };

        let detail =
            Self::load_detail(&tx, update.user_id, id)?.context("Recipe vanished during update")?;
        tx.commit()?;

        Ok(Some(UpdatedRecipe {
            detail,
            replaced_image,
        }))
    }

    /// Delete steps, ingredients, then the recipe row. Returns the deleted
    /// header, or `None` if there was nothing to delete.
    pub fn delete_recipe(&self, user_id: i64, id: i64) -> Result<Option<DeletedRecipe>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(recipe) = Self::load_header(&tx, user_id, id)? else {
            return Ok(None);
        };
        tx.execute("DELETE FROM steps WHERE recipe_id = ?1", params![id])?;
        tx.execute("DELETE FROM ingredients WHERE recipe_id = ?1", params![id])?;
        tx.execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        let orphaned_image = match &recipe.image {
            Some(image) if !Self::image_in_use(&tx, image)? => Some(image.clone()),
            _ => None,
        };
        tx.commit()?;
        Ok(Some(DeletedRecipe {
            recipe,
            orphaned_image,
        }))
    }

    pub fn get_recipe(&self, user_id: i64, id: i64) -> Result<Option<RecipeDetail>> {
        Self::load_detail(&self.conn, user_id, id)
    }

    pub fn get_recipe_header(&self, user_id: i64, id: i64) -> Result<Option<Recipe>> {
        Self::load_header(&self.conn, user_id, id)
    }

    pub fn list_recipes(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, description, servings, notes, image, created_at, updated_at
             FROM recipes WHERE user_id = ?1
             ORDER BY updated_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let recipes = stmt
            .query_map(params![user_id, limit, offset], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn get_ingredients(&self, recipe_id: i64) -> Result<Vec<Ingredient>> {
        Self::load_ingredients(&self.conn, recipe_id)
    }

    // --- Recipe helpers usable inside a transaction ---

    fn load_header(conn: &Connection, user_id: i64, id: i64) -> Result<Option<Recipe>> {
        let recipe = conn
            .query_row(
                "SELECT id, user_id, title, description, servings, notes, image, created_at, updated_at
                 FROM recipes WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    fn load_detail(conn: &Connection, user_id: i64, id: i64) -> Result<Option<RecipeDetail>> {
        let Some(recipe) = Self::load_header(conn, user_id, id)? else {
            return Ok(None);
        };
        let ingredients = Self::load_ingredients(conn, id)?;
        let steps = Self::load_steps(conn, id)?;
        Ok(Some(RecipeDetail {
            recipe,
            ingredients,
            steps,
        }))
    }

    fn load_ingredients(conn: &Connection, recipe_id: i64) -> Result<Vec<Ingredient>> {
        let mut stmt = conn.prepare(
            "SELECT id, recipe_id, user_id, ingredient, quantity, unit
             FROM ingredients WHERE recipe_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![recipe_id], |row| {
                Ok(Ingredient {
                    id: row.get(0)?,
                    recipe_id: row.get(1)?,
                    user_id: row.get(2)?,
                    ingredient: row.get(3)?,
                    quantity: row.get(4)?,
                    unit: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn load_steps(conn: &Connection, recipe_id: i64) -> Result<Vec<Step>> {
        let mut stmt = conn.prepare(
            "SELECT id, recipe_id, step_number, description
             FROM steps WHERE recipe_id = ?1 ORDER BY step_number",
        )?;
        let rows = stmt
            .query_map(params![recipe_id], |row| {
                Ok(Step {
                    id: row.get(0)?,
                    recipe_id: row.get(1)?,
                    step_number: row.get(2)?,
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether any recipe still references `image`.
    pub fn is_image_referenced(&self, image: &str) -> Result<bool> {
        Self::image_in_use(&self.conn, image)
    }

    fn image_in_use(conn: &Connection, image: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM recipes WHERE image = ?1",
            params![image],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn ingredient_ids(conn: &Connection, recipe_id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare("SELECT id FROM ingredients WHERE recipe_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![recipe_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn insert_ingredient(
        conn: &Connection,
        recipe_id: i64,
        user_id: i64,
        ing: &IngredientInput,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO ingredients (recipe_id, user_id, ingredient, quantity, unit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![recipe_id, user_id, ing.ingredient, ing.quantity, ing.unit],
        )
        .with_context(|| format!("failed to insert ingredient '{}'", ing.ingredient))?;
        Ok(())
    }

    fn replace_steps(conn: &Connection, recipe_id: i64, descriptions: &[String]) -> Result<()> {
        conn.execute("DELETE FROM steps WHERE recipe_id = ?1", params![recipe_id])?;
        for step in number_steps(descriptions) {
            conn.execute(
                "INSERT INTO steps (recipe_id, step_number, description) VALUES (?1, ?2, ?3)",
                params![recipe_id, step.step_number, step.description],
            )
            .with_context(|| format!("failed to insert step {}", step.step_number))?;
        }
        Ok(())
    }

    // --- Saved recipes ---

    pub fn insert_saved(&self, saved: &NewSavedRecipe) -> Result<SavedRecipe> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO saved_recipes (user_id, external_id, link, title, image_url, notes, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                saved.user_id,
                saved.external_id,
                saved.link,
                saved.title,
                saved.image_url,
                saved.notes,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_saved(saved.user_id, id)?
            .context("Saved recipe not found after insert")
    }

    pub fn get_saved(&self, user_id: i64, id: i64) -> Result<Option<SavedRecipe>> {
        let saved = self
            .conn
            .query_row(
                "SELECT id, user_id, external_id, link, title, image_url, notes, saved_at
                 FROM saved_recipes WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::saved_from_row,
            )
            .optional()?;
        Ok(saved)
    }

    pub fn find_saved_by_external(
        &self,
        user_id: i64,
        external_id: i64,
    ) -> Result<Option<SavedRecipe>> {
        let saved = self
            .conn
            .query_row(
                "SELECT id, user_id, external_id, link, title, image_url, notes, saved_at
                 FROM saved_recipes WHERE user_id = ?1 AND external_id = ?2",
                params![user_id, external_id],
                Self::saved_from_row,
            )
            .optional()?;
        Ok(saved)
    }

    pub fn list_saved(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<SavedRecipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, external_id, link, title, image_url, notes, saved_at
             FROM saved_recipes WHERE user_id = ?1
             ORDER BY saved_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let saved = stmt
            .query_map(params![user_id, limit, offset], Self::saved_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(saved)
    }

    pub fn update_saved_notes(
        &self,
        user_id: i64,
        id: i64,
        notes: Option<&str>,
    ) -> Result<Option<SavedRecipe>> {
        let rows = self.conn.execute(
            "UPDATE saved_recipes SET notes = ?1 WHERE id = ?2 AND user_id = ?3",
            params![notes, id, user_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_saved(user_id, id)
    }

    pub fn delete_saved(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM saved_recipes WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .insert_user(
                &NewUser {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    phone: Some("+15551234567".to_string()),
                },
                "123456",
            )
            .unwrap();
        (db, user)
    }

    fn sample_recipe(user_id: i64) -> NewRecipe {
        NewRecipe {
            user_id,
            title: "Cake".to_string(),
            description: "Simple sponge".to_string(),
            servings: 8,
            notes: None,
            image: Some("old.png".to_string()),
            ingredients: vec![IngredientInput::new("Flour", "2", "cups")],
            steps: vec!["Mix".to_string(), "Bake".to_string()],
        }
    }

    fn update_from(detail: &RecipeDetail) -> RecipeUpdate {
        RecipeUpdate {
            user_id: detail.recipe.user_id,
            title: detail.recipe.title.clone(),
            description: detail.recipe.description.clone(),
            servings: detail.recipe.servings,
            notes: detail.recipe.notes.clone(),
            image: None,
            ingredients: detail
                .ingredients
                .iter()
                .map(|i| IngredientInput {
                    id: Some(i.id),
                    ingredient: i.ingredient.clone(),
                    quantity: i.quantity.clone(),
                    unit: i.unit.clone(),
                })
                .collect(),
            steps: detail.steps.iter().map(|s| s.description.clone()).collect(),
        }
    }

    #[test]
    fn test_insert_and_get_user() {
        let (db, user) = setup();
        assert_eq!(user.name, "Ada");
        assert!(!user.verified);
        assert_eq!(
            db.get_verification_code(user.id).unwrap().as_deref(),
            Some("123456")
        );

        let by_email = db.get_user_by_email("ADA@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        assert!(db.mark_verified(user.id).unwrap());
        assert!(db.get_user(user.id).unwrap().unwrap().verified);
        assert!(db.get_verification_code(user.id).unwrap().is_none());
        assert!(db.get_user(999).unwrap().is_none());
    }

    #[test]
    fn test_insert_recipe() {
        let (db, user) = setup();
        let detail = db.insert_recipe(&sample_recipe(user.id)).unwrap();

        assert_eq!(detail.recipe.title, "Cake");
        assert_eq!(detail.recipe.servings, 8);
        assert_eq!(detail.ingredients.len(), 1);
        assert_eq!(detail.ingredients[0].user_id, user.id);
        assert_eq!(detail.steps.len(), 2);
        assert_eq!(detail.steps[0].step_number, 1);
        assert_eq!(detail.steps[1].description, "Bake");

        let fetched = db.get_recipe(user.id, detail.recipe.id).unwrap().unwrap();
        assert_eq!(fetched.ingredients, detail.ingredients);
    }

    #[test]
    fn test_recipe_scoped_to_owner() {
        let (db, user) = setup();
        let other = db
            .insert_user(
                &NewUser {
                    name: "Bob".to_string(),
                    email: "bob@example.com".to_string(),
                    phone: None,
                },
                "000000",
            )
            .unwrap();
        let detail = db.insert_recipe(&sample_recipe(user.id)).unwrap();
        assert!(db.get_recipe(other.id, detail.recipe.id).unwrap().is_none());
        assert!(db.delete_recipe(other.id, detail.recipe.id).unwrap().is_none());
        let mut update = update_from(&detail);
        update.user_id = other.id;
        assert!(db.update_recipe(detail.recipe.id, &update).unwrap().is_none());
    }

    #[test]
    fn test_update_recipe_end_to_end() {
        let (db, user) = setup();
        let created = db.insert_recipe(&sample_recipe(user.id)).unwrap();
        let flour_id = created.ingredients[0].id;

        let mut update = update_from(&created);
        update.ingredients = vec![
            IngredientInput {
                id: Some(flour_id),
                ..IngredientInput::new("Flour", "3", "cups")
            },
            IngredientInput::new("Sugar", "1", "cup"),
        ];
        update.steps = vec!["Bake at 350".to_string()];

        let updated = db
            .update_recipe(created.recipe.id, &update)
            .unwrap()
            .unwrap();
        let detail = updated.detail;

        assert_eq!(detail.ingredients.len(), 2);
        let flour = detail.ingredients.iter().find(|i| i.id == flour_id).unwrap();
        assert_eq!(flour.quantity, "3");
        let sugar = detail
            .ingredients
            .iter()
            .find(|i| i.ingredient == "Sugar")
            .unwrap();
        assert_ne!(sugar.id, flour_id);
        assert_eq!(sugar.quantity, "1");
        assert_eq!(detail.steps.len(), 1);
        assert_eq!(detail.steps[0].step_number, 1);
        assert_eq!(detail.steps[0].description, "Bake at 350");
        assert!(updated.replaced_image.is_none());
        assert_eq!(detail.recipe.image.as_deref(), Some("old.png"));
    }

    #[test]
    fn test_update_recipe_deletes_missing_ingredients() {
        let (db, user) = setup();
        let mut new = sample_recipe(user.id);
        new.ingredients.push(IngredientInput::new("Eggs", "2", ""));
        let created = db.insert_recipe(&new).unwrap();

        let mut update = update_from(&created);
        update.ingredients.truncate(1);
        let updated = db
            .update_recipe(created.recipe.id, &update)
            .unwrap()
            .unwrap();
        assert_eq!(updated.detail.ingredients.len(), 1);
        assert_eq!(updated.detail.ingredients[0].ingredient, "Flour");
    }

    #[test]
    fn test_step_replacement_is_idempotent() {
        let (db, user) = setup();
        let created = db.insert_recipe(&sample_recipe(user.id)).unwrap();
        let mut update = update_from(&created);
        update.steps = vec!["Whisk".to_string(), "Fold".to_string(), "Bake".to_string()];

        let first = db
            .update_recipe(created.recipe.id, &update)
            .unwrap()
            .unwrap();
        let second = db
            .update_recipe(created.recipe.id, &update)
            .unwrap()
            .unwrap();
        let numbers = |d: &RecipeDetail| -> Vec<(i64, String)> {
            d.steps
                .iter()
                .map(|s| (s.step_number, s.description.clone()))
                .collect()
        };
        assert_eq!(numbers(&first.detail), numbers(&second.detail));
        assert_eq!(
            numbers(&second.detail)
                .iter()
                .map(|(n, _)| *n)
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_update_reports_replaced_image() {
        let (db, user) = setup();
        let created = db.insert_recipe(&sample_recipe(user.id)).unwrap();
        let mut update = update_from(&created);
        update.image = Some("new.png".to_string());
        let updated = db
            .update_recipe(created.recipe.id, &update)
            .unwrap()
            .unwrap();
        assert_eq!(updated.replaced_image.as_deref(), Some("old.png"));
        assert_eq!(updated.detail.recipe.image.as_deref(), Some("new.png"));

        // Re-submitting the same image replaces nothing
        let again = db
            .update_recipe(created.recipe.id, &update)
            .unwrap()
            .unwrap();
        assert!(again.replaced_image.is_none());
    }

    #[test]
    fn test_shared_image_is_never_reported_for_cleanup() {
        let (db, user) = setup();
        let first = db.insert_recipe(&sample_recipe(user.id)).unwrap();
        let second = db.insert_recipe(&sample_recipe(user.id)).unwrap();

        let mut update = update_from(&first);
        update.image = Some("new.png".to_string());
        let updated = db.update_recipe(first.recipe.id, &update).unwrap().unwrap();
        assert!(updated.replaced_image.is_none());

        let deleted = db.delete_recipe(user.id, second.recipe.id).unwrap().unwrap();
        assert_eq!(deleted.orphaned_image.as_deref(), Some("old.png"));
    }

    #[test]
    fn test_update_rejects_foreign_ingredient_id() {
        let (db, user) = setup();
        let first = db.insert_recipe(&sample_recipe(user.id)).unwrap();
        let second = db.insert_recipe(&sample_recipe(user.id)).unwrap();

        let mut update = update_from(&second);
        update.title = "Hijack".to_string();
        update.ingredients = vec![IngredientInput {
            id: Some(first.ingredients[0].id),
            ..IngredientInput::new("Stolen", "1", "")
        }];
        let err = db.update_recipe(second.recipe.id, &update).unwrap_err();
        assert!(matches!(Error::from(err), Error::Validation(_)));

        let untouched = db.get_recipe(user.id, first.recipe.id).unwrap().unwrap();
        assert_eq!(untouched.ingredients[0].ingredient, "Flour");
        let second_now = db.get_recipe(user.id, second.recipe.id).unwrap().unwrap();
        assert_eq!(second_now.recipe.title, "Cake");
    }

    #[test]
    fn test_failed_update_rolls_back_everything() {
        let (db, user) = setup();
        let created = db.insert_recipe(&sample_recipe(user.id)).unwrap();

        let mut update = update_from(&created);
        update.title = "Renamed".to_string();
        update.steps = vec!["Only step".to_string()];
        // Blank names violate the ingredients CHECK constraint mid-transaction
        update
            .ingredients
            .push(IngredientInput::new("   ", "1", ""));

        assert!(db.update_recipe(created.recipe.id, &update).is_err());

        let after = db.get_recipe(user.id, created.recipe.id).unwrap().unwrap();
        assert_eq!(after.recipe.title, "Cake");
        assert_eq!(after.ingredients, created.ingredients);
        assert_eq!(after.steps, created.steps);
    }

    #[test]
    fn test_failed_insert_leaves_no_rows() {
        let (db, user) = setup();
        let mut new = sample_recipe(user.id);
        new.steps.push("   ".to_string());
        assert!(db.insert_recipe(&new).is_err());
        assert!(db.list_recipes(user.id, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_delete_recipe_removes_children() {
        let (db, user) = setup();
        let created = db.insert_recipe(&sample_recipe(user.id)).unwrap();
        let deleted = db.delete_recipe(user.id, created.recipe.id).unwrap().unwrap();
        assert_eq!(deleted.recipe.image.as_deref(), Some("old.png"));
        assert_eq!(deleted.orphaned_image.as_deref(), Some("old.png"));
        assert!(db.get_recipe(user.id, created.recipe.id).unwrap().is_none());
        assert!(db.get_ingredients(created.recipe.id).unwrap().is_empty());
        assert!(db.delete_recipe(user.id, created.recipe.id).unwrap().is_none());
    }

    #[test]
    fn test_list_recipes_paginates() {
        let (db, user) = setup();
        for _ in 0..5 {
            db.insert_recipe(&sample_recipe(user.id)).unwrap();
        }
        assert_eq!(db.list_recipes(user.id, 3, 0).unwrap().len(), 3);
        assert_eq!(db.list_recipes(user.id, 3, 3).unwrap().len(), 2);
        assert!(db.list_recipes(user.id, 3, 6).unwrap().is_empty());
    }

    #[test]
    fn test_saved_recipes_crud() {
        let (db, user) = setup();
        let saved = db
            .insert_saved(&NewSavedRecipe {
                user_id: user.id,
                external_id: 716_429,
                link: "https://example.com/pasta".to_string(),
                title: "Pasta".to_string(),
                image_url: "https://img.example.com/716429.jpg".to_string(),
                notes: None,
            })
            .unwrap();
        assert_eq!(saved.external_id, 716_429);
        assert!(
            db.find_saved_by_external(user.id, 716_429)
                .unwrap()
                .is_some()
        );

        let updated = db
            .update_saved_notes(user.id, saved.id, Some("double the garlic"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("double the garlic"));
        assert_eq!(db.list_saved(user.id, 10, 0).unwrap().len(), 1);

        assert!(db.delete_saved(user.id, saved.id).unwrap());
        assert!(!db.delete_saved(user.id, saved.id).unwrap());
        assert!(db.update_saved_notes(user.id, saved.id, None).unwrap().is_none());
    }
}
