use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::images::ImageStore;
use larder_core::models::{IngredientInput, NewRecipe, RecipeDetail};
use larder_core::normalize::{RecipePayload, format_amount};
use larder_core::service::{LarderService, run_after_commit};

use super::helpers::{amount, parse_ingredient_arg, truncate, upload_image_file};

pub(crate) struct RecipeArgs {
    pub title: String,
    pub servings: i64,
    pub description: String,
    pub notes: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub image: Option<PathBuf>,
}

pub(crate) fn cmd_recipe_create(
    service: &LarderService,
    images: &dyn ImageStore,
    user_id: i64,
    args: RecipeArgs,
    json: bool,
) -> Result<()> {
    let ingredients = args
        .ingredients
        .iter()
        .map(|s| parse_ingredient_arg(s))
        .collect::<Result<Vec<_>>>()?;
    let image = args
        .image
        .as_deref()
        .map(|path| upload_image_file(images, path))
        .transpose()?;

    let recipe = NewRecipe {
        user_id,
        title: args.title.trim().to_string(),
        description: args.description.trim().to_string(),
        servings: args.servings,
        notes: args.notes.filter(|n| !n.trim().is_empty()),
        image,
        ingredients,
        steps: args.steps,
    };
    let detail = match service.create_recipe(&recipe) {
        Ok(detail) => detail,
        Err(e) => {
            if let Some(image) = &recipe.image {
                service.discard_unreferenced_image(images, image);
            }
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let id = detail.recipe.id;
        println!(
            "Created recipe: {} (id: {id}, {} ingredients, {} steps)",
            detail.recipe.title,
            detail.ingredients.len(),
            detail.steps.len()
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_update(
    service: &LarderService,
    images: &dyn ImageStore,
    user_id: i64,
    id: i64,
    file: &Path,
    image: Option<&Path>,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let payload: RecipePayload = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse recipe JSON: {}", file.display()))?;
    let mut update = payload.decode()?.into_update(user_id);
    let uploaded = image
        .map(|path| upload_image_file(images, path))
        .transpose()?;
    if uploaded.is_some() {
        update.image.clone_from(&uploaded);
    }

    let committed = match service.update_recipe(id, &update) {
        Ok(committed) => committed,
        Err(e) => {
            if let Some(image) = &uploaded {
                service.discard_unreferenced_image(images, image);
            }
            return Err(e.into());
        }
    };
    run_after_commit(committed.after_commit, images);

    let detail = committed.value;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        println!(
            "Updated recipe: {} ({} ingredients, {} steps)",
            detail.recipe.title,
            detail.ingredients.len(),
            detail.steps.len()
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    let detail = service.get_recipe(user_id, id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }
    print_recipe(&detail);
    Ok(())
}

fn print_recipe(detail: &RecipeDetail) {
    let recipe = &detail.recipe;
    println!("=== {} ===", recipe.title);
    if !recipe.description.is_empty() {
        println!("  {}", recipe.description);
    }
    print!("  Serves {}", recipe.servings);
    if let Some(image) = &recipe.image {
        print!("  |  Image: {image}");
    }
    println!("\n");

    println!("  INGREDIENTS:");
    for ing in &detail.ingredients {
        let qty = amount(&ing.quantity, &ing.unit);
        if qty.is_empty() {
            println!("    [{}] {}", ing.id, ing.ingredient);
        } else {
            println!("    [{}] {qty} {}", ing.id, ing.ingredient);
        }
    }

    println!("\n  STEPS:");
    for step in &detail.steps {
        println!("    {}. {}", step.step_number, step.description);
    }

    if let Some(notes) = &recipe.notes {
        println!("\n  NOTES:");
        println!("    {notes}");
    }
}

pub(crate) fn cmd_recipe_list(
    service: &LarderService,
    user_id: i64,
    limit: i64,
    offset: i64,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Serves")]
        servings: i64,
        #[tabled(rename = "Updated")]
        updated: String,
    }

    let recipes = service.list_recipes(user_id, limit, offset)?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            title: truncate(&r.title, 40),
            servings: r.servings,
            updated: r.updated_at.chars().take(10).collect(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_recipe_delete(
    service: &LarderService,
    images: &dyn ImageStore,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    let committed = service.delete_recipe(user_id, id)?;
    run_after_commit(committed.after_commit, images);
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted recipe {id}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_import(
    service: &LarderService,
    user_id: i64,
    file: &Path,
    title_override: Option<String>,
    servings_override: Option<i64>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let title = title_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe title. Use --title to specify one")?;

    let servings = servings_override
        .or_else(|| {
            recipe_data
                .metadata
                .servings()
                .and_then(|s| s.as_number().map(i64::from))
        })
        .unwrap_or(1);

    let converter = cooklang::Converter::default();
    let ingredients: Vec<IngredientInput> = recipe_data
        .group_ingredients(&converter)
        .iter()
        .map(cooklang_ingredient)
        .collect();
    if ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let (steps, notes) = cooklang_steps(&recipe_data);
    if steps.is_empty() {
        bail!("No steps found in recipe");
    }

    let detail = service.create_recipe(&NewRecipe {
        user_id,
        title,
        description: String::new(),
        servings,
        notes: (!notes.is_empty()).then(|| notes.join("\n")),
        image: None,
        ingredients,
        steps,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        println!(
            "Imported recipe: {} (id: {}, {} ingredients, {} steps, serves {})",
            detail.recipe.title,
            detail.recipe.id,
            detail.ingredients.len(),
            detail.steps.len(),
            detail.recipe.servings
        );
    }

    Ok(())
}

fn cooklang_ingredient(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> IngredientInput {
    let (quantity, unit) = gi
        .quantity
        .iter()
        .next()
        .map_or((String::new(), String::new()), |qty: &cooklang::Quantity| {
            let value = match qty.value() {
                cooklang::Value::Number(n) => format_amount(n.value()),
                cooklang::Value::Range { start, end, .. } => {
                    format!("{}-{}", format_amount(start.value()), format_amount(end.value()))
                }
                cooklang::Value::Text(t) => t.clone(),
            };
            (value, qty.unit().unwrap_or_default().to_string())
        });

    IngredientInput::new(&gi.ingredient.display_name(), &quantity, &unit)
}

/// Flatten every section's steps into plain text, in order. Text blocks
/// between steps are returned separately as notes.
fn cooklang_steps(recipe: &cooklang::Recipe) -> (Vec<String>, Vec<String>) {
    let mut steps = Vec::new();
    let mut notes = Vec::new();

    for section in &recipe.sections {
        for content in &section.content {
            match content {
                cooklang::Content::Step(step) => {
                    let mut text = String::new();
                    for item in &step.items {
                        match item {
                            cooklang::Item::Text { value } => text.push_str(value),
                            cooklang::Item::Ingredient { index } => {
                                if let Some(ing) = recipe.ingredients.get(*index) {
                                    text.push_str(&ing.display_name());
                                }
                            }
                            cooklang::Item::Cookware { index } => {
                                if let Some(cw) = recipe.cookware.get(*index) {
                                    text.push_str(&cw.name);
                                }
                            }
                            _ => {}
                        }
                    }
                    let text = text.trim();
                    if !text.is_empty() {
                        steps.push(text.to_string());
                    }
                }
                cooklang::Content::Text(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        notes.push(text.to_string());
                    }
                }
            }
        }
    }

    (steps, notes)
}
