use anyhow::{Context, Result};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::spoonacular::SpoonacularClient;
use larder_core::models::NewSavedRecipe;
use larder_core::service::LarderService;

use super::helpers::{json_error, truncate};

/// Look the recipe up on Spoonacular so the bookmark carries its title,
/// link, and image.
pub(crate) async fn cmd_saved_add(
    service: &LarderService,
    recipes: &SpoonacularClient,
    user_id: i64,
    external_id: i64,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let info = recipes
        .information_async(external_id)
        .await?
        .with_context(|| format!("Spoonacular has no recipe {external_id}"))?;

    let saved = service.save_recipe(&NewSavedRecipe {
        user_id,
        external_id,
        link: info.source_url.unwrap_or_default(),
        title: info.title.unwrap_or_default().trim().to_string(),
        image_url: info.image.unwrap_or_default(),
        notes: notes.filter(|n| !n.trim().is_empty()),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Saved {} (id: {})", saved.title, saved.id);
    }
    Ok(())
}

pub(crate) fn cmd_saved_list(
    service: &LarderService,
    user_id: i64,
    limit: i64,
    offset: i64,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct SavedRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Spoonacular")]
        external_id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let saved = service.list_saved(user_id, limit, offset)?;
    if saved.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No saved recipes");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
        return Ok(());
    }

    let rows: Vec<SavedRow> = saved
        .iter()
        .map(|s| SavedRow {
            id: s.id,
            external_id: s.external_id,
            title: truncate(&s.title, 40),
            notes: s
                .notes
                .as_deref()
                .map(|n| truncate(n, 30))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_saved_notes(
    service: &LarderService,
    user_id: i64,
    id: i64,
    notes: Option<&str>,
    json: bool,
) -> Result<()> {
    let saved = service.update_saved_notes(user_id, id, notes)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else if saved.notes.is_some() {
        println!("Updated notes on {}", saved.title);
    } else {
        println!("Cleared notes on {}", saved.title);
    }
    Ok(())
}

pub(crate) fn cmd_saved_remove(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    match service.delete_saved(user_id, id) {
        Ok(()) => {
            if json {
                println!("{}", serde_json::json!({ "removed": id }));
            } else {
                println!("Removed saved recipe {id}");
            }
            Ok(())
        }
        Err(larder_core::error::Error::NotFound(msg)) => {
            if json {
                println!("{}", json_error(&msg));
            } else {
                eprintln!("{msg}");
            }
            process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
