mod grocery;
mod helpers;
mod recipe;
mod saved;
mod search;
mod user;

use anyhow::{Result, bail};

pub(crate) use grocery::{GroceryOptions, GrocerySource, cmd_grocery};
pub(crate) use recipe::{
    RecipeArgs, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_import, cmd_recipe_list,
    cmd_recipe_show, cmd_recipe_update,
};
pub(crate) use saved::{cmd_saved_add, cmd_saved_list, cmd_saved_notes, cmd_saved_remove};
pub(crate) use search::cmd_search;
pub(crate) use user::{cmd_user_add, cmd_user_show, cmd_user_verify};

pub(crate) fn require_user(user: Option<i64>) -> Result<i64> {
    match user {
        Some(id) => Ok(id),
        None => bail!("No user selected. Pass --user <ID> or set LARDER_USER"),
    }
}

