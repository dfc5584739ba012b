mod chat;
pub(crate) mod helpers;
mod ingredients;
mod recipes;

use std::process;

use larder_core::models::Ingredient;

use crate::shell::App;

use helpers::{json_error, report_toasts};

pub(crate) use chat::cmd_chat;
pub(crate) use ingredients::{
    cmd_ingredients_adjust, cmd_ingredients_add, cmd_ingredients_list, cmd_ingredients_remove,
};
pub(crate) use recipes::{cmd_recipes_list, cmd_recipes_upload};

/// Print leftover notifications and exit non-zero if one of them was an error.
pub(super) fn finish(app: &App, json: bool) {
    if report_toasts(&app.toaster, json) {
        process::exit(1);
    }
}

/// Refresh the pantry and look an ingredient up by id or name. Exits with
/// status 2 when nothing matches.
pub(super) async fn resolve_ingredient(app: &App, key: &str, json: bool) -> Ingredient {
    if app.ingredients.refresh().await.is_err() {
        finish(app, json);
    }
    if let Some(found) = app.ingredients.find(key) {
        return found;
    }
    let message = format!("No ingredient matches '{key}'");
    if json {
        eprintln!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}
