use anyhow::Result;

use larder_core::models::Direction;

use crate::shell::App;

use super::helpers::{format_quantity, print_ingredient_table};
use super::{finish, resolve_ingredient};

pub(crate) async fn cmd_ingredients_list(app: &App, json: bool) -> Result<()> {
    if app.ingredients.refresh().await.is_ok() {
        let items = app.ingredients.snapshot();
        if json {
            println!("{}", serde_json::to_string_pretty(&items)?);
        } else if items.is_empty() {
            println!("No ingredients yet. Add one with: larder ingredients add <name>");
        } else {
            print_ingredient_table(&items);
        }
    }
    finish(app, json);
    Ok(())
}

pub(crate) async fn cmd_ingredients_add(
    app: &App,
    name: &str,
    unit: Option<&str>,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    if let Ok(ing) = app.ingredients.add(name, unit, category).await {
        if json {
            println!("{}", serde_json::to_string_pretty(&ing)?);
        } else {
            let qty = format_quantity(ing.quantity);
            println!("{}: {qty} {}", ing.name, ing.unit);
        }
    }
    finish(app, json);
    Ok(())
}

pub(crate) async fn cmd_ingredients_adjust(
    app: &App,
    key: &str,
    direction: Direction,
    json: bool,
) -> Result<()> {
    let target = resolve_ingredient(app, key, json).await;
    if let Ok(ing) = app.ingredients.adjust_quantity(&target.id, direction).await {
        if json {
            println!("{}", serde_json::to_string_pretty(&ing)?);
        } else {
            let qty = format_quantity(ing.quantity);
            println!("{}: {qty} {}", ing.name, ing.unit);
        }
    }
    finish(app, json);
    Ok(())
}

pub(crate) async fn cmd_ingredients_remove(app: &App, key: &str, json: bool) -> Result<()> {
    let target = resolve_ingredient(app, key, json).await;
    if app.ingredients.remove(&target.id).await.is_ok() {
        if json {
            println!("{}", serde_json::json!({ "removed": target.id }));
        } else {
            println!("Removed {}", target.name);
        }
    }
    finish(app, json);
    Ok(())
}
