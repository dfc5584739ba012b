use std::path::Path;

use anyhow::Result;

use crate::recipe_file::read_upload;
use crate::shell::App;

use super::finish;
use super::helpers::print_recipe_table;

pub(crate) async fn cmd_recipes_list(app: &App, json: bool) -> Result<()> {
    if let Ok(recipes) = app.chat.recipes().await {
        if json {
            println!("{}", serde_json::to_string_pretty(&recipes)?);
        } else if recipes.is_empty() {
            println!("No recipes uploaded yet. Upload one with: larder recipes upload <file>");
        } else {
            print_recipe_table(&recipes);
        }
    }
    finish(app, json);
    Ok(())
}

pub(crate) async fn cmd_recipes_upload(
    app: &App,
    file: &Path,
    title: Option<String>,
    json: bool,
) -> Result<()> {
    let upload = read_upload(file, title)?;
    if let Ok(recipe) = app.chat.upload_recipe(upload).await {
        if json {
            println!("{}", serde_json::to_string_pretty(&recipe)?);
        } else {
            let path = recipe.file_path.as_deref().unwrap_or("-");
            println!("Uploaded recipe: {} (stored as {path})", recipe.title);
        }
    }
    finish(app, json);
    Ok(())
}
