use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::backend::{IngredientTable, ObjectStorage, RecipeGenerator, RecipeTable};
use crate::db::Database;
use crate::models::{
    GenerateRequest, GenerateResponse, Ingredient, IngredientPatch, NewIngredient, NewRecipe,
    Recipe,
};

/// Backend that keeps everything in a local SQLite database.
///
/// Used when no hosted backend is configured, and as the in-process stand-in
/// for one in tests. Recipe generation returns a canned suggestion built from
/// the ingredient list.
pub struct LocalBackend {
    db: Mutex<Database>,
}

impl LocalBackend {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Direct access to the underlying database.
    pub fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IngredientTable for LocalBackend {
    async fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        self.db().list_ingredients()
    }

    async fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        self.db().find_ingredient_by_name(name)
    }

    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        self.db().insert_ingredient(ingredient)
    }

    async fn update_ingredient(&self, id: &str, patch: &IngredientPatch) -> Result<Ingredient> {
        self.db().update_ingredient(id, patch)
    }

    async fn delete_ingredient(&self, id: &str) -> Result<()> {
        if !self.db().delete_ingredient(id)? {
            bail!("Ingredient {id} not found");
        }
        Ok(())
    }
}

#[async_trait]
impl RecipeTable for LocalBackend {
    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        self.db().list_recipes()
    }

    async fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        self.db().insert_recipe(recipe)
    }
}

#[async_trait]
impl ObjectStorage for LocalBackend {
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        self.db().put_object(bucket, path, content_type, &bytes)
    }

    async fn remove_object(&self, bucket: &str, path: &str) -> Result<()> {
        let removed = self
            .db()
            .delete_object(bucket, path)
            .context("Failed to remove object")?;
        if !removed {
            bail!("Object {bucket}/{path} not found");
        }
        Ok(())
    }
}

#[async_trait]
impl RecipeGenerator for LocalBackend {
    async fn generate_recipe(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: canned_suggestion(&request.ingredients),
        })
    }
}

/// Offline stand-in for the recipe function: a fixed suggestion that names
/// the pantry contents.
#[must_use]
pub fn canned_suggestion(ingredients: &[String]) -> String {
    if ingredients.is_empty() {
        return "Your pantry is empty. Add a few ingredients and I'll suggest something to cook."
            .to_string();
    }

    let has = |wanted: &str| ingredients.iter().any(|i| i.eq_ignore_ascii_case(wanted));
    let dish = if has("flour") && (has("eggs") || has("egg")) {
        "a homemade pasta"
    } else if has("rice") {
        "a vegetable fried rice"
    } else {
        "a simple skillet dish"
    };

    let listed = ingredients
        .iter()
        .map(|i| i.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Based on your ingredients, I recommend trying {dish}! You have: {listed}. Would you like the recipe?"
    )
}
