use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    GenerateRequest, GenerateResponse, Ingredient, IngredientPatch, NewIngredient, NewRecipe,
    Recipe,
};

pub const INGREDIENTS_TABLE: &str = "ingredients";
pub const RECIPES_TABLE: &str = "recipes";
pub const RECIPES_BUCKET: &str = "recipes";
pub const GENERATE_FUNCTION: &str = "generate-recipe";

/// The remote `ingredients` table.
///
/// The CLI implements this over the Supabase REST API, tests and offline mode
/// with [`crate::local::LocalBackend`].
#[async_trait]
pub trait IngredientTable: Send + Sync {
    /// All rows, ordered by name.
    async fn list_ingredients(&self) -> Result<Vec<Ingredient>>;
    /// Case-insensitive exact match on `name`.
    async fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>>;
    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient>;
    async fn update_ingredient(&self, id: &str, patch: &IngredientPatch) -> Result<Ingredient>;
    async fn delete_ingredient(&self, id: &str) -> Result<()>;
}

/// The remote `recipes` table.
#[async_trait]
pub trait RecipeTable: Send + Sync {
    /// All rows, newest first.
    async fn list_recipes(&self) -> Result<Vec<Recipe>>;
    async fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe>;
}

/// Remote object storage, addressed by bucket and path.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<()>;
    async fn remove_object(&self, bucket: &str, path: &str) -> Result<()>;
}

/// The remote `generate-recipe` function.
#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    async fn generate_recipe(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}

/// Everything the views need from the backend-as-a-service.
pub trait Backend: IngredientTable + RecipeTable + ObjectStorage + RecipeGenerator {}

impl<T> Backend for T where T: IngredientTable + RecipeTable + ObjectStorage + RecipeGenerator {}
