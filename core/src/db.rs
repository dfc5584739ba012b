use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::models::{Ingredient, IngredientPatch, NewIngredient, NewRecipe, Recipe};

/// SQLite mirror of the hosted tables and storage bucket.
pub struct Database {
    conn: Connection,
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
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
                    quantity REAL NOT NULL DEFAULT 0 CHECK (quantity >= 0),
                    unit TEXT NOT NULL,
                    category TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    instructions TEXT,
                    file_path TEXT,
                    file_type TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS storage_objects (
                    bucket TEXT NOT NULL,
                    path TEXT NOT NULL,
                    content_type TEXT NOT NULL,
                    content BLOB NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (bucket, path)
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);
                CREATE INDEX IF NOT EXISTS idx_recipes_created_at ON recipes(created_at);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Ingredients ---

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get("id")?,
            name: row.get("name")?,
            quantity: row.get("quantity")?,
            unit: row.get("unit")?,
            category: row.get("category")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM ingredients ORDER BY name COLLATE NOCASE, name, rowid")?;
        let ingredients = stmt
            .query_map([], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn get_ingredient(&self, id: &str) -> Result<Ingredient> {
        self.conn
            .query_row(
                "SELECT * FROM ingredients WHERE id = ?1",
                params![id],
                Self::ingredient_from_row,
            )
            .with_context(|| format!("Ingredient {id} not found"))
    }

    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        // NOCASE only folds ASCII, so compare in Rust
        let wanted = name.trim().to_lowercase();
        Ok(self
            .list_ingredients()?
            .into_iter()
            .find(|i| i.name.to_lowercase() == wanted))
    }

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let id = Uuid::new_v4().to_string();
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingredients (id, name, quantity, unit, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    ingredient.name,
                    ingredient.quantity,
                    ingredient.unit,
                    ingredient.category,
                    now,
                ],
            )
            .context("Failed to insert ingredient")?;
        self.get_ingredient(&id)
    }

    pub fn update_ingredient(&self, id: &str, patch: &IngredientPatch) -> Result<Ingredient> {
        // Verify existence
        self.get_ingredient(id)?;

        if let Some(quantity) = patch.quantity {
            self.conn
                .execute(
                    "UPDATE ingredients SET quantity = ?1 WHERE id = ?2",
                    params![quantity, id],
                )
                .context("Failed to update ingredient quantity")?;
        }
        if let Some(ref unit) = patch.unit {
            self.conn.execute(
                "UPDATE ingredients SET unit = ?1 WHERE id = ?2",
                params![unit, id],
            )?;
        }
        if let Some(ref category) = patch.category {
            self.conn.execute(
                "UPDATE ingredients SET category = ?1 WHERE id = ?2",
                params![category, id],
            )?;
        }

        self.get_ingredient(id)
    }

    pub fn delete_ingredient(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            instructions: row.get("instructions")?,
            file_path: row.get("file_path")?,
            file_type: row.get("file_type")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM recipes ORDER BY created_at DESC, rowid DESC")?;
        let recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let id = Uuid::new_v4().to_string();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (id, title, file_path, file_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, recipe.title, recipe.file_path, recipe.file_type, now],
        )?;
        self.conn
            .query_row(
                "SELECT * FROM recipes WHERE id = ?1",
                params![id],
                Self::recipe_from_row,
            )
            .context("Recipe not found")
    }

    // --- Storage ---

    /// Store an object. Existing paths are rejected, like a storage upload
    /// without upsert.
    pub fn put_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO storage_objects (bucket, path, content_type, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![bucket, path, content_type, content, now],
            )
            .with_context(|| format!("Failed to store object {bucket}/{path}"))?;
        Ok(())
    }

    pub fn get_object(&self, bucket: &str, path: &str) -> Result<Option<(String, Vec<u8>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT content_type, content FROM storage_objects WHERE bucket = ?1 AND path = ?2",
        )?;
        let mut rows = stmt.query(params![bucket, path])?;
        if let Some(row) = rows.next()? {
            Ok(Some((row.get(0)?, row.get(1)?)))
        } else {
            Ok(None)
        }
    }

    pub fn delete_object(&self, bucket: &str, path: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM storage_objects WHERE bucket = ?1 AND path = ?2",
            params![bucket, path],
        )?;
        Ok(rows > 0)
    }

    pub fn count_objects(&self, bucket: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM storage_objects WHERE bucket = ?1",
            params![bucket],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
