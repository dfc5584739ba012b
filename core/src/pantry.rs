use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::Backend;
use crate::models::{
    DEFAULT_UNIT, Direction, Ingredient, IngredientPatch, NewIngredient, Toast, non_blank,
    validate_ingredient_name,
};
use crate::toast::Toaster;

/// View state for the pantry panel.
///
/// Holds a read-through cache of the `ingredients` table. The cache only
/// changes after the backend confirms a fetch or mutation; failures leave it
/// as it was and surface as a toast.
pub struct IngredientStore {
    backend: Arc<dyn Backend>,
    toaster: Toaster,
    items: Mutex<Vec<Ingredient>>,
}

impl IngredientStore {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, toaster: Toaster) -> Self {
        Self {
            backend,
            toaster,
            items: Mutex::new(Vec::new()),
        }
    }

    fn items(&self) -> MutexGuard<'_, Vec<Ingredient>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Ingredient> {
        self.items().clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.items().iter().map(|i| i.name.clone()).collect()
    }

    /// Look up a cached ingredient by id, or by name ignoring case.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<Ingredient> {
        let items = self.items();
        let wanted = key.trim().to_lowercase();
        items
            .iter()
            .find(|i| i.id == key)
            .or_else(|| items.iter().find(|i| i.name.to_lowercase() == wanted))
            .cloned()
    }

    /// Reload every row from the backend.
    ///
    /// Every operation below raises a notification on failure and returns it
    /// as the error, so callers can report that exact failure.
    pub async fn refresh(&self) -> Result<(), Toast> {
        match self.backend.list_ingredients().await {
            Ok(rows) => {
                tracing::debug!(count = rows.len(), "ingredients refreshed");
                *self.items() = rows;
                Ok(())
            }
            Err(e) => Err(self.toaster.failure("Error fetching ingredients", &e)),
        }
    }

    /// Add an ingredient, or bump the quantity of an existing one with the
    /// same name (ignoring case).
    pub async fn add(
        &self,
        name: &str,
        unit: Option<&str>,
        category: Option<&str>,
    ) -> Result<Ingredient, Toast> {
        let name = validate_ingredient_name(name)
            .map_err(|e| self.toaster.error("Invalid ingredient", e.to_string()))?;
        let unit = non_blank(unit);
        let category = non_blank(category);

        let result: anyhow::Result<Ingredient> = async {
            match self.backend.find_ingredient_by_name(&name).await? {
                Some(existing) => {
                    let patch = IngredientPatch {
                        quantity: Some(Direction::Increment.apply(existing.quantity)),
                        unit,
                        category,
                    };
                    self.backend.update_ingredient(&existing.id, &patch).await
                }
                None => {
                    let new = NewIngredient {
                        name: name.clone(),
                        quantity: 1.0,
                        unit: unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
                        category,
                    };
                    self.backend.insert_ingredient(&new).await
                }
            }
        }
        .await;

        let saved = result.map_err(|e| self.toaster.failure("Error adding ingredient", &e))?;
        self.toaster
            .success("Ingredient added", format!("{} has been added", saved.name));
        // The write went through; a failed reload only leaves the list stale.
        let _ = self.refresh().await;
        Ok(saved)
    }

    /// Step an ingredient's quantity up or down by one, clamped at zero.
    pub async fn adjust_quantity(
        &self,
        id: &str,
        direction: Direction,
    ) -> Result<Ingredient, Toast> {
        let Some(current) = self.items().iter().find(|i| i.id == id).cloned() else {
            return Err(self
                .toaster
                .error("Error updating quantity", format!("Ingredient {id} not found")));
        };

        let quantity = direction.apply(current.quantity);
        let saved = self
            .backend
            .update_ingredient(id, &IngredientPatch::quantity(quantity))
            .await
            .map_err(|e| self.toaster.failure("Error updating quantity", &e))?;

        let mut items = self.items();
        if let Some(slot) = items.iter_mut().find(|i| i.id == saved.id) {
            *slot = saved.clone();
        }
        drop(items);
        self.toaster.success(
            "Quantity updated",
            format!("{}: {} {}", saved.name, saved.quantity, saved.unit),
        );
        Ok(saved)
    }

    /// Delete an ingredient, then drop it from the cache.
    pub async fn remove(&self, id: &str) -> Result<(), Toast> {
        self.backend
            .delete_ingredient(id)
            .await
            .map_err(|e| self.toaster.failure("Error removing ingredient", &e))?;

        let removed = {
            let mut items = self.items();
            let pos = items.iter().position(|i| i.id == id);
            pos.map(|p| items.remove(p))
        };
        let name = removed.map_or_else(|| id.to_string(), |i| i.name);
        self.toaster
            .success("Ingredient removed", format!("{name} has been removed"));
        Ok(())
    }
}
