//! Backend wrapper with switchable failures, for view tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::backend::{IngredientTable, ObjectStorage, RecipeGenerator, RecipeTable};
use crate::local::LocalBackend;
use crate::models::{
    GenerateRequest, GenerateResponse, Ingredient, IngredientPatch, NewIngredient, NewRecipe,
    Recipe,
};

pub struct FaultyBackend {
    pub inner: LocalBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_generate: AtomicBool,
    fail_upload: AtomicBool,
    fail_recipe_insert: AtomicBool,
    calls: AtomicUsize,
    /// When set, generation waits for a permit before answering.
    gate: Mutex<Option<std::sync::Arc<Semaphore>>>,
    pub generate_requests: Mutex<Vec<GenerateRequest>>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self {
            inner: LocalBackend::open_in_memory().unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_generate: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
            fail_recipe_insert: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
            generate_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_generate(&self, on: bool) {
        self.fail_generate.store(on, Ordering::SeqCst);
    }

    pub fn fail_upload(&self, on: bool) {
        self.fail_upload.store(on, Ordering::SeqCst);
    }

    pub fn fail_recipe_insert(&self, on: bool) {
        self.fail_recipe_insert.store(on, Ordering::SeqCst);
    }

    /// Hold every generation call until a permit is added to the returned
    /// semaphore.
    pub fn gate_generation(&self) -> std::sync::Arc<Semaphore> {
        let sem = std::sync::Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(sem.clone());
        sem
    }

    /// Number of backend calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("backend unavailable (read)");
        }
        Ok(())
    }

    fn write(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("backend unavailable (write)");
        }
        Ok(())
    }
}

#[async_trait]
impl IngredientTable for FaultyBackend {
    async fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        self.read()?;
        self.inner.list_ingredients().await
    }

    async fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        self.read()?;
        self.inner.find_ingredient_by_name(name).await
    }

    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        self.write()?;
        self.inner.insert_ingredient(ingredient).await
    }

    async fn update_ingredient(&self, id: &str, patch: &IngredientPatch) -> Result<Ingredient> {
        self.write()?;
        self.inner.update_ingredient(id, patch).await
    }

    async fn delete_ingredient(&self, id: &str) -> Result<()> {
        self.write()?;
        self.inner.delete_ingredient(id).await
    }
}

#[async_trait]
impl RecipeTable for FaultyBackend {
    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        self.read()?;
        self.inner.list_recipes().await
    }

    async fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        self.write()?;
        if self.fail_recipe_insert.load(Ordering::SeqCst) {
            bail!("recipes table rejected the row");
        }
        self.inner.insert_recipe(recipe).await
    }
}

#[async_trait]
impl ObjectStorage for FaultyBackend {
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        self.write()?;
        if self.fail_upload.load(Ordering::SeqCst) {
            bail!("storage quota exceeded");
        }
        self.inner
            .upload_object(bucket, path, content_type, bytes)
            .await
    }

    async fn remove_object(&self, bucket: &str, path: &str) -> Result<()> {
        self.write()?;
        self.inner.remove_object(bucket, path).await
    }
}

#[async_trait]
impl RecipeGenerator for FaultyBackend {
    async fn generate_recipe(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.generate_requests
            .lock()
            .unwrap()
            .push(request.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(sem) = gate {
            let _permit = sem.acquire().await?;
        }

        if self.fail_generate.load(Ordering::SeqCst) {
            bail!("function returned 500");
        }
        self.inner.generate_recipe(request).await
    }
}
