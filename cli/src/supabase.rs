use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use larder_core::backend::{
    GENERATE_FUNCTION, INGREDIENTS_TABLE, IngredientTable, ObjectStorage, RECIPES_TABLE,
    RecipeGenerator, RecipeTable,
};
use larder_core::models::{
    GenerateRequest, GenerateResponse, Ingredient, IngredientPatch, NewIngredient, NewRecipe,
    Recipe,
};
use larder_core::supabase::{
    describe_error, eq_filter, function_path, ilike_exact, object_path, rest_path, same_name,
    single_row,
};

const RETURN_REPRESENTATION: &str = "return=representation";

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("request to the backend timed out")]
    Timeout,
    #[error("could not reach the backend at {0}")]
    Unavailable(String),
    #[error("backend returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Client for a Supabase project: PostgREST tables, storage and edge
/// functions, authenticated with the project's anon key.
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "larder/{} (recipe assistant)",
                env!("CARGO_PKG_VERSION")
            ))
            // Recipe generation can take a while
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SupabaseError> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SupabaseError::Timeout
            } else if e.is_connect() {
                SupabaseError::Unavailable(self.base_url.clone())
            } else {
                SupabaseError::Request(e)
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(%status, body = %body, "backend error response");
        Err(SupabaseError::Status {
            status,
            message: describe_error(status.as_u16(), &body),
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let resp = self
            .send(request)
            .await
            .with_context(|| format!("Failed to {what}"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to parse response to {what}"))
    }
}

#[async_trait]
impl IngredientTable for SupabaseClient {
    async fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let req = self
            .request(Method::GET, &rest_path(INGREDIENTS_TABLE))
            .query(&[("select", "*"), ("order", "name.asc")]);
        self.fetch(req, "fetch ingredients").await
    }

    async fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let filter = ilike_exact(name.trim());
        let req = self
            .request(Method::GET, &rest_path(INGREDIENTS_TABLE))
            .query(&[("select", "*"), ("name", filter.as_str())]);
        let rows: Vec<Ingredient> = self.fetch(req, "look up ingredient").await?;
        Ok(rows.into_iter().find(|i| same_name(&i.name, name)))
    }

    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let req = self
            .request(Method::POST, &rest_path(INGREDIENTS_TABLE))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(ingredient);
        let rows = self.fetch(req, "add ingredient").await?;
        single_row(rows, "ingredient")
    }

    async fn update_ingredient(&self, id: &str, patch: &IngredientPatch) -> Result<Ingredient> {
        let req = self
            .request(Method::PATCH, &rest_path(INGREDIENTS_TABLE))
            .query(&[("id", eq_filter(id))])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(patch);
        let rows = self.fetch(req, "update ingredient").await?;
        single_row(rows, "ingredient").with_context(|| format!("Ingredient {id} not found"))
    }

    async fn delete_ingredient(&self, id: &str) -> Result<()> {
        let req = self
            .request(Method::DELETE, &rest_path(INGREDIENTS_TABLE))
            .query(&[("id", eq_filter(id))])
            .header("Prefer", RETURN_REPRESENTATION);
        // PostgREST answers a filter that matched nothing with an empty list.
        let rows: Vec<Ingredient> = self.fetch(req, "delete ingredient").await?;
        single_row(rows, "ingredient").with_context(|| format!("Ingredient {id} not found"))?;
        Ok(())
    }
}

#[async_trait]
impl RecipeTable for SupabaseClient {
    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let req = self
            .request(Method::GET, &rest_path(RECIPES_TABLE))
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        self.fetch(req, "fetch recipes").await
    }

    async fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let req = self
            .request(Method::POST, &rest_path(RECIPES_TABLE))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(recipe);
        let rows = self.fetch(req, "save recipe").await?;
        single_row(rows, "recipe")
    }
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let req = self
            .request(Method::POST, &object_path(bucket, path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(req)
            .await
            .with_context(|| format!("Failed to upload {bucket}/{path}"))?;
        Ok(())
    }

    async fn remove_object(&self, bucket: &str, path: &str) -> Result<()> {
        let req = self.request(Method::DELETE, &object_path(bucket, path));
        self.send(req)
            .await
            .with_context(|| format!("Failed to remove {bucket}/{path}"))?;
        Ok(())
    }
}

#[async_trait]
impl RecipeGenerator for SupabaseClient {
    async fn generate_recipe(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let req = self
            .request(Method::POST, &function_path(GENERATE_FUNCTION))
            .json(request);
        let resp: GenerateResponse = self.fetch(req, "generate recipe").await?;
        if resp.text.trim().is_empty() {
            return Err(anyhow!("Recipe function returned an empty reply"));
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, Method as AxumMethod, Uri},
        response::{IntoResponse, Response as AxumResponse},
    };
    use serde_json::json;

    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        uri: String,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    fn flour_row(quantity: f64) -> serde_json::Value {
        json!({
            "id": "7f9c",
            "name": "Flour",
            "quantity": quantity,
            "unit": "g",
            "category": null,
            "created_at": "2024-01-15T10:00:00+00:00"
        })
    }

    async fn fake_backend(
        State(log): State<Log>,
        method: AxumMethod,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> AxumResponse {
        log.lock().unwrap().push(Seen {
            method: method.to_string(),
            uri: uri.to_string(),
            headers,
            body: body.to_vec(),
        });

        let query = uri.query().unwrap_or_default();
        match (method.as_str(), uri.path()) {
            ("GET", "/rest/v1/ingredients") => {
                if query.contains("name=ilike") {
                    Json(json!([flour_row(1.0)])).into_response()
                } else {
                    Json(json!([flour_row(1.0), {
                        "id": "8a01", "name": "Sugar", "quantity": 0, "unit": "pcs"
                    }]))
                    .into_response()
                }
            }
            ("POST", "/rest/v1/ingredients") => {
                (StatusCode::CREATED, Json(json!([flour_row(1.0)]))).into_response()
            }
            ("PATCH", "/rest/v1/ingredients") => {
                if query.contains("missing") {
                    Json(json!([])).into_response()
                } else {
                    Json(json!([flour_row(5.0)])).into_response()
                }
            }
            ("DELETE", "/rest/v1/ingredients") => {
                if query.contains("missing") {
                    Json(json!([])).into_response()
                } else {
                    Json(json!([flour_row(1.0)])).into_response()
                }
            }
            ("GET", "/rest/v1/recipes") => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "code": "42P01",
                    "message": "relation \"public.recipes\" does not exist",
                    "details": null,
                    "hint": null
                })),
            )
                .into_response(),
            ("POST", "/functions/v1/generate-recipe") => {
                Json(json!({ "text": "Try pancakes!" })).into_response()
            }
            ("POST", p) if p.starts_with("/storage/v1/object/recipes/") => {
                Json(json!({ "Key": p.trim_start_matches("/storage/v1/object/") }))
                    .into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn spawn_fake() -> (SupabaseClient, Log) {
        let log: Log = Arc::default();
        let app = Router::new()
            .fallback(fake_backend)
            .with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = SupabaseClient::new(&format!("http://{addr}/"), "anon-key").unwrap();
        (client, log)
    }

    fn last(log: &Log) -> Seen {
        log.lock().unwrap().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn list_ingredients_orders_by_name_and_authenticates() {
        let (client, log) = spawn_fake().await;
        let rows = client.list_ingredients().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "Sugar");
        assert!(rows[1].category.is_none());

        let seen = last(&log);
        assert_eq!(seen.method, "GET");
        assert_eq!(seen.uri, "/rest/v1/ingredients?select=*&order=name.asc");
        assert_eq!(seen.headers["apikey"], "anon-key");
        assert_eq!(seen.headers["authorization"], "Bearer anon-key");
    }

    #[tokio::test]
    async fn find_by_name_uses_ilike() {
        let (client, log) = spawn_fake().await;
        let found = client.find_ingredient_by_name("flour").await.unwrap();
        assert_eq!(found.unwrap().id, "7f9c");
        assert_eq!(
            last(&log).uri,
            "/rest/v1/ingredients?select=*&name=ilike.flour"
        );
    }

    #[tokio::test]
    async fn insert_asks_for_representation() {
        let (client, log) = spawn_fake().await;
        let ing = client
            .insert_ingredient(&NewIngredient {
                name: "Flour".to_string(),
                quantity: 1.0,
                unit: "g".to_string(),
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(ing.name, "Flour");

        let seen = last(&log);
        assert_eq!(seen.headers["prefer"], "return=representation");
        let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
        assert_eq!(body["name"], "Flour");
        assert_eq!(body["quantity"], 1.0);
    }

    #[tokio::test]
    async fn update_filters_by_id_and_sends_only_patch_fields() {
        let (client, log) = spawn_fake().await;
        let ing = client
            .update_ingredient("7f9c", &IngredientPatch::quantity(5.0))
            .await
            .unwrap();
        assert_eq!(ing.quantity, 5.0);

        let seen = last(&log);
        assert_eq!(seen.method, "PATCH");
        assert_eq!(seen.uri, "/rest/v1/ingredients?id=eq.7f9c");
        let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
        assert_eq!(body, json!({ "quantity": 5.0 }));
    }

    #[tokio::test]
    async fn update_missing_row_is_an_error() {
        let (client, _) = spawn_fake().await;
        let err = client
            .update_ingredient("missing", &IngredientPatch::quantity(1.0))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Ingredient missing not found"));
    }

    #[tokio::test]
    async fn delete_sends_id_filter() {
        let (client, log) = spawn_fake().await;
        client.delete_ingredient("7f9c").await.unwrap();
        let seen = last(&log);
        assert_eq!(seen.method, "DELETE");
        assert_eq!(seen.uri, "/rest/v1/ingredients?id=eq.7f9c");
        assert_eq!(seen.headers["prefer"], RETURN_REPRESENTATION);
    }

    #[tokio::test]
    async fn delete_missing_row_is_an_error() {
        let (client, _) = spawn_fake().await;
        let err = client.delete_ingredient("missing").await.unwrap_err();
        assert!(format!("{err:#}").contains("Ingredient missing not found"));
    }

    #[tokio::test]
    async fn error_status_carries_backend_message() {
        let (client, _) = spawn_fake().await;
        let err = client.list_recipes().await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("Failed to fetch recipes"));
        assert!(msg.contains("relation \"public.recipes\" does not exist"));
        assert!(matches!(
            err.downcast_ref::<SupabaseError>(),
            Some(SupabaseError::Status { status, .. }) if *status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn generate_posts_prompt_and_ingredients() {
        let (client, log) = spawn_fake().await;
        let resp = client
            .generate_recipe(&GenerateRequest {
                prompt: "breakfast?".to_string(),
                ingredients: vec!["Flour".to_string(), "Eggs".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(resp.text, "Try pancakes!");

        let seen = last(&log);
        assert_eq!(seen.uri, "/functions/v1/generate-recipe");
        let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
        assert_eq!(
            body,
            json!({ "prompt": "breakfast?", "ingredients": ["Flour", "Eggs"] })
        );
    }

    #[tokio::test]
    async fn upload_posts_bytes_with_content_type() {
        let (client, log) = spawn_fake().await;
        client
            .upload_object("recipes", "abc.txt", "text/plain", b"boil".to_vec())
            .await
            .unwrap();

        let seen = last(&log);
        assert_eq!(seen.uri, "/storage/v1/object/recipes/abc.txt");
        assert_eq!(seen.headers["content-type"], "text/plain");
        assert_eq!(seen.body, b"boil");
    }

    #[tokio::test]
    async fn unreachable_backend_is_reported() {
        // Bind then drop a listener to get a port nobody is listening on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = SupabaseClient::new(&format!("http://{addr}"), "k").unwrap();
        let err = client.list_ingredients().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SupabaseError>(),
            Some(SupabaseError::Unavailable(_))
        ));
    }
}
