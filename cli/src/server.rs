use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use larder_core::chat::{ChatState, Rejection, SendOutcome};
use larder_core::models::{
    ChatMessage, Direction, Ingredient, Recipe, Sender, Toast, validate_ingredient_name,
};

use crate::commands::helpers::format_quantity;
use crate::recipe_file::build_upload;
use crate::shell::{App, CHAT_HEADING, NAV, PANTRY_HEADING, TITLE};

const BODY_LIMIT: usize = 11 * 1024 * 1024; // recipe files are capped at 10 MB
const FILE_NAME_HEADER: &str = "x-file-name";
const TITLE_HEADER: &str = "x-recipe-title";

#[derive(Clone)]
struct AppState {
    app: Arc<App>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct AddIngredientRequest {
    name: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct ChatRequest {
    text: String,
}

#[derive(Serialize)]
struct ChatResponse {
    state: ChatState,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// The backend call failed; carries the message shown to the user.
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Upstream(msg) => {
                tracing::warn!("backend request failed: {msg}");
                (StatusCode::BAD_GATEWAY, msg)
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Hand the toast a failed operation raised to the API caller, so it does
/// not also linger for the page view.
fn upstream(app: &App, toast: &Toast) -> ApiError {
    app.toaster.dismiss(toast.id);
    ApiError::Upstream(format!("{}: {}", toast.title, toast.description))
}

/// Look an ingredient up in the cache, refreshing once on a miss.
async fn known_ingredient(app: &App, id: &str) -> Result<Ingredient, ApiError> {
    if let Some(found) = app.ingredients.find(id) {
        return Ok(found);
    }
    app.ingredients
        .refresh()
        .await
        .map_err(|toast| upstream(app, &toast))?;
    app.ingredients
        .find(id)
        .ok_or_else(|| ApiError::NotFound(format!("Ingredient {id} not found")))
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static(
            "default-src 'none'; style-src 'unsafe-inline'; form-action 'self'",
        ),
    );
    response
}

// --- JSON handlers ---

async fn list_ingredients(
    State(state): State<AppState>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    state
        .app
        .ingredients
        .refresh()
        .await
        .map_err(|toast| upstream(&state.app, &toast))?;
    Ok(Json(state.app.ingredients.snapshot()))
}

async fn add_ingredient(
    State(state): State<AppState>,
    Json(req): Json<AddIngredientRequest>,
) -> Result<(StatusCode, Json<Ingredient>), ApiError> {
    validate_ingredient_name(&req.name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let added = state
        .app
        .ingredients
        .add(&req.name, req.unit.as_deref(), req.category.as_deref())
        .await
        .map_err(|toast| upstream(&state.app, &toast))?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn adjust(
    state: &AppState,
    id: &str,
    direction: Direction,
) -> Result<Json<Ingredient>, ApiError> {
    let target = known_ingredient(&state.app, id).await?;
    state
        .app
        .ingredients
        .adjust_quantity(&target.id, direction)
        .await
        .map(Json)
        .map_err(|toast| upstream(&state.app, &toast))
}

async fn increment_ingredient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ingredient>, ApiError> {
    adjust(&state, &id, Direction::Increment).await
}

async fn decrement_ingredient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ingredient>, ApiError> {
    adjust(&state, &id, Direction::Decrement).await
}

async fn delete_ingredient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target = known_ingredient(&state.app, &id).await?;
    state
        .app
        .ingredients
        .remove(&target.id)
        .await
        .map_err(|toast| upstream(&state.app, &toast))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_chat(State(state): State<AppState>) -> Json<ChatResponse> {
    Json(ChatResponse {
        state: state.app.chat.state(),
        messages: state.app.chat.messages(),
    })
}

async fn post_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    match state.app.chat.send(&req.text).await {
        SendOutcome::Replied(msg) => Ok(Json(msg)),
        SendOutcome::Failed(toast) => Err(upstream(&state.app, &toast)),
        SendOutcome::Rejected(Rejection::EmptyPrompt) => {
            Err(ApiError::BadRequest("Message cannot be empty".to_string()))
        }
        SendOutcome::Rejected(Rejection::Busy) => Err(ApiError::Conflict(
            "The assistant is still answering the previous message".to_string(),
        )),
    }
}

async fn list_recipes(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, ApiError> {
    state
        .app
        .chat
        .recipes()
        .await
        .map(Json)
        .map_err(|toast| upstream(&state.app, &toast))
}

/// Upload a recipe file sent as the raw request body.
async fn upload_recipe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    let file_name = header(FILE_NAME_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {FILE_NAME_HEADER} header")))?;
    let upload = build_upload(&file_name, body.to_vec(), header(TITLE_HEADER))
        .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    let recipe = state
        .app
        .chat
        .upload_recipe(upload)
        .await
        .map_err(|toast| upstream(&state.app, &toast))?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn list_toasts(State(state): State<AppState>) -> Json<Vec<Toast>> {
    Json(state.app.toaster.pending())
}

async fn dismiss_toast(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    if state.app.toaster.dismiss(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Notification {id} not found")))
    }
}

// --- HTML page ---

#[derive(Deserialize)]
struct AddIngredientForm {
    name: String,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    category: String,
}

#[derive(Deserialize)]
struct ChatForm {
    text: String,
}

async fn page(State(state): State<AppState>) -> Html<String> {
    let _ = state.app.ingredients.refresh().await;
    let recipes = state.app.chat.recipes().await.unwrap_or_default();
    Html(render_html(
        &state.app.ingredients.snapshot(),
        &state.app.chat.messages(),
        state.app.chat.is_sending(),
        &recipes,
        &state.app.toaster.pending(),
    ))
}

async fn form_add_ingredient(
    State(state): State<AppState>,
    Form(form): Form<AddIngredientForm>,
) -> Redirect {
    let _ = state
        .app
        .ingredients
        .add(
            &form.name,
            Some(form.unit.as_str()),
            Some(form.category.as_str()),
        )
        .await;
    Redirect::to("/")
}

async fn form_increment(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    let _ = state
        .app
        .ingredients
        .adjust_quantity(&id, Direction::Increment)
        .await;
    Redirect::to("/")
}

async fn form_decrement(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    let _ = state
        .app
        .ingredients
        .adjust_quantity(&id, Direction::Decrement)
        .await;
    Redirect::to("/")
}

async fn form_remove(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    let _ = state.app.ingredients.remove(&id).await;
    Redirect::to("/")
}

async fn form_chat(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Redirect {
    if let SendOutcome::Rejected(Rejection::Busy) = state.app.chat.send(&form.text).await {
        state
            .app
            .toaster
            .error("Please wait", "The assistant is still answering");
    }
    Redirect::to("/#chat")
}

async fn form_dismiss(State(state): State<AppState>, Path(id): Path<u64>) -> Redirect {
    state.app.toaster.dismiss(id);
    Redirect::to("/")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;margin:0;background:#f7f7f5}\
header{display:flex;justify-content:space-between;padding:1rem 2rem;background:#fff;border-bottom:1px solid #ddd}\
nav a{margin-left:1rem;color:#333;text-decoration:none}\
main{display:grid;grid-template-columns:1fr 2fr;gap:1.5rem;padding:1.5rem 2rem}\
section{background:#fff;border:1px solid #ddd;border-radius:8px;padding:1rem}\
li{display:flex;justify-content:space-between;align-items:center;padding:.25rem 0}\
.msg{padding:.5rem .75rem;border-radius:8px;margin:.25rem 0;max-width:80%}\
.user{background:#2563eb;color:#fff;margin-left:auto}.assistant{background:#eee}\
.toast{padding:.5rem 1rem;margin:.5rem 2rem;border-radius:6px;background:#e7f6e7}\
.toast.destructive{background:#fde2e2}form.inline{display:inline}";

fn render_html(
    ingredients: &[Ingredient],
    messages: &[ChatMessage],
    sending: bool,
    recipes: &[Recipe],
    toasts: &[Toast],
) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{TITLE}</title>\
         <style>{STYLE}</style></head><body><header><strong>{TITLE}</strong><nav>"
    );
    for label in NAV {
        let anchor = label.to_lowercase();
        let _ = write!(html, "<a href=\"#{anchor}\">{label}</a>");
    }
    html.push_str("</nav></header>");

    for toast in toasts {
        let class = if toast.is_error() { "toast destructive" } else { "toast" };
        let _ = write!(
            html,
            "<div class=\"{class}\"><strong>{}</strong> {} \
             <form class=\"inline\" method=\"post\" action=\"/toasts/{}/dismiss\">\
             <button>×</button></form></div>",
            escape_html(&toast.title),
            escape_html(&toast.description),
            toast.id,
        );
    }

    let _ = write!(
        html,
        "<main><section id=\"ingredients\"><h2>{PANTRY_HEADING}</h2>\
         <form method=\"post\" action=\"/ingredients\">\
         <input name=\"name\" placeholder=\"Add ingredient\" required>\
         <input name=\"unit\" placeholder=\"Unit\" size=\"5\">\
         <input name=\"category\" placeholder=\"Category\" size=\"8\">\
         <button>Add</button></form><ul>"
    );
    for ing in ingredients {
        let id = escape_html(&ing.id);
        let _ = write!(
            html,
            "<li><span>{}</span><span>\
             <form class=\"inline\" method=\"post\" action=\"/ingredients/{id}/decrement\"><button>−</button></form> \
             {} {} \
             <form class=\"inline\" method=\"post\" action=\"/ingredients/{id}/increment\"><button>+</button></form> \
             <form class=\"inline\" method=\"post\" action=\"/ingredients/{id}/delete\"><button>Remove</button></form>\
             </span></li>",
            escape_html(&ing.name),
            format_quantity(ing.quantity),
            escape_html(&ing.unit),
        );
    }
    html.push_str("</ul></section>");

    let _ = write!(html, "<section id=\"chat\"><h2>{CHAT_HEADING}</h2>");
    for msg in messages {
        let class = match msg.sender {
            Sender::User => "msg user",
            Sender::Assistant => "msg assistant",
        };
        let _ = write!(
            html,
            "<div class=\"{class}\">{}</div>",
            escape_html(&msg.text).replace('\n', "<br>")
        );
    }
    if sending {
        html.push_str("<div class=\"msg assistant\">…</div>");
    }
    let disabled = if sending { " disabled" } else { "" };
    let _ = write!(
        html,
        "<form method=\"post\" action=\"/chat\">\
         <input name=\"text\" placeholder=\"Ask for a recipe\" size=\"50\"{disabled}>\
         <button{disabled}>Send</button></form>"
    );

    html.push_str("<h3 id=\"recipes\">Recipes</h3><ul>");
    if recipes.is_empty() {
        html.push_str("<li>No recipes uploaded yet</li>");
    }
    for r in recipes {
        let _ = write!(
            html,
            "<li><span>{}</span><span>{}</span></li>",
            escape_html(&r.title),
            escape_html(r.file_path.as_deref().unwrap_or("")),
        );
    }
    html.push_str("</ul></section></main></body></html>");
    html
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/ingredients", post(form_add_ingredient))
        .route("/ingredients/{id}/increment", post(form_increment))
        .route("/ingredients/{id}/decrement", post(form_decrement))
        .route("/ingredients/{id}/delete", post(form_remove))
        .route("/chat", post(form_chat))
        .route("/toasts/{id}/dismiss", post(form_dismiss))
        .route("/api/ingredients", get(list_ingredients).post(add_ingredient))
        .route("/api/ingredients/{id}", delete(delete_ingredient))
        .route("/api/ingredients/{id}/increment", post(increment_ingredient))
        .route("/api/ingredients/{id}/decrement", post(decrement_ingredient))
        .route("/api/chat", get(get_chat).post(post_chat))
        .route("/api/recipes", get(list_recipes).post(upload_recipe))
        .route("/api/toasts", get(list_toasts))
        .route("/api/toasts/{id}", delete(dismiss_toast))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(app: App, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState { app: Arc::new(app) };
    let router = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Any device on your network can edit this pantry."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!("listening on http://{bind}:{port}");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, router).await?;
    Ok(())
}
