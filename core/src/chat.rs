use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;

use crate::backend::{Backend, RECIPES_BUCKET};
use crate::models::{
    ChatMessage, GREETING, GenerateRequest, GenerateResponse, NewRecipe, Recipe, RecipeUpload,
    Sender, Toast,
};
use crate::toast::Toaster;

const FILE_STEM_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    Idle,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyPrompt,
    /// Another message is still waiting for its reply.
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Replied(ChatMessage),
    /// Carries the notification raised for the failure.
    Failed(Toast),
    Rejected(Rejection),
}

struct Transcript {
    next_id: u64,
    messages: Vec<ChatMessage>,
    state: ChatState,
}

impl Transcript {
    fn push(&mut self, text: String, sender: Sender) -> ChatMessage {
        self.next_id += 1;
        let msg = ChatMessage {
            id: self.next_id,
            text,
            sender,
        };
        self.messages.push(msg.clone());
        msg
    }
}

/// View state for the chat panel.
///
/// The transcript lives only here. At most one generation request is in
/// flight; sends made meanwhile are rejected with [`Rejection::Busy`].
pub struct ChatView {
    backend: Arc<dyn Backend>,
    toaster: Toaster,
    transcript: Mutex<Transcript>,
}

/// Puts the view back to idle when a send finishes or is dropped mid-flight.
struct SendingGuard<'a> {
    view: &'a ChatView,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.view.transcript().state = ChatState::Idle;
    }
}

impl ChatView {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, toaster: Toaster) -> Self {
        let mut transcript = Transcript {
            next_id: 0,
            messages: Vec::new(),
            state: ChatState::Idle,
        };
        transcript.push(GREETING.to_string(), Sender::Assistant);
        Self {
            backend,
            toaster,
            transcript: Mutex::new(transcript),
        }
    }

    fn transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript().messages.clone()
    }

    #[must_use]
    pub fn state(&self) -> ChatState {
        self.transcript().state
    }

    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.state() == ChatState::Sending
    }

    /// Send a prompt and wait for the assistant's reply.
    ///
    /// The user message is appended before the backend is contacted and is
    /// kept whatever happens next.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let prompt = text.trim();
        if prompt.is_empty() {
            return SendOutcome::Rejected(Rejection::EmptyPrompt);
        }

        let guard = {
            let mut transcript = self.transcript();
            if transcript.state == ChatState::Sending {
                return SendOutcome::Rejected(Rejection::Busy);
            }
            transcript.push(prompt.to_string(), Sender::User);
            transcript.state = ChatState::Sending;
            SendingGuard { view: self }
        };

        let reply: anyhow::Result<GenerateResponse> = async {
            let ingredients = self
                .backend
                .list_ingredients()
                .await?
                .into_iter()
                .map(|i| i.name)
                .collect();
            let request = GenerateRequest {
                prompt: prompt.to_string(),
                ingredients,
            };
            tracing::debug!(ingredients = request.ingredients.len(), "requesting recipe");
            self.backend.generate_recipe(&request).await
        }
        .await;

        let outcome = match reply {
            Ok(resp) => {
                let msg = self.transcript().push(resp.text, Sender::Assistant);
                SendOutcome::Replied(msg)
            }
            Err(e) => SendOutcome::Failed(self.toaster.failure("Error generating recipe", &e)),
        };
        drop(guard);
        outcome
    }

    /// Store a recipe file under a random name and record it in the
    /// `recipes` table.
    ///
    /// If the record cannot be written the stored file is removed again, so
    /// a failed upload leaves nothing behind.
    pub async fn upload_recipe(&self, upload: RecipeUpload) -> Result<Recipe, Toast> {
        let file_path = random_file_name(&upload.original_name);
        let content_type = upload.content_type.clone();

        if let Err(e) = self
            .backend
            .upload_object(RECIPES_BUCKET, &file_path, &content_type, upload.bytes)
            .await
        {
            return Err(self.toaster.failure("Error uploading file", &e));
        }

        let record = NewRecipe {
            title: upload.title,
            file_path: Some(file_path.clone()),
            file_type: Some(content_type),
        };
        match self.backend.insert_recipe(&record).await {
            Ok(recipe) => {
                tracing::info!(path = %file_path, "recipe uploaded");
                self.toaster.success(
                    "Recipe uploaded",
                    format!("{} has been saved", recipe.title),
                );
                Ok(recipe)
            }
            Err(e) => {
                if let Err(cleanup) = self
                    .backend
                    .remove_object(RECIPES_BUCKET, &file_path)
                    .await
                {
                    tracing::warn!(
                        path = %file_path,
                        error = %format!("{cleanup:#}"),
                        "could not remove orphaned upload"
                    );
                }
                Err(self.toaster.failure("Error saving recipe", &e))
            }
        }
    }

    /// Saved recipes, newest first.
    pub async fn recipes(&self) -> Result<Vec<Recipe>, Toast> {
        self.backend
            .list_recipes()
            .await
            .map_err(|e| self.toaster.failure("Error fetching recipes", &e))
    }
}

/// Random alphanumeric file name keeping the original extension.
fn random_file_name(original: &str) -> String {
    let stem: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(FILE_STEM_LEN)
        .map(char::from)
        .collect();
    let ext = std::path::Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty());
    match ext {
        Some(ext) => format!("{stem}.{}", ext.to_lowercase()),
        None => stem,
    }
}
