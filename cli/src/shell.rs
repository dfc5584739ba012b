use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use larder_core::backend::Backend;
use larder_core::chat::{ChatView, Rejection, SendOutcome};
use larder_core::models::{ChatMessage, Direction, Ingredient, Sender, Toast};
use larder_core::pantry::IngredientStore;
use larder_core::toast::Toaster;

use crate::commands::helpers::{format_quantity, truncate};
use crate::recipe_file::read_upload;

pub const TITLE: &str = "Recipe Assistant";
pub const NAV: [&str; 3] = ["Ingredients", "Recipes", "Chat"];
pub const PANTRY_HEADING: &str = "My Ingredients";
pub const CHAT_HEADING: &str = "Recipe Assistant";

const LEFT_WIDTH: usize = 38;
const RIGHT_WIDTH: usize = 56;

/// The page: header plus the pantry and chat panels, sharing one backend and
/// one toast queue.
pub struct App {
    pub toaster: Toaster,
    pub ingredients: IngredientStore,
    pub chat: ChatView,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let toaster = Toaster::new();
        Self {
            ingredients: IngredientStore::new(backend.clone(), toaster.clone()),
            chat: ChatView::new(backend, toaster.clone()),
            toaster,
        }
    }
}

/// Render the page for a terminal: header, then both panels side by side.
pub fn render_page(ingredients: &[Ingredient], messages: &[ChatMessage], sending: bool) -> String {
    let mut out = String::new();
    let nav = NAV.join(" · ");
    out.push_str(&format!("{TITLE}    {nav}\n"));
    out.push_str(&"═".repeat(LEFT_WIDTH + RIGHT_WIDTH + 3));
    out.push('\n');

    let left = pantry_lines(ingredients);
    let right = chat_lines(messages, sending);
    let rows = left.len().max(right.len());
    for i in 0..rows {
        let l = left.get(i).map_or("", String::as_str);
        let r = right.get(i).map_or("", String::as_str);
        let pad = LEFT_WIDTH.saturating_sub(l.chars().count());
        out.push_str(format!("{l}{} │ {r}", " ".repeat(pad)).trim_end());
        out.push('\n');
    }
    out
}

fn pantry_lines(ingredients: &[Ingredient]) -> Vec<String> {
    let mut lines = vec![PANTRY_HEADING.to_string(), "─".repeat(LEFT_WIDTH)];
    if ingredients.is_empty() {
        lines.push("(no ingredients yet)".to_string());
    }
    for (i, ing) in ingredients.iter().enumerate() {
        let amount = format!("{} {}", format_quantity(ing.quantity), ing.unit);
        let name = truncate(
            &ing.name,
            LEFT_WIDTH.saturating_sub(amount.chars().count() + 6),
        );
        let label = format!("{:>2}. {name}", i + 1);
        let pad = LEFT_WIDTH.saturating_sub(label.chars().count() + amount.chars().count());
        lines.push(format!("{label}{}{amount}", " ".repeat(pad)));
    }
    lines
}

fn chat_lines(messages: &[ChatMessage], sending: bool) -> Vec<String> {
    let mut lines = vec![CHAT_HEADING.to_string(), "─".repeat(RIGHT_WIDTH)];
    for msg in messages {
        let who = match msg.sender {
            Sender::User => "you",
            Sender::Assistant => "bot",
        };
        let wrapped = wrap(&msg.text, RIGHT_WIDTH - 5);
        for (i, line) in wrapped.iter().enumerate() {
            if i == 0 {
                lines.push(format!("{who:>3}: {line}"));
            } else {
                lines.push(format!("     {line}"));
            }
        }
    }
    if sending {
        lines.push("     …".to_string());
    }
    lines
}

/// Greedy word wrap. Words longer than `width` are split.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: String = word.to_string();
            while word.chars().count() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                lines.push(head);
            }
            let needed = current.chars().count()
                + usize::from(!current.is_empty())
                + word.chars().count();
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() || paragraph.trim().is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

pub(crate) fn render_toasts(toasts: &[Toast]) -> String {
    toasts
        .iter()
        .map(|t| {
            let marker = if t.is_error() { "✗" } else { "✓" };
            if t.description.is_empty() {
                format!("{marker} {}\n", t.title)
            } else {
                format!("{marker} {}: {}\n", t.title, t.description)
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ShellCommand {
    Add {
        name: String,
        unit: Option<String>,
        category: Option<String>,
    },
    Adjust(String, Direction),
    Remove(String),
    Upload {
        path: PathBuf,
        title: Option<String>,
    },
    Recipes,
    Refresh,
    Help,
    Quit,
    Say(String),
    Empty,
}

pub(crate) fn parse_command(line: &str) -> ShellCommand {
    let line = line.trim();
    if line.is_empty() {
        return ShellCommand::Empty;
    }
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(h, r)| (h, r.trim()));

    match head {
        "/add" if !rest.is_empty() => {
            let mut parts = rest.split(',').map(str::trim);
            let name = parts.next().unwrap_or_default().to_string();
            let unit = parts.next().filter(|s| !s.is_empty()).map(String::from);
            let category = parts.next().filter(|s| !s.is_empty()).map(String::from);
            ShellCommand::Add {
                name,
                unit,
                category,
            }
        }
        "/+" | "/inc" if !rest.is_empty() => {
            ShellCommand::Adjust(rest.to_string(), Direction::Increment)
        }
        "/-" | "/dec" if !rest.is_empty() => {
            ShellCommand::Adjust(rest.to_string(), Direction::Decrement)
        }
        "/rm" | "/remove" if !rest.is_empty() => ShellCommand::Remove(rest.to_string()),
        "/upload" if !rest.is_empty() => {
            let (path, title) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, None), |(p, t)| (p, Some(t.trim().to_string())));
            ShellCommand::Upload {
                path: PathBuf::from(path),
                title,
            }
        }
        "/recipes" => ShellCommand::Recipes,
        "/refresh" => ShellCommand::Refresh,
        "/help" | "/?" => ShellCommand::Help,
        "/quit" | "/exit" | "/q" => ShellCommand::Quit,
        _ if head.starts_with('/') => ShellCommand::Help,
        _ => ShellCommand::Say(line.to_string()),
    }
}

const HELP: &str = "\
Type a message to ask the assistant, or:
  /add <name>[, unit[, category]]   add an ingredient (or bump an existing one)
  /+ <n|name>  /- <n|name>          adjust quantity by one
  /rm <n|name>                      remove an ingredient
  /upload <file> [title]            upload a recipe file
  /recipes                          list uploaded recipes
  /refresh                          reload the pantry
  /quit                             leave";

/// Resolve a 1-based list position or a name/id to an ingredient id.
fn resolve(app: &App, key: &str) -> Option<String> {
    if let Ok(n) = key.parse::<usize>() {
        return app
            .ingredients
            .snapshot()
            .get(n.wrapping_sub(1))
            .map(|i| i.id.clone());
    }
    app.ingredients.find(key).map(|i| i.id)
}

/// Run one command against the app. Returns false when the shell should exit.
pub(crate) async fn execute(app: &App, command: ShellCommand) -> Result<bool> {
    match command {
        ShellCommand::Empty => {}
        ShellCommand::Quit => return Ok(false),
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Refresh => {
            let _ = app.ingredients.refresh().await;
        }
        ShellCommand::Add {
            name,
            unit,
            category,
        } => {
            let _ = app
                .ingredients
                .add(&name, unit.as_deref(), category.as_deref())
                .await;
        }
        ShellCommand::Adjust(key, direction) => match resolve(app, &key) {
            Some(id) => {
                let _ = app.ingredients.adjust_quantity(&id, direction).await;
            }
            None => {
                app.toaster
                    .error("Unknown ingredient", format!("No ingredient matches '{key}'"));
            }
        },
        ShellCommand::Remove(key) => match resolve(app, &key) {
            Some(id) => {
                let _ = app.ingredients.remove(&id).await;
            }
            None => {
                app.toaster
                    .error("Unknown ingredient", format!("No ingredient matches '{key}'"));
            }
        },
        ShellCommand::Upload { path, title } => match read_upload(&path, title) {
            Ok(upload) => {
                let _ = app.chat.upload_recipe(upload).await;
            }
            Err(e) => {
                app.toaster.error("Error uploading file", format!("{e:#}"));
            }
        },
        ShellCommand::Recipes => {
            if let Ok(recipes) = app.chat.recipes().await {
                if recipes.is_empty() {
                    println!("No recipes uploaded yet");
                }
                for r in recipes {
                    let path = r.file_path.as_deref().unwrap_or("-");
                    println!("  {} ({path})", r.title);
                }
            }
        }
        ShellCommand::Say(text) => match app.chat.send(&text).await {
            SendOutcome::Rejected(Rejection::Busy) => {
                app.toaster
                    .error("Please wait", "The assistant is still answering");
            }
            SendOutcome::Replied(_)
            | SendOutcome::Failed(_)
            | SendOutcome::Rejected(Rejection::EmptyPrompt) => {}
        },
    }
    Ok(true)
}

/// Interactive loop: redraw the page, read a command, run it.
pub async fn run_shell(app: &App) -> Result<()> {
    let _ = app.ingredients.refresh().await;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!(
            "\n{}",
            render_page(
                &app.ingredients.snapshot(),
                &app.chat.messages(),
                app.chat.is_sending()
            )
        );
        eprint!("{}", render_toasts(&app.toaster.drain()));
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        if !execute(app, parse_command(&line?)).await? {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::local::LocalBackend;
    use larder_core::models::GREETING;

    fn app() -> App {
        App::new(Arc::new(LocalBackend::open_in_memory().unwrap()))
    }

    #[test]
    fn test_parse_add_with_unit_and_category() {
        assert_eq!(
            parse_command("/add Flour, g, baking"),
            ShellCommand::Add {
                name: "Flour".to_string(),
                unit: Some("g".to_string()),
                category: Some("baking".to_string()),
            }
        );
        assert_eq!(
            parse_command("/add  Brown sugar "),
            ShellCommand::Add {
                name: "Brown sugar".to_string(),
                unit: None,
                category: None,
            }
        );
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(
            parse_command("/+ 2"),
            ShellCommand::Adjust("2".to_string(), Direction::Increment)
        );
        assert_eq!(
            parse_command("/dec flour"),
            ShellCommand::Adjust("flour".to_string(), Direction::Decrement)
        );
        assert_eq!(parse_command("/rm 1"), ShellCommand::Remove("1".to_string()));
        assert_eq!(
            parse_command("/upload pasta.cook Nonna's pasta"),
            ShellCommand::Upload {
                path: PathBuf::from("pasta.cook"),
                title: Some("Nonna's pasta".to_string()),
            }
        );
        assert_eq!(parse_command("/quit"), ShellCommand::Quit);
        assert_eq!(parse_command("/add"), ShellCommand::Help);
        assert_eq!(parse_command("/bogus"), ShellCommand::Help);
        assert_eq!(parse_command("   "), ShellCommand::Empty);
        assert_eq!(
            parse_command("what's for dinner?"),
            ShellCommand::Say("what's for dinner?".to_string())
        );
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("a bb ccc", 4), vec!["a bb", "ccc"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("", 10), vec![""]);
        assert_eq!(wrap("one\n\ntwo", 10), vec!["one", "", "two"]);
    }

    #[test]
    fn test_render_page_has_header_and_both_panels() {
        let ingredients = vec![Ingredient {
            id: "1".to_string(),
            name: "Flour".to_string(),
            quantity: 2.0,
            unit: "g".to_string(),
            category: None,
            created_at: None,
        }];
        let messages = vec![ChatMessage {
            id: 1,
            text: GREETING.to_string(),
            sender: Sender::Assistant,
        }];

        let page = render_page(&ingredients, &messages, true);
        let lines: Vec<&str> = page.lines().collect();
        assert!(lines[0].starts_with(TITLE));
        assert!(lines[0].contains("Ingredients · Recipes · Chat"));
        assert!(lines[2].starts_with(PANTRY_HEADING));
        assert!(lines[2].ends_with(CHAT_HEADING));
        assert!(page.contains(" 1. Flour"));
        assert!(page.contains("2 g"));
        assert!(page.contains("bot: Hello!"));
        assert!(page.contains('…'));
    }

    #[test]
    fn test_render_toasts() {
        let toaster = Toaster::new();
        toaster.success("Ingredient added", "Flour has been added");
        toaster.error("Error", "");
        assert_eq!(
            render_toasts(&toaster.pending()),
            "✓ Ingredient added: Flour has been added\n✗ Error\n"
        );
    }

    #[tokio::test]
    async fn test_execute_add_adjust_remove_by_position() {
        let app = app();
        execute(&app, parse_command("/add Flour, g")).await.unwrap();
        execute(&app, parse_command("/add eggs")).await.unwrap();
        assert_eq!(app.ingredients.names(), vec!["eggs", "Flour"]);

        execute(&app, parse_command("/+ 2")).await.unwrap();
        assert_eq!(app.ingredients.find("flour").unwrap().quantity, 2.0);

        execute(&app, parse_command("/rm 1")).await.unwrap();
        assert_eq!(app.ingredients.names(), vec!["Flour"]);

        execute(&app, parse_command("/- 7")).await.unwrap();
        let toasts = app.toaster.drain();
        assert!(toasts.last().unwrap().is_error());
        assert_eq!(toasts.last().unwrap().title, "Unknown ingredient");
    }

    #[tokio::test]
    async fn test_execute_chat_and_quit() {
        let app = app();
        execute(&app, parse_command("/add rice")).await.unwrap();
        execute(&app, parse_command("ideas?")).await.unwrap();

        let messages = app.chat.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[2].text.contains("fried rice"));

        assert!(!execute(&app, ShellCommand::Quit).await.unwrap());
    }

    #[tokio::test]
    async fn test_execute_upload_missing_file_toasts() {
        let app = app();
        execute(&app, parse_command("/upload /definitely/not/here.cook"))
            .await
            .unwrap();
        let toasts = app.toaster.drain();
        assert_eq!(toasts.len(), 1);
        assert!(toasts[0].is_error());
    }
}
