mod commands;
mod config;
mod recipe_file;
mod server;
mod shell;
mod supabase;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_chat, cmd_ingredients_add, cmd_ingredients_adjust, cmd_ingredients_list,
    cmd_ingredients_remove, cmd_recipes_list, cmd_recipes_upload,
};
use crate::config::Config;
use crate::shell::{App, run_shell};
use crate::supabase::SupabaseClient;
use larder_core::backend::Backend;
use larder_core::local::LocalBackend;
use larder_core::models::Direction;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Keep a pantry list and ask a recipe assistant what to cook",
    long_about = "Keep a pantry list and ask a recipe assistant what to cook.

Talks to a Supabase project when one is configured in config.toml or through
LARDER_SUPABASE_URL and LARDER_SUPABASE_ANON_KEY. Otherwise everything is kept
in a local database and the assistant answers with canned suggestions."
)]
struct Cli {
    /// Use the local database even if a Supabase project is configured
    #[arg(long, global = true)]
    local: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the pantry
    Ingredients {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// List and upload recipe files
    Recipes {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Ask the recipe assistant (reads messages from stdin when none is given)
    Chat {
        /// Message to send
        message: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive page with the pantry and the chat side by side
    Shell,
    /// Serve the page and a JSON API over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// List all ingredients
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient, or add one more of an existing one
    Add {
        /// Ingredient name (matched case-insensitively)
        name: String,
        /// Unit, e.g. "g" or "cups" (default: pcs)
        #[arg(short, long)]
        unit: Option<String>,
        /// Category, e.g. "dairy"
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Increase an ingredient's quantity by one
    Inc {
        /// Ingredient name or ID
        ingredient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decrease an ingredient's quantity by one (never below zero)
    Dec {
        /// Ingredient name or ID
        ingredient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient
    Remove {
        /// Ingredient name or ID
        ingredient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List uploaded recipes, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload a recipe file (Cooklang, PDF, text, image)
    Upload {
        /// Path to the file
        file: PathBuf,
        /// Recipe title (default: Cooklang title or file name)
        #[arg(short, long)]
        title: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Serve { .. }));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Log to stderr, filtered by `RUST_LOG`. The server logs requests by default.
fn init_tracing(serving: bool) {
    let default = if serving {
        "larder=info,larder_core=info,tower_http=info"
    } else {
        "larder=warn,larder_core=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_backend(config: &Config, local: bool) -> Result<Arc<dyn Backend>> {
    match (&config.supabase, local) {
        (Some(settings), false) => {
            tracing::debug!(url = %settings.url, "using Supabase backend");
            Ok(Arc::new(SupabaseClient::new(
                &settings.url,
                &settings.anon_key,
            )?))
        }
        _ => {
            tracing::debug!(path = %config.db_path.display(), "using local backend");
            Ok(Arc::new(LocalBackend::open(&config.db_path)?))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(config = %config.config_path.display(), "configuration loaded");
    let backend = open_backend(&config, cli.local)?;
    let app = App::new(backend);

    match cli.command {
        Commands::Ingredients { command } => match command {
            IngredientCommands::List { json } => cmd_ingredients_list(&app, json).await,
            IngredientCommands::Add {
                name,
                unit,
                category,
                json,
            } => {
                cmd_ingredients_add(&app, &name, unit.as_deref(), category.as_deref(), json).await
            }
            IngredientCommands::Inc { ingredient, json } => {
                cmd_ingredients_adjust(&app, &ingredient, Direction::Increment, json).await
            }
            IngredientCommands::Dec { ingredient, json } => {
                cmd_ingredients_adjust(&app, &ingredient, Direction::Decrement, json).await
            }
            IngredientCommands::Remove { ingredient, json } => {
                cmd_ingredients_remove(&app, &ingredient, json).await
            }
        },
        Commands::Recipes { command } => match command {
            RecipeCommands::List { json } => cmd_recipes_list(&app, json).await,
            RecipeCommands::Upload { file, title, json } => {
                cmd_recipes_upload(&app, &file, title, json).await
            }
        },
        Commands::Chat { message, json } => cmd_chat(&app, message.as_deref(), json).await,
        Commands::Shell => run_shell(&app).await,
        Commands::Serve { port, bind } => server::start_server(app, port, &bind).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingredient_add() {
        let cli = Cli::parse_from(["larder", "--local", "ingredients", "add", "Flour", "-u", "g"]);
        assert!(cli.local);
        match cli.command {
            Commands::Ingredients {
                command:
                    IngredientCommands::Add {
                        name,
                        unit,
                        category,
                        json,
                    },
            } => {
                assert_eq!(name, "Flour");
                assert_eq!(unit.as_deref(), Some("g"));
                assert!(category.is_none());
                assert!(!json);
            }
            _ => panic!("expected ingredients add"),
        }
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::parse_from(["larder", "serve"]);
        match cli.command {
            Commands::Serve { port, bind } => {
                assert_eq!(port, 8080);
                assert_eq!(bind, "127.0.0.1");
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_local_flag_selects_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("larder.db"),
            config_path: dir.path().join("config.toml"),
            supabase: Some(config::SupabaseSettings {
                url: "https://example.supabase.co".to_string(),
                anon_key: "key".to_string(),
            }),
        };
        open_backend(&config, true).unwrap();
        assert!(config.db_path.exists());
    }
}
