mod commands;
mod config;
mod images;
mod notify;
mod server;
mod spoonacular;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    GroceryOptions, cmd_grocery, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_import,
    cmd_recipe_list, cmd_recipe_show, cmd_recipe_update, cmd_saved_add, cmd_saved_list,
    cmd_saved_notes, cmd_saved_remove, cmd_search, cmd_user_add, cmd_user_show, cmd_user_verify,
    require_user,
};
use crate::config::{ApiSettings, Config};
use crate::images::DiskImageStore;
use crate::notify::Notifier;
use crate::spoonacular::SpoonacularClient;
use larder_core::service::LarderService;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Recipes, grocery lists, and the glue in between"
)]
struct Cli {
    /// Account to act as (see `larder user add`)
    #[arg(short, long, global = true, env = "LARDER_USER")]
    user: Option<i64>,

    #[command(flatten)]
    settings: ApiSettings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication
        #[arg(long)]
        no_auth: bool,
    },
    /// Manage accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage your recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Build a grocery list from a recipe and optionally send it
    Grocery {
        /// Recipe ID (a saved-recipe ID with --saved, a Spoonacular ID with --external)
        id: i64,
        /// Treat the ID as a saved recipe
        #[arg(long, conflicts_with = "external")]
        saved: bool,
        /// Treat the ID as a Spoonacular recipe
        #[arg(long)]
        external: bool,
        /// Mark an item as already in the pantry (ingredient ID or c<n>)
        #[arg(long, value_name = "KEY")]
        check: Vec<String>,
        /// Cross an item off the list (ingredient ID or c<n>)
        #[arg(long, value_name = "KEY")]
        cross: Vec<String>,
        /// Attach a note to an item
        #[arg(long, value_name = "KEY=NOTE")]
        note: Vec<String>,
        /// Add an item of your own
        #[arg(long, value_name = "NAME[:QTY[:UNIT]]")]
        add: Vec<String>,
        /// Email the remaining items to your account address
        #[arg(long, conflicts_with = "sms")]
        email: bool,
        /// Text the remaining items to your phone
        #[arg(long)]
        sms: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search Spoonacular for recipes
    Search {
        /// Search query
        query: String,
        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: i64,
        /// Results to skip
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Bookmark Spoonacular recipes
    Saved {
        #[command(subcommand)]
        command: SavedCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account and print its verification code
    Add {
        /// Display name
        name: String,
        /// Email address grocery lists are sent to
        email: String,
        /// Phone number for SMS, e.g. +15551234567
        #[arg(long)]
        phone: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify an account with its code
    Verify {
        /// User ID
        id: i64,
        /// Six-digit verification code
        code: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show an account
    Show {
        /// User ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a recipe
    Create {
        /// Recipe title
        title: String,
        /// Number of servings
        #[arg(short, long, default_value = "1")]
        servings: i64,
        /// Short description
        #[arg(short, long, default_value = "")]
        description: String,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Ingredient, repeatable
        #[arg(short, long = "ingredient", value_name = "NAME[:QTY[:UNIT]]")]
        ingredients: Vec<String>,
        /// Step, repeatable, in order
        #[arg(long = "step", value_name = "TEXT")]
        steps: Vec<String>,
        /// Image file to attach (png, jpg, gif, webp)
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a recipe with the contents of a JSON file
    ///
    /// The file uses the shape printed by `recipe show --json`. Ingredients
    /// keep their `id` to be updated in place; rows without one are added and
    /// stored ingredients missing from the file are removed.
    Update {
        /// Recipe ID
        id: i64,
        /// JSON file with the new recipe contents
        file: PathBuf,
        /// Replace the image with this file
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredients and steps
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your recipes, most recently updated first
    List {
        /// Maximum results
        #[arg(short, long, default_value = "20")]
        limit: i64,
        /// Results to skip
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to .cook file
        file: PathBuf,
        /// Override recipe title
        #[arg(long)]
        title: Option<String>,
        /// Override number of servings
        #[arg(short, long)]
        servings: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SavedCommands {
    /// Save a Spoonacular recipe by ID
    Add {
        /// Spoonacular recipe ID
        external_id: i64,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved recipes
    List {
        /// Maximum results
        #[arg(short, long, default_value = "20")]
        limit: i64,
        /// Results to skip
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the notes on a saved recipe (omit to clear)
    Notes {
        /// Saved recipe ID
        id: i64,
        /// New notes
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a saved recipe
    Remove {
        /// Saved recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "larder=info,larder_core=info,tower_http=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = LarderService::new(&config.db_path)?;
    let images = DiskImageStore::new(&config.images_dir);
    let recipes = SpoonacularClient::new(cli.settings.spoonacular_key.clone())?;
    let user = cli.user;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            let deps = server::ServerDeps {
                service,
                images: Arc::new(images),
                recipes,
                notifier: Notifier::from_settings(&cli.settings)?,
            };
            server::start_server(deps, port, &bind, api_key).await
        }
        Commands::User { command } => match command {
            UserCommands::Add {
                name,
                email,
                phone,
                json,
            } => cmd_user_add(&service, name, email, phone, json),
            UserCommands::Verify { id, code, json } => cmd_user_verify(&service, id, &code, json),
            UserCommands::Show { id, json } => cmd_user_show(&service, id, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                title,
                servings,
                description,
                notes,
                ingredients,
                steps,
                image,
                json,
            } => cmd_recipe_create(
                &service,
                &images,
                require_user(user)?,
                commands::RecipeArgs {
                    title,
                    servings,
                    description,
                    notes,
                    ingredients,
                    steps,
                    image,
                },
                json,
            ),
            RecipeCommands::Update {
                id,
                file,
                image,
                json,
            } => cmd_recipe_update(
                &service,
                &images,
                require_user(user)?,
                id,
                &file,
                image.as_deref(),
                json,
            ),
            RecipeCommands::Show { id, json } => {
                cmd_recipe_show(&service, require_user(user)?, id, json)
            }
            RecipeCommands::List {
                limit,
                offset,
                json,
            } => cmd_recipe_list(&service, require_user(user)?, limit, offset, json),
            RecipeCommands::Delete { id, json } => {
                cmd_recipe_delete(&service, &images, require_user(user)?, id, json)
            }
            RecipeCommands::Import {
                file,
                title,
                servings,
                json,
            } => cmd_recipe_import(&service, require_user(user)?, &file, title, servings, json),
        },
        Commands::Grocery {
            id,
            saved,
            external,
            check,
            cross,
            note,
            add,
            email,
            sms,
            json,
        } => {
            let options = GroceryOptions {
                check,
                cross,
                note,
                add,
                email,
                sms,
                json,
            };
            let notifier = if email || sms {
                Some(Notifier::from_settings(&cli.settings)?)
            } else {
                None
            };
            cmd_grocery(
                &service,
                &recipes,
                notifier.as_ref(),
                user,
                commands::GrocerySource::from_flags(id, saved, external),
                options,
            )
            .await
        }
        Commands::Search {
            query,
            limit,
            offset,
            json,
        } => cmd_search(&recipes, &query, limit, offset, json).await,
        Commands::Saved { command } => match command {
            SavedCommands::Add {
                external_id,
                notes,
                json,
            } => cmd_saved_add(&service, &recipes, require_user(user)?, external_id, notes, json)
                .await,
            SavedCommands::List {
                limit,
                offset,
                json,
            } => cmd_saved_list(&service, require_user(user)?, limit, offset, json),
            SavedCommands::Notes { id, notes, json } => {
                cmd_saved_notes(&service, require_user(user)?, id, notes.as_deref(), json)
            }
            SavedCommands::Remove { id, json } => {
                cmd_saved_remove(&service, require_user(user)?, id, json)
            }
        },
    }
}
