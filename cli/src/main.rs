mod client;
mod seed;
mod sse;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recipebox_core::methods::{FAVORITES_ADD, FAVORITES_REMOVE, RECIPES_INSERT, RECIPES_REMOVE};
use recipebox_core::{
    navigate, Channel, Document, Favorite, FavoritesView, ListState, MethodCaller, Navigation,
    Recipe, RecipeListView, Stored,
};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::client::Client;

#[derive(Parser)]
#[command(name = "recipebox")]
#[command(about = "Recipebox CLI", long_about = None)]
struct Cli {
    /// Server URL
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    server: String,

    /// Session token from `signup` or `login`
    #[arg(long, global = true, env = "RECIPEBOX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the server (authenticated when a token is given)
    Ping,
    /// Create an account and print its session token
    Signup { username: String, password: String },
    /// Log in and print a session token
    Login { username: String, password: String },
    /// Show the current user and roles
    Whoami,
    /// List recipes matching a search term
    Search {
        #[arg(default_value = "")]
        term: String,
    },
    /// Keep a filtered recipe list on screen, updating as recipes change
    Watch {
        #[arg(default_value = "")]
        term: String,
    },
    /// Add a recipe from a JSON file
    Add { file: PathBuf },
    /// Remove a recipe (admin only)
    Remove { id: Uuid },
    /// Mark a recipe as a favorite
    Favorite { id: Uuid },
    /// Unmark a favorite recipe
    Unfavorite { id: Uuid },
    /// List your favorite recipes
    Favorites,
    /// Show what the app would do when navigating to a path
    Open { path: String },
    /// Create a user and sample recipes
    Seed {
        /// Username for the seed user
        #[arg(long)]
        username: String,
        /// Password for the seed user
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.server, cli.token);

    match cli.command {
        Commands::Ping => ping(&client).await?,
        Commands::Signup { username, password } => {
            println!("{}", client.signup(&username, &password).await?);
        }
        Commands::Login { username, password } => {
            println!("{}", client.login(&username, &password).await?);
        }
        Commands::Whoami => {
            let me = client.me().await?;
            println!("{} ({})", me.username, me.user_id);
            if !me.roles.is_empty() {
                println!("roles: {}", me.roles.join(", "));
            }
        }
        Commands::Search { term } => search(&client, &term).await?,
        Commands::Watch { term } => watch(&client, &term).await?,
        Commands::Add { file } => add(&client, &file).await?,
        Commands::Remove { id } => {
            let result = client.call(RECIPES_REMOVE, json!(id)).await?;
            if result["removed"] == json!(true) {
                println!("Removed {}", id);
            } else {
                println!("No recipe {}", id);
            }
        }
        Commands::Favorite { id } => {
            client.call(FAVORITES_ADD, json!({ "recipe_id": id })).await?;
            println!("Added {} to favorites", id);
        }
        Commands::Unfavorite { id } => {
            client.call(FAVORITES_REMOVE, json!({ "recipe_id": id })).await?;
            println!("Removed {} from favorites", id);
        }
        Commands::Favorites => favorites(&client).await?,
        Commands::Open { path } => open(&client, &path).await?,
        Commands::Seed { username, password } => {
            seed::seed(&client, &username, &password).await?;
        }
    }

    Ok(())
}

async fn ping(client: &Client) -> Result<()> {
    println!("{}", client.unauthed_ping().await?);
    if client.session().await?.user_id.is_some() {
        println!("{}", client.ping().await?);
    }
    Ok(())
}

fn print_recipes(recipes: &[Stored<Recipe>]) {
    if recipes.is_empty() {
        println!("(no recipes)");
    }
    for recipe in recipes {
        println!("{}  {}  [{}, {}]", recipe.id, recipe.name, recipe.time, recipe.cost);
        println!("    {}", recipe.ingredients.join(", "));
    }
}

async fn list_view(client: &Client, term: &str) -> Result<RecipeListView> {
    let recipes = client
        .subscribe::<Recipe>(&Channel::User.name(Recipe::COLLECTION))
        .await?;
    if !recipes.wait_ready().await {
        anyhow::bail!("Publication closed before it was ready");
    }
    let mut view = RecipeListView::new(recipes, Arc::new(client.clone()));
    view.set_search_term(term);
    Ok(view)
}

async fn search(client: &Client, term: &str) -> Result<()> {
    let mut view = list_view(client, term).await?;
    print_recipes(view.render().recipes());
    Ok(())
}

async fn watch(client: &Client, term: &str) -> Result<()> {
    let mut view = list_view(client, term).await?;
    loop {
        match view.render() {
            ListState::Loading => println!("Loading..."),
            ListState::Ready(recipes) => {
                println!("--- {} matching {:?} ---", recipes.len(), term);
                print_recipes(recipes);
            }
        }
        tokio::select! {
            _ = view.changed() => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn add(client: &Client, file: &PathBuf) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: Value = serde_json::from_str(&text).context("Recipe file is not valid JSON")?;
    let stored = client.call(RECIPES_INSERT, document).await?;
    println!("Added {}", stored["id"]);
    Ok(())
}

async fn favorites(client: &Client) -> Result<()> {
    let recipes = client
        .subscribe::<Recipe>(&Channel::User.name(Recipe::COLLECTION))
        .await?;
    let marks = client
        .subscribe::<Favorite>(&Channel::User.name(Favorite::COLLECTION))
        .await?;
    if !(recipes.wait_ready().await && marks.wait_ready().await) {
        anyhow::bail!("Publication closed before it was ready");
    }
    let mut view = FavoritesView::new(recipes, marks, Arc::new(client.clone()));
    print_recipes(view.render().recipes());
    Ok(())
}

async fn open(client: &Client, path: &str) -> Result<()> {
    let session = client.session().await?;
    match navigate(path, &session) {
        Navigation::Render(route) => println!("render {:?}", route),
        Navigation::Redirect(to) => println!("redirect {}", to),
        Navigation::Loading => println!("loading"),
        Navigation::NotFound(path) => println!("not found: {}", path),
    }
    Ok(())
}
