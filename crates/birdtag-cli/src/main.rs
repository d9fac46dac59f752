//! Birdtag CLI, a command-line client for the Birdtag API.
//!
//! The base URL comes from `--base-url`, BIRDTAG_API_URL or API_URL. The
//! user comes from `--user` or BIRDTAG_USER.

use anyhow::Context;
use birdtag_cli::{init_tracing, parse_edit_tag, parse_search_arg, ApiClient, DEFAULT_BASE_URL};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "birdtag", about = "Birdtag API CLI")]
struct Cli {
    /// API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// User identity sent with every request
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find media carrying every tag with at least the given count
    Search {
        /// `tag=count` or a bare `tag`
        #[arg(required = true)]
        constraints: Vec<String>,
    },
    /// Add or remove tags on stored media
    Tags {
        #[command(subcommand)]
        sub: TagCommands,
    },
    /// Delete media by URL, together with its tags and files
    Delete {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// List the tag rows of a single media item
    TagsOf { media_id: String },
}

#[derive(Subcommand)]
enum TagCommands {
    /// Add tags, replacing the count of existing ones
    Add(TagEditArgs),
    /// Remove tags
    Remove(TagEditArgs),
}

#[derive(clap::Args)]
struct TagEditArgs {
    /// Media or thumbnail URL (repeatable)
    #[arg(long = "url")]
    urls: Vec<String>,

    /// Media ID (repeatable)
    #[arg(long = "id")]
    media_ids: Vec<String>,

    /// `name,count` tokens
    #[arg(required = true)]
    tags: Vec<String>,
}

impl TagEditArgs {
    fn validated_tags(&self) -> anyhow::Result<Vec<String>> {
        if self.urls.is_empty() && self.media_ids.is_empty() {
            anyhow::bail!("Pass at least one --url or --id");
        }
        self.tags.iter().map(|t| parse_edit_tag(t)).collect()
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let base_url = cli
        .base_url
        .or_else(|| std::env::var("BIRDTAG_API_URL").ok())
        .or_else(|| std::env::var("API_URL").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let user = cli
        .user
        .or_else(|| std::env::var("BIRDTAG_USER").ok())
        .context("Missing user. Pass --user or set BIRDTAG_USER")?;

    let client = ApiClient::new(base_url, user)?;
    tracing::debug!(base_url = %client.base_url(), "Using Birdtag API");

    let response = match cli.command {
        Commands::Search { constraints } => {
            let pairs = constraints
                .iter()
                .map(|c| parse_search_arg(c))
                .collect::<anyhow::Result<Vec<_>>>()?;
            client.search(&pairs).await?
        }
        Commands::Tags { sub } => {
            let (args, operation) = match sub {
                TagCommands::Add(args) => (args, 1),
                TagCommands::Remove(args) => (args, 0),
            };
            let tags = args.validated_tags()?;
            client
                .edit_tags(&args.urls, &args.media_ids, &tags, operation)
                .await?
        }
        Commands::Delete { urls } => client.delete_media(&urls).await?,
        Commands::TagsOf { media_id } => client.tags_of(&media_id).await?,
    };

    print_json(&response)
}
