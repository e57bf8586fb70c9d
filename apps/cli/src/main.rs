use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{view, AuthSession, HttpRecipeApi, RecipeListController};
use shared::domain::TagId;
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: String,
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Tag ids to toggle off before the first fetch.
    #[arg(long = "exclude-tag")]
    exclude_tags: Vec<i64>,
    /// Print the derived home view as JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let session = Arc::new(AuthSession::new());
    let api = Arc::new(HttpRecipeApi::new(&args.server_url, Arc::clone(&session))?);
    let controller = RecipeListController::new(api);

    controller.load_tags().await?;
    for tag_id in args.exclude_tags {
        controller.toggle_tag(TagId(tag_id)).await?;
    }
    if args.page != 1 {
        controller.set_page(args.page).await?;
    }
    controller.sync().await?;

    let snapshot = controller.snapshot().await;
    info!(
        page = snapshot.current_page,
        total_count = snapshot.total_count,
        "recipe page loaded"
    );

    let home = view::home_view(&snapshot);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&home)?);
        return Ok(());
    }

    for checkbox in &home.tag_checkboxes {
        let mark = if checkbox.checked { "x" } else { " " };
        println!("[{mark}] {}", checkbox.name);
    }
    for card in &home.cards {
        println!("#{} {} ({} min)", card.id.0, card.name, card.cooking_time);
    }
    println!(
        "page {} of {} ({} recipes total)",
        home.pagination.page, home.pagination.page_count, snapshot.total_count
    );

    Ok(())
}
