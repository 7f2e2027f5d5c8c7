use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::spoonacular::SpoonacularClient;
use larder_core::models::ExternalRecipeSummary;

use super::helpers::truncate;

pub(crate) async fn cmd_search(
    recipes: &SpoonacularClient,
    query: &str,
    limit: i64,
    offset: i64,
    json: bool,
) -> Result<()> {
    let query = query.trim();
    let results = recipes.search_async(query, limit, offset).await?;

    if results.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found for '{query}'");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_summaries(&results);
        eprintln!("\nSave one with: larder saved add <ID>");
    }

    Ok(())
}

fn print_summaries(results: &[ExternalRecipeSummary]) {
    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
    }

    let rows: Vec<SummaryRow> = results
        .iter()
        .enumerate()
        .map(|(i, r)| SummaryRow {
            idx: i + 1,
            id: r.external_id,
            title: truncate(&r.title, 60),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(0..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
