use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use shared::{
    citation::{bibtex, format_citation, CitationStyle},
    protocol::Article,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod sitemap;

#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Writes sitemap.xml for the public site.
    Sitemap {
        #[arg(long)]
        domain: String,
        #[arg(long, default_value = "sitemap.xml")]
        output: PathBuf,
        /// Defaults to the journal's public pages.
        #[arg(long, value_delimiter = ',')]
        routes: Vec<String>,
        /// YYYY-MM-DD; today when omitted.
        #[arg(long)]
        lastmod: Option<NaiveDate>,
    },
    /// Prints a reference for an article JSON record.
    Cite {
        #[arg(long, default_value_t = CitationStyle::Apa)]
        style: CitationStyle,
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "JAEDP")]
        journal: String,
    },
    Bibtex {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "JAEDP")]
        journal: String,
    },
}

fn read_article(path: &Path) -> Result<Article> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not an article record", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Sitemap {
            domain,
            output,
            routes,
            lastmod,
        } => {
            let routes = if routes.is_empty() {
                sitemap::DEFAULT_ROUTES.iter().map(|r| r.to_string()).collect()
            } else {
                routes
            };
            let lastmod = lastmod.unwrap_or_else(|| Utc::now().date_naive());
            let xml = sitemap::build_sitemap(&domain, &routes, lastmod);
            std::fs::write(&output, xml)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), routes = routes.len(), "sitemap written");
        }
        Command::Cite {
            style,
            input,
            journal,
        } => {
            let article = read_article(&input)?;
            println!("{}", format_citation(&article, style, &journal));
            if let Some(pdf) = article.pdf_path() {
                println!("PDF: {pdf}");
            }
        }
        Command::Bibtex { input, journal } => {
            let article = read_article(&input)?;
            print!("{}", bibtex(&article, &journal));
        }
    }

    Ok(())
}
