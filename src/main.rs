use std::path::PathBuf;

mod analysis;
mod app;
mod config;
mod db;
mod error;
mod feed;
mod importer;
mod jobs;
mod models;
mod services;
mod text;

#[cfg(test)]
mod testing;

use app::App;
use config::Config;
use error::Result;
use importer::ImportRequest;

const USAGE: &str = "\
Usage: blog-archiver <command>

  --feed URL...                 import live feeds plus their archived snapshots
  --history API_BASE FEED_URL   import a feed's full history from a history service
  --file PATH                   import an export file
  --summarize                   summarize every post without a summary
  --similar POST_ID [N]         list posts similar to POST_ID
  --search QUERY                full-text search
  --list                        list archived blogs
  --export BLOG_ID PATH         write a blog to an export file
  --delete BLOG_ID              delete a blog and all of its posts
  --mark-read POST_ID [SECS]    record a reading session";

enum Command {
    Import(Vec<ImportRequest>),
    Summarize,
    Similar { post_id: String, n: usize },
    Search(String),
    List,
    Export { blog_id: String, path: PathBuf },
    Delete(String),
    MarkRead { post_id: String, seconds: u64 },
}

fn parse_args(args: &[String]) -> Option<Command> {
    let flag = args.get(1)?.as_str();
    let rest = &args[2..];

    let command = match (flag, rest) {
        ("--feed", urls) if !urls.is_empty() => Command::Import(
            urls.iter()
                .map(|u| ImportRequest::Wayback { feed_url: u.clone() })
                .collect(),
        ),
        ("--history", [api_base, feed_url]) => Command::Import(vec![ImportRequest::HistoryApi {
            api_base: api_base.clone(),
            feed_url: feed_url.clone(),
        }]),
        ("--file", [path]) => Command::Import(vec![ImportRequest::File {
            path: PathBuf::from(path),
        }]),
        ("--summarize", []) => Command::Summarize,
        ("--similar", [post_id]) => Command::Similar { post_id: post_id.clone(), n: 5 },
        ("--similar", [post_id, n]) => Command::Similar {
            post_id: post_id.clone(),
            n: n.parse().ok()?,
        },
        ("--search", words) if !words.is_empty() => Command::Search(words.join(" ")),
        ("--list", []) => Command::List,
        ("--export", [blog_id, path]) => Command::Export {
            blog_id: blog_id.clone(),
            path: PathBuf::from(path),
        },
        ("--delete", [blog_id]) => Command::Delete(blog_id.clone()),
        ("--mark-read", [post_id]) => Command::MarkRead { post_id: post_id.clone(), seconds: 0 },
        ("--mark-read", [post_id, seconds]) => Command::MarkRead {
            post_id: post_id.clone(),
            seconds: seconds.parse().ok()?,
        },
        _ => return None,
    };
    Some(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load()?;
    let app = App::new(config).await?;

    match command {
        Command::Import(requests) => {
            let jobs = app.run_imports(requests).await;
            let failed = jobs.iter().filter(|j| j.error.is_some()).count();
            for job in jobs.iter().filter(|j| j.error.is_none()) {
                println!(
                    "Imported {} ({} posts) as blog {}",
                    job.title,
                    job.imported_items,
                    job.blog_id.as_deref().unwrap_or("?")
                );
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Summarize => {
            let report = app.summarize_backlog().await?;
            println!("Summarized {} posts ({} failed)", report.summarized, report.failed);
        }
        Command::Similar { post_id, n } => {
            for hit in app.similar(&post_id, n).await? {
                println!("{:.3}  {}", hit.score, hit.post_id);
            }
        }
        Command::Search(query) => {
            for hit in app.search(&query).await? {
                println!("{}  {}  {}", hit.post_id, hit.title, hit.link);
            }
        }
        Command::List => {
            for blog in app.blogs().await? {
                let range = match (blog.earliest_post, blog.latest_post) {
                    (Some(first), Some(last)) => {
                        format!("{} to {}", first.format("%Y-%m-%d"), last.format("%Y-%m-%d"))
                    }
                    _ => "undated".to_string(),
                };
                println!(
                    "{}  {} ({} posts, {} words, {}, via {})",
                    blog.id, blog.title, blog.post_count, blog.total_words, range, blog.import_source
                );
            }
        }
        Command::Export { blog_id, path } => {
            let count = app.export(&blog_id, &path).await?;
            println!("Exported {} posts to {}", count, path.display());
        }
        Command::Delete(blog_id) => {
            app.delete(&blog_id).await?;
            println!("Deleted blog {}", blog_id);
        }
        Command::MarkRead { post_id, seconds } => {
            app.mark_read(&post_id, seconds).await;
        }
    }

    Ok(())
}
