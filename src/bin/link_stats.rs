use anyhow::Result;
use clap::Parser;
use portal_links::db::Db;
use portal_links::service::Portal;
use portal_links::Config;

#[derive(Parser, Debug)]
#[command(name = "link-stats")]
#[command(about = "Relationship counts per entity type pair")]
struct Args {
    /// Also list relationships whose counterpart no longer exists
    #[arg(short, long)]
    dangling: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "warn")
    ).init();

    let args = Args::parse();
    let config = Config::load()?;
    let portal = Portal::new(Db::new(config.db_path()), config.guest_permissions()?);

    let counts = portal.edge_counts().await?;

    println!("\n=== Portal Link Statistics ===\n");
    if counts.is_empty() {
        println!("No relationships stored yet.");
    } else {
        println!("{:<20} {:<20} {:>8}", "Type", "Type", "Links");
        println!("{:-<50}", "");
        for row in &counts {
            println!("{:<20} {:<20} {:>8}", row.first, row.second, row.count);
        }
        println!("{:-<50}", "");
        println!("{:<41} {:>8}", "Total", counts.iter().map(|r| r.count).sum::<i64>());
    }

    if args.dangling {
        let dangling = portal.dangling_edges().await?;
        println!("\nDangling relationships: {}", dangling.len());
        for edge in &dangling {
            println!("  {}  missing {}", edge.edge_id, edge.missing);
        }
    }

    Ok(())
}
