use anyhow::Result;
use clap::{Parser, Subcommand};
use portal_links::db::{migrate, Db};
use portal_links::error::PortalError;
use portal_links::server::HttpServer;
use portal_links::service::Portal;
use portal_links::Config;

#[derive(Parser, Debug)]
#[command(name = "portal-links")]
#[command(about = "Entity relationship service for the tenant committee portal")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Apply migrations and verify the database against the entity registry
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.portal.log_level.as_str())
    ).init();

    log::info!("Starting Portal Links v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    let portal = Portal::new(db.clone(), config.guest_permissions()?);
    portal.init(config.migrations_dir()).await?;

    match args.command.unwrap_or(Command::Verify) {
        Command::Serve => {
            let server = HttpServer::new(portal, config.http_server.clone());
            server.run().await?;
        }
        Command::Verify => {
            verify_database(&db).await?;
            let dangling = portal.dangling_edges().await?;
            if dangling.is_empty() {
                log::info!("✓ No dangling relationships");
            } else {
                log::warn!(
                    "{} relationship(s) point at deleted entities; run link-stats --dangling for details",
                    dangling.len()
                );
            }
        }
    }

    Ok(())
}

/// Check pragmas, migrations and file integrity
async fn verify_database(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let applied = migrate::get_applied_migrations(conn)?;
        if applied.is_empty() {
            return Err(PortalError::Config("No migrations applied".to_string()));
        }
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            return Err(PortalError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("✓ Journal mode: WAL");

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(PortalError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("✓ Database verification complete");
    Ok(())
}
