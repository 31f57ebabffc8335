//! Graph database connectivity smoke test: open a driver, run one read,
//! print what comes back. Credentials come from the config file or the
//! `DB_URI`/`DB_USR`/`DB_PWD` environment variables.

use config::GleanConfig;
use neo4rs::{Graph, query};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conf = GleanConfig::get_or_default();
    let graph = Graph::new(&conf.graph.uri, &conf.graph.user, &conf.graph.password).await?;

    let mut rows = graph
        .execute(query("RETURN 'Connection successful!' AS message"))
        .await?;
    while let Some(row) = rows.next().await? {
        let message: String = row.get("message")?;
        println!("{message}");
    }

    Ok(())
}
