use std::collections::HashMap;

use ai::{Chain, Conversation, LlmClient, PromptTemplate, strip_code_fences};
use config::GleanConfig;
use db::{Database, PostgresDatabase};

const SQL_TEMPLATE: &str = "\
Based on the table schema below, write a SQL query that would answer the \
user's question. Reply with the query alone.

{schema}

Question: {question}";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conf = GleanConfig::get_or_default();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let question = if question.is_empty() {
        "How many customers are there per country?".to_string()
    } else {
        question
    };

    let database = PostgresDatabase::connect(&conf.database).await?;
    let schema = format_schema(&database.schema().await?);
    tracing::info!(tables = schema.lines().count(), "schema loaded");

    let client = LlmClient::new(&conf.ai);
    let chain = Chain::new(client, PromptTemplate::new(SQL_TEMPLATE));
    let mut memory = Conversation::new();

    let reply = chain
        .run(&mut memory, &[("schema", &schema), ("question", &question)])
        .await?;
    let statement = strip_code_fences(&reply);
    println!("-- {statement}");

    let result = database.fetch(statement, &[]).await;
    database.close().await;

    for row in result? {
        println!("{}", serde_json::to_string(&row)?);
    }

    Ok(())
}

/// One line per table: `name(column type, ...)`, sorted so the prompt is
/// stable across runs.
fn format_schema(schema: &HashMap<String, Vec<(String, String)>>) -> String {
    let mut tables: Vec<_> = schema.iter().collect();
    tables.sort_by(|a, b| a.0.cmp(b.0));

    tables
        .iter()
        .map(|(table, columns)| {
            let columns = columns
                .iter()
                .map(|(name, column_type)| format!("{name} {column_type}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{table}({columns})")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lines_are_sorted_and_compact() {
        let mut schema = HashMap::new();
        schema.insert(
            "customer".to_string(),
            vec![
                ("id".to_string(), "int4".to_string()),
                ("country".to_string(), "text".to_string()),
            ],
        );
        schema.insert(
            "album".to_string(),
            vec![("title".to_string(), "text".to_string())],
        );

        assert_eq!(
            format_schema(&schema),
            "album(title text)\ncustomer(id int4, country text)"
        );
    }
}
