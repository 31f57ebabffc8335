use ai::{ChatMessage, LlmClient, Role, strip_code_fences};
use config::GleanConfig;
use serde::Deserialize;

/// The shape the model is asked to fill in.
#[derive(Debug, Deserialize)]
struct Brief {
    summary: String,
    key_points: Vec<String>,
    example: String,
}

const FORMAT_INSTRUCTIONS: &str = r#"Respond with a JSON object, and nothing else, shaped as:
{
  "summary": "a brief summary of the topic",
  "key_points": ["list of key points about the topic"],
  "example": "an example related to the topic"
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conf = GleanConfig::get_or_default();

    let topic = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let topic = if topic.is_empty() {
        "artificial intelligence".to_string()
    } else {
        topic
    };

    let client = LlmClient::new(&conf.ai);
    let messages = [
        ChatMessage::new(
            Role::System,
            "You answer in exactly the JSON shape you are given.",
        ),
        ChatMessage::new(
            Role::User,
            format!(
                "Provide information about {topic}. Please structure your response as follows:\n{FORMAT_INSTRUCTIONS}"
            ),
        ),
    ];

    let reply = client.complete(&messages).await?;
    let brief = parse_brief(&reply)?;

    println!("Summary: {}", brief.summary);
    println!("\nKey Points:");
    for point in &brief.key_points {
        println!("- {point}");
    }
    println!("\nExample: {}", brief.example);

    Ok(())
}

/// Pull the JSON object out of the reply, tolerating fences and
/// surrounding prose.
fn parse_brief(reply: &str) -> anyhow::Result<Brief> {
    let body = strip_code_fences(reply);
    let body = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    };
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{"summary":"short","key_points":["a","b"],"example":"e.g."}"#;

    #[test]
    fn parses_bare_json() {
        let brief = parse_brief(REPLY).unwrap();
        assert_eq!(brief.summary, "short");
        assert_eq!(brief.key_points, vec!["a", "b"]);
        assert_eq!(brief.example, "e.g.");
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let reply = format!("Here you go:\n```json\n{REPLY}\n```\nAnything else?");
        // Fences survive the surrounding prose, so the brace scan does the work.
        let brief = parse_brief(&reply).unwrap();
        assert_eq!(brief.summary, "short");
    }

    #[test]
    fn rejects_replies_without_json() {
        assert!(parse_brief("I would rather not.").is_err());
    }
}
