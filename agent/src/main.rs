use std::io::{BufRead, Write};

use ai::{Chain, ChatMessage, Conversation, LlmClient, PromptTemplate, Role};
use config::GleanConfig;

const DESTINATION_TEMPLATE: &str = "Your role is travel assistant. You are tasked to provide a \
list of the best travel destinations for someone interested in {interests}.";

const HOTEL_TEMPLATE: &str = "Please book a 4-star hotel in {destination}.";

const ITINERARY_TEMPLATE: &str = "\
Your role is travel assistant. You are tasked to create a detailed 3-day travel itinerary for \
{destination}. Do not list destinations you are unsure about; if you don't know one, say so.
Format your response by day:
    Day 1: Explore {destination}'s landmarks.
    Day 2: List famous local cuisine to taste.
    Day 3: List relaxation and leisure activities.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Destination,
    Hotel,
    Itinerary,
    Chat,
}

/// Keyword routing, checked in order; the first match wins.
fn route(input: &str) -> Branch {
    if input.contains("recommend") {
        Branch::Destination
    } else if input.contains("book") {
        Branch::Hotel
    } else if input.contains("itinerary") {
        Branch::Itinerary
    } else {
        Branch::Chat
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conf = GleanConfig::get_or_default();
    let client = LlmClient::new(&conf.ai);

    let destinations = Chain::new(client.clone(), PromptTemplate::new(DESTINATION_TEMPLATE));
    let hotels = Chain::new(client.clone(), PromptTemplate::new(HOTEL_TEMPLATE));
    let itineraries = Chain::new(client.clone(), PromptTemplate::new(ITINERARY_TEMPLATE));

    // One memory shared by every branch, so follow-ups can refer back.
    let mut memory = Conversation::with_system_prompt("You are a helpful travel assistant.");

    println!("Welcome to the AI Travel Assistant!");
    let stdin = std::io::stdin();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        let response = match route(input) {
            Branch::Destination => destinations.run(&mut memory, &[("interests", input)]).await,
            Branch::Hotel => hotels.run(&mut memory, &[("destination", input)]).await,
            Branch::Itinerary => itineraries.run(&mut memory, &[("destination", input)]).await,
            Branch::Chat => {
                // Only record the turn once it has an answer, so a failed
                // request doesn't leave a dangling question in the history.
                let mut messages = memory.messages().to_vec();
                messages.push(ChatMessage::new(Role::User, input));
                let reply = client.complete(&messages).await;
                if let Ok(reply) = &reply {
                    memory.push(Role::User, input);
                    memory.push(Role::Assistant, reply.clone());
                }
                reply
            }
        };

        match response {
            Ok(reply) => println!("Assistant: {reply}"),
            Err(error) => eprintln!("error: {error}"),
        }
    }

    Ok(())
}
