//! Multi-turn streaming chat with whichever provider the environment configures.
//!
//! ```sh
//! PROVIDER_TYPE=google GOOGLE_CLOUD_PROJECT=my-project cargo run --example chat_session
//! ```

use tracing_subscriber::EnvFilter;
use unichat::{CancellationToken, Message, Part, ProviderFactory, Session, StreamItem};

fn default_model(provider: &str) -> &'static str {
    match provider {
        "OpenAI" => "gpt-4o-mini",
        "Anthropic" => "claude-sonnet-4@20250514",
        _ => "gemini-2.5-flash",
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let provider = ProviderFactory::from_env().await?;
    let model =
        std::env::var("MODEL").unwrap_or_else(|_| default_model(provider.name()).to_string());
    println!("=== Chatting with {} ({model}) ===", provider.name());

    let mut session = Session::new(model)
        .with_history(vec![Message::system("You are a concise assistant.")])
        .with_provider(provider);
    let cancel = CancellationToken::new();

    for question in [
        "What is the capital of France?",
        "And roughly how many people live there?",
    ] {
        println!("\nUser: {question}");
        print!("AI: ");
        let mut stream = session.send_stream(&cancel, [Part::text(question)]).await?;
        while let StreamItem::Delta(delta) = stream.next().await? {
            print!("{}", delta.text());
        }
        println!();
    }

    println!("\n=== Session JSON ===");
    println!("{}", session.to_json()?);
    Ok(())
}
