//! Function calling through a chat session, with the tool schema derived from a Rust type.

use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use unichat::{CancellationToken, Definition, Options, Part, ProviderFactory, Session};

/// Arguments of the `get_weather` tool.
#[derive(Debug, Deserialize, JsonSchema)]
struct WeatherQuery {
    /// The city and country, e.g. Paris, France
    location: String,
    /// "celsius" or "fahrenheit"
    unit: Option<String>,
}

fn get_weather(query: &WeatherQuery) -> String {
    let unit = query.unit.as_deref().unwrap_or("celsius");
    format!("It is sunny and 22 degrees {unit} in {}.", query.location)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let provider = ProviderFactory::from_env().await?;
    let model = std::env::var("MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
    let options = Options::new().tool(Definition::from_type::<WeatherQuery>(
        "get_weather",
        "Get the current weather for a location",
    )?);

    let mut session = Session::new(model).with_provider(provider);
    let cancel = CancellationToken::new();

    println!("=== Function Calling Example ===");
    let mut response = session
        .send_with_options(&cancel, [Part::text("What's the weather like in Paris?")], &options)
        .await?;

    while !response.tool_calls().is_empty() {
        let mut results = Vec::new();
        for call in response.tool_calls() {
            println!("[Function call: {} with args: {}]", call.name, call.arguments);
            let query: WeatherQuery = serde_json::from_str(&call.arguments)?;
            results.push(Part::tool_result(&call.id, &call.name, get_weather(&query)));
        }
        response = session.send_with_options(&cancel, results, &options).await?;
    }

    println!("AI: {}", response.text());
    Ok(())
}
