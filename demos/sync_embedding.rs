use embedding_client::{Client, EmbeddingRequest};

fn main() -> Result<(), embedding_client::Error> {
    let client = Client::new()?;

    let request = EmbeddingRequest {
        input: "Hello".into(),
        api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
        ..Default::default()
    };

    let response = client.request_embedding(&request)?;
    println!("{:?}", response.vectors());

    Ok(())
}
