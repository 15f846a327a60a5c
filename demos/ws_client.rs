use futures::StreamExt;
use gql_client::{GraphqlClient, SubscriptionDiagnostic};
use graphql_client::GraphQLQuery;
use std::env;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "demos/graphql/schema.graphql",
    query_path = "demos/graphql/todo_added.graphql",
    response_derives = "Debug"
)]
pub struct TodoAdded;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info,gql_client=debug")
        .init();

    let api_url =
        env::var("API_URL").unwrap_or_else(|_| String::from("http://localhost:8080/graphql"));

    let client = GraphqlClient::builder(api_url).build()?;
    let mut todos = client.subscribe::<TodoAdded>(todo_added::Variables).await?;

    let mut diagnostics = todos.handle().diagnostics();
    tokio::spawn(async move {
        while let Some(diagnostic) = diagnostics.next().await {
            if let SubscriptionDiagnostic::Decode { message } = diagnostic {
                eprintln!("Skipped a result: {}", message);
            }
        }
    });

    while let Some(todo) = todos.next().await {
        println!("Added: {:#?}", todo.todo_added);
    }

    println!("Subscription ended in state {:?}", todos.state());
    Ok(())
}
