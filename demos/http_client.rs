use gql_client::http::Connection;
use graphql_client::GraphQLQuery;
use std::env;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "demos/graphql/schema.graphql",
    query_path = "demos/graphql/todos.graphql",
    response_derives = "Debug"
)]
pub struct TodosQuery;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "demos/graphql/schema.graphql",
    query_path = "demos/graphql/create_todo.graphql",
    response_derives = "Debug"
)]
pub struct CreateTodo;

#[tokio::main]
async fn main() -> Result<(), gql_client::HttpConnectionError> {
    tracing_subscriber::fmt()
        .with_env_filter("info,gql_client=debug")
        .init();

    let api_url =
        env::var("API_URL").unwrap_or_else(|_| String::from("http://localhost:8080/graphql"));

    let conn = Connection::new(api_url)?;
    let client = conn.into_client();

    let res = client
        .mutate::<CreateTodo>(create_todo::Variables {
            text: "try gql-client".into(),
        })
        .await?;
    println!("Created: {:#?}", res.create_todo);

    let res = client
        .query::<TodosQuery>(todos_query::Variables { done: Some(false) })
        .await?;
    println!("Open todos: {:#?}", res.todos);
    Ok(())
}
