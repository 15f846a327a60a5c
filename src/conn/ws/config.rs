use reqwest::header::HeaderMap;

#[derive(Debug)]
pub(super) struct Config {
    pub api_url: String,
    pub headers: HeaderMap,
    pub diagnostics_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: String::from("ws://localhost:8080/graphql"),
            headers: HeaderMap::new(),
            diagnostics_capacity: 16,
        }
    }
}
