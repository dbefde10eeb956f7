//! Remote qualified-segment lookup against the ODP GraphQL endpoint.
use async_trait::async_trait;
use serde::Deserialize;

use crate::{Error, Result};

const QUERY: &str = "query($userId: String, $audiences: [String]) \
    {customer(fs_user_id: $userId) \
    {audiences(subset: $audiences) {edges {node {name state}}}}}";

/// Resolves which of the given segments a user qualifies for.
#[async_trait]
pub trait QualifiedSegmentsFetcher: Send + Sync {
    async fn fetch(
        &self,
        api_key: &str,
        api_host: &str,
        user_id: &str,
        segments_to_check: &[String],
    ) -> Result<Vec<String>>;
}

/// The production fetcher: `POST {api_host}/v3/graphql`.
#[derive(Debug)]
pub struct GraphqlSegmentsFetcher {
    client: reqwest::Client,
}

impl GraphqlSegmentsFetcher {
    pub fn new() -> GraphqlSegmentsFetcher {
        GraphqlSegmentsFetcher {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for GraphqlSegmentsFetcher {
    fn default() -> GraphqlSegmentsFetcher {
        GraphqlSegmentsFetcher::new()
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct ErrorExtensions {
    #[serde(default)]
    classification: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    customer: Option<Customer>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    audiences: Option<Audiences>,
}

#[derive(Debug, Deserialize)]
struct Audiences {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct Node {
    name: String,
    #[serde(default)]
    state: String,
}

#[async_trait]
impl QualifiedSegmentsFetcher for GraphqlSegmentsFetcher {
    async fn fetch(
        &self,
        api_key: &str,
        api_host: &str,
        user_id: &str,
        segments_to_check: &[String],
    ) -> Result<Vec<String>> {
        if segments_to_check.is_empty() {
            log::debug!(target: "flagship",
                        user_id;
                        "no segments to check, skipping the fetch");
            return Ok(Vec::new());
        }

        let url = url::Url::parse(api_host)
            .and_then(|base| base.join("/v3/graphql"))
            .map_err(Error::InvalidApiHost)?;
        let body = serde_json::json!({
            "query": QUERY,
            "variables": {
                "userId": user_id,
                "audiences": segments_to_check,
            },
        });

        let response: GraphqlResponse = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_response(response)
    }
}

fn parse_response(response: GraphqlResponse) -> Result<Vec<String>> {
    if let Some(errors) = response.errors {
        let invalid_identifier = errors.iter().any(|e| {
            e.extensions
                .as_ref()
                .is_some_and(|x| x.classification == "INVALID_IDENTIFIER_EXCEPTION")
        });
        if invalid_identifier {
            return Err(Error::InvalidSegmentIdentifier);
        }
        let reason = errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown GraphQL error".to_owned());
        return Err(Error::FetchSegmentsFailed(reason));
    }

    let audiences = response
        .data
        .and_then(|d| d.customer)
        .and_then(|c| c.audiences)
        .ok_or_else(|| {
            Error::FetchSegmentsFailed("response is missing customer audiences".to_owned())
        })?;

    Ok(audiences
        .edges
        .into_iter()
        .filter(|edge| edge.node.state == "qualified")
        .map(|edge| edge.node.name)
        .collect())
}
