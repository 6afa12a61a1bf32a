mod shape;
mod types;
pub use crate::shape::*;
pub use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use ureq::{
    Agent, SendBody,
    http::{
        Request, StatusCode,
        header::{HeaderValue, InvalidHeaderValue},
    },
    middleware::MiddlewareNext,
};

pub static GRAPHQL_API_URL: &str = "https://api.csgoroll.com/graphql";

// The API sits behind a bot filter that rejects unfamiliar agents.
pub static DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Settings for constructing a [`Client`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    /// URL of the GraphQL endpoint to POST queries to
    pub endpoint: String,

    /// Value of the `User-Agent` header
    pub user_agent: String,

    /// Bearer token to send in an `Authorization` header, if any
    pub token: Option<String>,

    /// Maximum time to spend on a single request, including reading the
    /// response body
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            endpoint: String::from(GRAPHQL_API_URL),
            user_agent: String::from(DEFAULT_USER_AGENT),
            token: None,
            timeout: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Client {
    inner: Agent,
    endpoint: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Client, BuildClientError> {
        let mut builder = Agent::config_builder()
            .https_only(true)
            .http_status_as_error(false)
            .user_agent(config.user_agent)
            .timeout_global(config.timeout);
        if let Some(token) = config.token {
            let auth = HeaderValue::from_str(&format!("Bearer {token}"))?;
            builder = builder.middleware(
                move |mut req: Request<SendBody<'_>>, next: MiddlewareNext<'_>| {
                    let _ = req.headers_mut().insert("Authorization", auth.clone());
                    next.handle(req)
                },
            );
        }
        Ok(Client {
            inner: builder.build().into(),
            endpoint: config.endpoint,
        })
    }
}

impl Transport for Client {
    fn query(&self, payload: &QueryPayload) -> Result<serde_json::Value, QueryError> {
        log::debug!(
            "POST {} operation={} variables={}",
            self.endpoint,
            payload.operation_name,
            serde_json::Value::Object(payload.variables.clone()),
        );
        let response = self
            .inner
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send_json(payload)
            .map_err(|e| QueryError::Http(Box::new(e)))?;
        let status = response.status();
        let bytes = response
            .into_body()
            .read_to_vec()
            .map_err(|e| QueryError::Read(Box::new(e)))?;
        parse_response(status, &bytes)
    }
}

/// A means of sending a [`QueryPayload`] to the server and getting back the
/// decoded response document
pub trait Transport {
    fn query(&self, payload: &QueryPayload) -> Result<serde_json::Value, QueryError>;

    /// Drive `query` to completion, yielding its outputs as they become
    /// available.  Iteration ends after the first error, which is yielded
    /// after any outputs the machine produced while handling the failed
    /// response.
    fn run<Q: QueryMachine>(&self, query: Q) -> QueryResults<'_, Self, Q>
    where
        Self: Sized,
    {
        QueryResults::new(self, query)
    }
}

/// A sans-IO state machine that decides which requests to make and turns the
/// responses into outputs
pub trait QueryMachine {
    type Output;

    fn get_next_query(&mut self) -> Option<QueryPayload>;
    fn handle_response(&mut self, data: &serde_json::Value) -> Result<(), ShapeError>;
    fn get_output(&mut self) -> Vec<Self::Output>;
}

#[derive(Debug)]
pub struct QueryResults<'a, T, Q: QueryMachine> {
    transport: &'a T,
    query: Q,
    query_done: bool,
    yielding: VecDeque<Q::Output>,
    payload: Option<QueryPayload>,
    // Reported once everything the machine output before failing has been
    // yielded
    error: Option<QueryError>,
}

impl<'a, T, Q: QueryMachine> QueryResults<'a, T, Q> {
    fn new(transport: &'a T, query: Q) -> Self {
        QueryResults {
            transport,
            query,
            query_done: false,
            yielding: VecDeque::new(),
            payload: None,
            error: None,
        }
    }
}

impl<T: Transport, Q: QueryMachine> Iterator for QueryResults<'_, T, Q> {
    type Item = Result<Q::Output, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(value) = self.yielding.pop_front() {
                return Some(Ok(value));
            } else if let Some(e) = self.error.take() {
                return Some(Err(e));
            } else if self.query_done {
                return None;
            } else if let Some(payload) = self.payload.take() {
                let r = self.transport.query(&payload).and_then(|doc| {
                    self.query
                        .handle_response(&doc)
                        .map_err(|error| QueryError::Shape {
                            error,
                            document: Box::new(doc),
                        })
                });
                self.yielding.extend(self.query.get_output());
                if let Err(e) = r {
                    self.query_done = true;
                    self.error = Some(e);
                }
            } else {
                if let Some(payload) = self.query.get_next_query() {
                    self.payload = Some(payload);
                } else {
                    self.query_done = true;
                }
                self.yielding.extend(self.query.get_output());
            }
        }
    }
}

/// Decide whether a response with the given status and body counts as a
/// usable document
fn parse_response(status: StatusCode, body: &[u8]) -> Result<serde_json::Value, QueryError> {
    if status != StatusCode::OK {
        return Err(QueryError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }
    let doc = serde_json::from_slice::<serde_json::Value>(body)?;
    // A response that has data alongside errors is still walked; only a
    // response without data is reported as a GraphQL failure.
    let has_data = doc.get("data").is_some_and(|d| !d.is_null());
    if let Some(errors) = doc.get("errors").filter(|_| !has_data) {
        let errors = GqlError::deserialize(errors)?;
        if !errors.is_empty() {
            return Err(errors.into());
        }
    }
    Ok(doc)
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub operation_name: String,
    pub variables: JsonMap,
    pub extensions: Extensions,
}

#[derive(Debug, Error)]
pub enum BuildClientError {
    #[error("invalid authorization token")]
    Auth(#[from] InvalidHeaderValue),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to perform GraphQL request")]
    Http(#[source] Box<ureq::Error>),
    #[error("failed to read GraphQL response")]
    Read(#[source] Box<ureq::Error>),
    #[error("GraphQL server returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode GraphQL response")]
    Json(#[from] serde_json::Error),
    #[error("GraphQL server returned error response")]
    GraphQL(#[from] GqlError),
    #[error("unexpected response structure")]
    Shape {
        #[source]
        error: ShapeError,
        document: Box<serde_json::Value>,
    },
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Http(_) | QueryError::Read(_) => ErrorKind::Transport,
            QueryError::Status { .. }
            | QueryError::Json(_)
            | QueryError::GraphQL(_) => ErrorKind::Protocol,
            QueryError::Shape { .. } => ErrorKind::Shape,
        }
    }

    /// For shape errors, returns the document that could not be walked
    pub fn document(&self) -> Option<&serde_json::Value> {
        match self {
            QueryError::Shape { document, .. } => Some(document),
            _ => None,
        }
    }
}

/// Broad classification of a [`QueryError`]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The request could not be sent or the response could not be received
    Transport,
    /// The server answered, but not with a usable GraphQL document
    Protocol,
    /// The document was missing part of the expected structure
    Shape,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct GqlError(Vec<GqlInnerError>);

impl GqlError {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query errored:")?;
        let mut first = true;
        for e in &self.0 {
            if !std::mem::take(&mut first) {
                writeln!(f, "---")?;
            }
            if let Some(code) = e.extensions.as_ref().and_then(|ext| ext.code.as_ref()) {
                writeln!(f, "    Code: {code}")?;
            }
            writeln!(f, "    Message: {}", e.message)?;
            if let Some(ref p) = e.path {
                writeln!(f, "    Path: {p:?}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for GqlError {}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct GqlInnerError {
    message: String,
    // Path elements are field names or list indices
    #[serde(default)]
    path: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    extensions: Option<GqlErrorExtensions>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct GqlErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}
