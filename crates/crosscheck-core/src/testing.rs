//! Scripted HTTP client for deterministic testing.

use crate::http::{HttpClient, HttpResponse, TransportError};
use crate::request::BuiltRequest;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Mock [`HttpClient`] that replays pre-scripted responses.
///
/// Responses are registered against a URL substring and consumed in
/// registration order: each request takes the first unconsumed rule whose
/// substring occurs in the request URL. Registering the same substring
/// repeatedly scripts a sequence (useful for retry scenarios); keying rules
/// by engine base URL keeps concurrent lanes independent.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<Rule>,
    requests: Vec<BuiltRequest>,
}

#[derive(Debug)]
struct Rule {
    url_fragment: String,
    response: Result<HttpResponse, TransportError>,
    consumed: bool,
}

impl MockHttpClient {
    /// Creates an empty mock; unmatched requests fail with a connection
    /// error naming the URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful response for requests whose URL contains
    /// `url_fragment`.
    pub fn push_ok(&self, url_fragment: &str, response: HttpResponse) {
        self.push(url_fragment, Ok(response));
    }

    /// Scripts a transport failure for requests whose URL contains
    /// `url_fragment`.
    pub fn push_err(&self, url_fragment: &str, error: TransportError) {
        self.push(url_fragment, Err(error));
    }

    fn push(&self, url_fragment: &str, response: Result<HttpResponse, TransportError>) {
        self.state.lock().unwrap().rules.push(Rule {
            url_fragment: url_fragment.to_string(),
            response,
            consumed: false,
        });
    }

    /// Returns every request executed so far, in arrival order.
    pub fn requests(&self) -> Vec<BuiltRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests executed so far.
    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &BuiltRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        let rule = state
            .rules
            .iter_mut()
            .find(|rule| !rule.consumed && request.url.contains(&rule.url_fragment));

        match rule {
            Some(rule) => {
                rule.consumed = true;
                rule.response.clone()
            }
            None => Err(TransportError::Connection(format!(
                "no scripted response for {}",
                request.url
            ))),
        }
    }
}
