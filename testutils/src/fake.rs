use httpmock::prelude::*;
use httpmock::{
    Mock,
    Then,
    When,
};
use serde_json::json;

// Stands in for the apiserver in controller tests: a kube::Client pointed at
// an httpmock server.  The controllers only ever list, watch, PATCH status
// subresources, and DELETE pods, so a handful of route mocks covers
// everything; anything unmocked falls through to the logging catch-all and
// comes back as an empty 200, which the kube client surfaces as an error.
pub fn make_fake_apiserver() -> (MockServerBuilder, kube::Client) {
    let builder = MockServerBuilder::new();
    let config = kube::Config::new(builder.url());
    let client = kube::Client::try_from(config).unwrap();
    (builder, client)
}

// A Status success body, good enough for any accepted write in these tests
pub fn status_ok() -> serde_json::Value {
    json!({
      "kind": "Status",
      "apiVersion": "v1",
      "metadata": {},
      "status": "Success",
      "code": 200
    })
}

pub struct MockServerBuilder {
    server: MockServer,
    handlers: Vec<Box<dyn Fn(When, Then)>>,
    mock_ids: Vec<usize>,
}

fn log_request(req: &HttpMockRequest) -> bool {
    // println rather than info! so the traffic shows up under --nocapture
    // even when no subscriber is installed
    println!("    apiserver saw: {} {}", req.method(), req.uri());
    true
}

impl MockServerBuilder {
    pub fn new() -> MockServerBuilder {
        MockServerBuilder {
            server: MockServer::start(),
            handlers: vec![],
            mock_ids: vec![],
        }
    }

    pub fn handle<F: Fn(When, Then) + 'static>(&mut self, f: F) -> &mut Self {
        self.handlers.push(Box::new(move |w, t| {
            let w = w.matches(log_request);
            f(w, t);
        }));
        self
    }

    // A successful write to the status subresource of the node or pod at
    // `path`, the bread and butter of both controllers
    pub fn handle_status_patch(&mut self, path: String) -> &mut Self {
        self.handle(move |when, then| {
            when.method(PATCH).path(format!("{path}/status"));
            then.json_body(status_ok());
        })
    }

    // A successful pod finalization
    pub fn handle_delete(&mut self, path: String) -> &mut Self {
        self.handle(move |when, then| {
            when.method(DELETE).path(&path);
            then.json_body(status_ok());
        })
    }

    // Installs every declared mock; the catch-all logger goes in last so
    // the real routes always win the match
    pub fn build(&mut self) {
        for f in self.handlers.iter() {
            self.mock_ids.push(self.server.mock(f).id);
        }

        self.server.mock(|when, _| {
            when.matches(log_request);
        });
    }

    // Every declared route must have been hit exactly once
    pub fn assert(&self) {
        for id in &self.mock_ids {
            Mock::new(*id, &self.server).assert()
        }
    }

    pub fn url(&self) -> http::Uri {
        http::Uri::try_from(self.server.url("/")).unwrap()
    }
}
