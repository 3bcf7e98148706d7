use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use strada_core::{Router, RouterService};
use tower::util::ServiceExt;

/// In-process HTTP test client wrapping a [`Router`].
///
/// Drives requests through the router's `tower::Service` adapter via
/// `ServiceExt::oneshot`, without binding to a TCP port. The first request
/// freezes the router.
pub struct TestApp {
    service: RouterService,
}

impl TestApp {
    /// Create a `TestApp` from a configured router.
    pub fn new(router: Router) -> Self {
        Self {
            service: router.into_service(),
        }
    }

    /// Access the underlying shared router (e.g. for `url_for`).
    pub fn router(&self) -> &std::sync::Arc<Router> {
        self.service.router()
    }

    /// Send an arbitrary request.
    pub async fn send(&self, request: Request<Bytes>) -> TestResponse {
        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .expect("failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Send a GET request to the given path.
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Bytes::new())
            .unwrap();
        self.send(req).await
    }

    /// Send a GET request with extra headers.
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Bytes::new()).unwrap()).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        let json = serde_json::to_vec(body).unwrap();
        let req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(json))
            .unwrap();
        self.send(req).await
    }

    /// Send a DELETE request to the given path.
    pub async fn delete(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::DELETE)
            .uri(path)
            .body(Bytes::new())
            .unwrap();
        self.send(req).await
    }
}

/// Response wrapper with assertion helpers.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Assert status is 200 OK. Returns `self` for chaining.
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    /// Assert status is 404 Not Found.
    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    /// Assert status is 405 Method Not Allowed.
    pub fn assert_method_not_allowed(self) -> Self {
        self.assert_status(StatusCode::METHOD_NOT_ALLOWED)
    }

    /// Assert an exact status code.
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status, expected,
            "expected {expected}, got {} with body {:?}",
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Assert a response header value.
    pub fn assert_header(self, name: &str, expected: &str) -> Self {
        let value = self
            .headers
            .get(name)
            .unwrap_or_else(|| panic!("missing header {name}"));
        assert_eq!(value, expected, "header {name} mismatch");
        self
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("body is not UTF-8")
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("body is not valid JSON")
    }
}
