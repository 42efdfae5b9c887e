//! Permissive CORS, mirroring a typical BaaS edge: any origin may call the
//! API (the API key is the access control boundary, not the browser
//! origin), but credentialed requests are not allowed since auth is via
//! bearer tokens rather than cookies.

use tower_http::cors::{Any, CorsLayer};

pub fn layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
