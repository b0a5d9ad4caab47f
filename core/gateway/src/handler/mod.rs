mod forward;
mod http;
mod outbound;
mod relay;
pub use http::handle_http_request;
