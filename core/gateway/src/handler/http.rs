use crate::bo::event::GatewayServerEvent;
use crate::bo::state::ServerState;
use crate::error::GatewayError;
use crate::handler::relay::RelaySession;
use crate::publish_server_event;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::Full;
use hyper::header::{
    HeaderMap, HeaderName, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION,
    CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, warn};
const GATEWAY_BANNER: &str = "WebSocket-to-SIP Gateway";
const HEALTH_BODY: &str = "OK";
const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const SIP_SUBPROTOCOL: &str = "sip";
const WEBSOCKET_VERSION: &[u8] = b"13";
type GatewayResponse = Response<Full<Bytes>>;
fn header_has_token(headers: &HeaderMap, header_name: HeaderName, token: &str) -> bool {
    headers
        .get_all(header_name)
        .iter()
        .filter_map(|header_value| header_value.to_str().ok())
        .flat_map(|header_value| header_value.split(','))
        .any(|header_token| header_token.trim().eq_ignore_ascii_case(token))
}
/// Whether the request asks for a websocket, the check is case insensitive.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    header_has_token(headers, UPGRADE, "websocket")
}
fn plain_response(status: StatusCode, body: &'static str) -> Result<GatewayResponse, GatewayError> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Full::new(Bytes::from_static(body.as_bytes())))?)
}
fn preflight_response() -> Result<GatewayResponse, GatewayError> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS)
        .body(Full::new(Bytes::new()))?)
}
fn internal_error_response() -> GatewayResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
/// Answer the handshake and hand the upgraded connection to a new relay session.
fn upgrade_websocket<B>(
    request: Request<B>,
    client_address: SocketAddr,
    server_state: ServerState,
) -> Result<GatewayResponse, GatewayError> {
    let Some(ws_key) = request.headers().get(SEC_WEBSOCKET_KEY) else {
        warn!(
            client_address = { format!("{client_address}") },
            "Reject websocket upgrade without key."
        );
        return plain_response(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key header");
    };
    let version_supported = request
        .headers()
        .get(SEC_WEBSOCKET_VERSION)
        .is_some_and(|version| version.as_bytes() == WEBSOCKET_VERSION);
    if !version_supported {
        warn!(
            client_address = { format!("{client_address}") },
            "Reject websocket upgrade with unsupported version."
        );
        return plain_response(StatusCode::BAD_REQUEST, "Unsupported WebSocket version");
    }
    let mut response_builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "websocket")
        .header(SEC_WEBSOCKET_ACCEPT, derive_accept_key(ws_key.as_bytes()));
    if header_has_token(request.headers(), SEC_WEBSOCKET_PROTOCOL, SIP_SUBPROTOCOL) {
        response_builder = response_builder.header(SEC_WEBSOCKET_PROTOCOL, SIP_SUBPROTOCOL);
    }
    let response = response_builder.body(Full::new(Bytes::new()))?;
    let on_upgrade = hyper::upgrade::on(request);
    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                error!(
                    client_address = { format!("{client_address}") },
                    "Fail to upgrade client connection to websocket: {e:?}"
                );
                return;
            }
        };
        let client_ws =
            WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        publish_server_event(
            server_state.server_event_tx(),
            GatewayServerEvent::SessionStarted(client_address),
        );
        let (client_ws_sink, client_ws_read) = client_ws.split();
        let final_status = RelaySession::new(client_ws_sink, client_address, server_state.clone())
            .run(client_ws_read)
            .await;
        debug!(
            client_address = { format!("{client_address}") },
            "Relay session finished with status: {final_status}"
        );
        publish_server_event(
            server_state.server_event_tx(),
            GatewayServerEvent::SessionClosed(client_address),
        );
    });
    Ok(response)
}
pub async fn handle_http_request<B>(
    request: Request<B>,
    client_address: SocketAddr,
    server_state: ServerState,
) -> Result<GatewayResponse, Infallible> {
    debug!(
        client_address = { format!("{client_address}") },
        "Http request received: {} {}",
        request.method(),
        request.uri()
    );
    let response = if is_websocket_upgrade(request.headers()) {
        upgrade_websocket(request, client_address, server_state)
    } else if request.method() == Method::OPTIONS {
        preflight_response()
    } else if request.method() == Method::GET
        && request.uri().path() == server_state.config().health_path()
    {
        plain_response(StatusCode::OK, HEALTH_BODY)
    } else {
        plain_response(StatusCode::OK, GATEWAY_BANNER)
    };
    Ok(response.unwrap_or_else(|e| {
        error!(
            client_address = { format!("{client_address}") },
            "Fail to build http response: {e:?}"
        );
        internal_error_response()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tokio::sync::mpsc::channel;

    fn server_state() -> ServerState {
        let (server_event_tx, _) = channel(16);
        ServerState::from_config(Arc::new(Config::default()), server_event_tx).unwrap()
    }

    fn client_address() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn body_text(response: GatewayResponse) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn upgrade_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, "WebSocket".parse().unwrap());
        assert!(is_websocket_upgrade(&headers));
        headers.insert(UPGRADE, "h2c".parse().unwrap());
        assert!(!is_websocket_upgrade(&headers));
        assert!(!is_websocket_upgrade(&HeaderMap::new()));
    }

    #[tokio::test]
    async fn health_check() {
        let request = Request::builder().uri("/health").body(()).unwrap();
        let response = handle_http_request(request, client_address(), server_state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn other_requests_get_the_banner() {
        for request in [
            Request::builder().uri("/").body(()).unwrap(),
            Request::builder()
                .method(Method::POST)
                .uri("/health")
                .body(())
                .unwrap(),
        ] {
            let response = handle_http_request(request, client_address(), server_state())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, GATEWAY_BANNER);
        }
    }

    #[tokio::test]
    async fn preflight() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .body(())
            .unwrap();
        let response = handle_http_request(request, client_address(), server_state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn upgrade_without_key_is_rejected() {
        let request = Request::builder()
            .uri("/")
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .body(())
            .unwrap();
        let response = handle_http_request(request, client_address(), server_state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upgrade_handshake_response() {
        let request = Request::builder()
            .uri("/")
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .header(SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .header(SEC_WEBSOCKET_VERSION, "13")
            .header(SEC_WEBSOCKET_PROTOCOL, "sip")
            .body(())
            .unwrap();
        let response = handle_http_request(request, client_address(), server_state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers()[SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert_eq!(response.headers()[SEC_WEBSOCKET_PROTOCOL], "sip");
    }
}
