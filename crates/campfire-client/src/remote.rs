//! Backend that talks to `campfire-server` over HTTP, with one gateway
//! WebSocket per live subscription.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use campfire_types::api::{
    AnonymousSignInResponse, DownloadUrlResponse, ErrorBody, PushResponse, SetIfAbsentResponse,
};
use campfire_types::events::{GatewayCommand, GatewayEvent};
use campfire_types::paths::{NodePath, ObjectPath};

use crate::backend::{AuthProvider, AuthSession, Backend, ObjectStore, RealtimeDb, Subscription};
use crate::error::{Error, Result};

/// Only one subscription travels per socket, so its id is fixed.
const SUBSCRIPTION_ID: u64 = 1;

pub struct RemoteBackend {
    http: Client,
    base: Url,
    session: RwLock<Option<AuthSession>>,
}

impl RemoteBackend {
    pub fn new(server_url: &str) -> Result<Self> {
        let base = Url::parse(server_url)
            .map_err(|e| Error::Validation(format!("invalid server URL '{}': {}", server_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Validation(format!("'{}' cannot be a base URL", server_url)));
        }
        Ok(Self {
            http: Client::new(),
            base,
            session: RwLock::new(None),
        })
    }

    pub fn into_backend(self) -> Backend {
        Backend::from_shared(Arc::new(self))
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Validation("server URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn node_url(&self, path: &NodePath) -> Result<Url> {
        self.endpoint(std::iter::once("db").chain(path.segments()))
    }

    fn token(&self) -> Result<String> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().and_then(|s| s.token.clone()))
            .ok_or(Error::NotSignedIn)
    }

    fn authed(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        Ok(self.http.request(method, url).bearer_auth(self.token()?))
    }

    fn store_session(&self, session: AuthSession) -> Result<()> {
        let mut slot = self
            .session
            .write()
            .map_err(|_| Error::Backend("auth state poisoned".into()))?;
        *slot = Some(session);
        Ok(())
    }

    fn gateway_url(&self) -> Result<Url> {
        let mut url = self.endpoint(["gateway"])?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::Validation(format!("cannot derive a WebSocket URL from {}", self.base)))?;
        url.query_pairs_mut().append_pair("token", &self.token()?);
        Ok(url)
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Backend(format!("request failed: {}", e))
}

/// Turn a non-success response into the matching error kind.
async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = match res.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status.to_string(),
    };
    Err(match status {
        StatusCode::UNAUTHORIZED => Error::NotSignedIn,
        StatusCode::FORBIDDEN => Error::PermissionDenied(message),
        StatusCode::BAD_REQUEST => Error::Validation(message),
        _ => Error::Backend(format!("{}: {}", status, message)),
    })
}

async fn send(req: RequestBuilder) -> Result<Response> {
    check(req.send().await.map_err(transport)?).await
}

#[async_trait]
impl RealtimeDb for RemoteBackend {
    async fn get(&self, path: &NodePath) -> Result<Option<Value>> {
        let req = self.authed(Method::GET, self.node_url(path)?)?;
        send(req).await?.json().await.map_err(transport)
    }

    async fn set(&self, path: &NodePath, value: Value) -> Result<()> {
        let req = self.authed(Method::PUT, self.node_url(path)?)?.json(&value);
        send(req).await?;
        Ok(())
    }

    async fn push(&self, path: &NodePath, value: Value) -> Result<String> {
        let req = self.authed(Method::POST, self.node_url(path)?)?.json(&value);
        let body: PushResponse = send(req).await?.json().await.map_err(transport)?;
        Ok(body.key)
    }

    async fn remove(&self, path: &NodePath) -> Result<()> {
        send(self.authed(Method::DELETE, self.node_url(path)?)?).await?;
        Ok(())
    }

    async fn set_if_absent(&self, path: &NodePath, value: Value) -> Result<bool> {
        let mut url = self.node_url(path)?;
        url.query_pairs_mut().append_pair("if_absent", "true");
        let req = self.authed(Method::PUT, url)?.json(&value);
        let body: SetIfAbsentResponse = send(req).await?.json().await.map_err(transport)?;
        Ok(body.written)
    }

    async fn subscribe(&self, path: &NodePath) -> Result<Subscription> {
        let url = self.gateway_url()?;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Backend(format!("gateway connect failed: {}", e)))?;
        let (mut sink, mut stream) = ws.split();

        let command = serde_json::to_string(&GatewayCommand::Subscribe {
            id: SUBSCRIPTION_ID,
            path: path.as_str().to_string(),
        })?;
        sink.send(Message::Text(command.into()))
            .await
            .map_err(|e| Error::Backend(format!("gateway send failed: {}", e)))?;
        debug!("Remote subscription on {}", path);

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            // Held so the socket stays open; pongs go out through it.
            let mut sink = sink;
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Ping(payload)) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Backend(format!("gateway error: {}", e))));
                        break;
                    }
                };

                let item = match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(GatewayEvent::Value { value, .. }) => Ok(value),
                    Ok(GatewayEvent::Error { message, .. }) => Err(Error::Backend(message)),
                    Ok(GatewayEvent::Ready { .. }) => continue,
                    Err(e) => {
                        warn!("Unparseable gateway frame: {}", e);
                        continue;
                    }
                };
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}

#[async_trait]
impl ObjectStore for RemoteBackend {
    async fn put(&self, path: &ObjectPath, data: Vec<u8>) -> Result<()> {
        let url = self.endpoint(std::iter::once("storage").chain(path.segments()))?;
        let req = self
            .authed(Method::PUT, url)?
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(data);
        send(req).await?;
        Ok(())
    }

    async fn download_url(&self, path: &ObjectPath) -> Result<Option<String>> {
        let url = self.endpoint(std::iter::once("storage-url").chain(path.segments()))?;
        let res = self
            .authed(Method::GET, url)?
            .send()
            .await
            .map_err(transport)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: DownloadUrlResponse = check(res).await?.json().await.map_err(transport)?;
        Ok(Some(body.download_url))
    }

    async fn delete(&self, path: &ObjectPath) -> Result<()> {
        let url = self.endpoint(std::iter::once("storage").chain(path.segments()))?;
        send(self.authed(Method::DELETE, url)?).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for RemoteBackend {
    async fn sign_in_anonymously(&self) -> Result<AuthSession> {
        let url = self.endpoint(["auth", "anonymous"])?;
        let body: AnonymousSignInResponse = send(self.http.post(url))
            .await?
            .json()
            .await
            .map_err(transport)?;

        info!("Signed in anonymously as {}", body.user_id);
        let session = AuthSession {
            user_id: body.user_id,
            token: Some(body.token),
        };
        self.store_session(session.clone())?;
        Ok(session)
    }

    async fn restore(&self, session: &AuthSession) -> Result<bool> {
        if session.token.is_none() {
            return Ok(false);
        }
        self.store_session(session.clone())?;
        // An expired or foreign token shows up as 401 on first use.
        match self.get(&NodePath::user_sessions(&session.user_id)?).await {
            Ok(_) => Ok(true),
            Err(Error::NotSignedIn) => {
                warn!("Stored token for {} was rejected", session.user_id);
                let mut slot = self
                    .session
                    .write()
                    .map_err(|_| Error::Backend("auth state poisoned".into()))?;
                *slot = None;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn current_user(&self) -> Option<String> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.user_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_escaped_endpoints() {
        let backend = RemoteBackend::new("http://localhost:3000/").unwrap();
        let path = NodePath::parse("sessions/camp 21/activities").unwrap();
        assert_eq!(
            backend.node_url(&path).unwrap().as_str(),
            "http://localhost:3000/db/sessions/camp%2021/activities"
        );
    }

    #[test]
    fn gateway_needs_a_token() {
        let backend = RemoteBackend::new("https://camp.example").unwrap();
        assert!(matches!(backend.gateway_url(), Err(Error::NotSignedIn)));

        backend
            .store_session(AuthSession {
                user_id: "u1".into(),
                token: Some("t0k".into()),
            })
            .unwrap();
        assert_eq!(
            backend.gateway_url().unwrap().as_str(),
            "wss://camp.example/gateway?token=t0k"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(RemoteBackend::new("mailto:someone").is_err());
    }
}
