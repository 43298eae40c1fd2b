//! Clients for the three delivery transports.
//!
//! [`HttpFetcher`] and [`UnaryFetcher`] answer one request per call and are
//! driven through [`ObjectFetcher`] by the serial and fan-out patterns. The
//! streaming transport is session based; see [`crate::bench::session`].
//!
//! Each fetcher owns one connection (pool) and is cheap to clone, so every
//! task of a pattern reuses the same connection.

use crate::bench::config::GrpcTarget;
use core::future::Future;
use objwire_core::{
    Error, Result,
    proto::{ObjectIdentifier, ObjectResponse, object_accessor_client::ObjectAccessorClient},
    snapshot::fingerprint,
};
use reqwest::{StatusCode, header};
use tonic::{
    codec::CompressionEncoding,
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint},
};

/// What a single fetch observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub size: usize,
    pub fingerprint: String,
    pub mtime: String,
}

/// One request, one object.
pub trait ObjectFetcher: Clone + Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<FetchOutcome>> + Send;
}

/// Fetches `GET /http` through a shared `reqwest` connection pool.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    verify: bool,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, verify: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(Error::transport)?;
        Ok(Self {
            client,
            url: url.into(),
            verify,
        })
    }
}

impl ObjectFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<FetchOutcome> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(Error::transport)?;

        let status = response.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let reason = response.text().await.map_err(Error::transport)?;
            return Err(Error::ContentUnavailable { reason });
        }
        if !status.is_success() {
            return Err(Error::transport(format!("GET {} returned {status}", self.url)));
        }

        let header_value = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let etag = header_value(header::ETAG);
        let mtime = header_value(header::LAST_MODIFIED);

        let body = response.bytes().await.map_err(Error::transport)?;
        if self.verify {
            check_fingerprint(&body, &etag)?;
        }

        Ok(FetchOutcome {
            size: body.len(),
            fingerprint: etag,
            mtime,
        })
    }
}

/// Calls `GetObject` on a shared gRPC channel.
#[derive(Clone, Debug)]
pub struct UnaryFetcher {
    client: ObjectAccessorClient<Channel>,
    verify: bool,
}

impl UnaryFetcher {
    pub fn new(client: ObjectAccessorClient<Channel>, verify: bool) -> Self {
        Self { client, verify }
    }
}

impl ObjectFetcher for UnaryFetcher {
    async fn fetch(&self) -> Result<FetchOutcome> {
        let mut client = self.client.clone();
        let response = client
            .get_object(ObjectIdentifier::benchmark())
            .await?
            .into_inner();
        outcome(response, self.verify)
    }
}

/// Turns a gRPC response into a [`FetchOutcome`], optionally checking that
/// the content matches its fingerprint.
pub fn outcome(response: ObjectResponse, verify: bool) -> Result<FetchOutcome> {
    if verify {
        check_fingerprint(&response.content, &response.fingerprint)?;
    }
    Ok(FetchOutcome {
        size: response.content.len(),
        fingerprint: response.fingerprint,
        mtime: response.mtime,
    })
}

fn check_fingerprint(content: &[u8], expected: &str) -> Result<()> {
    let actual = fingerprint(content);
    if actual != expected {
        return Err(Error::transport(format!(
            "fingerprint mismatch: server sent {expected}, body hashes to {actual}"
        )));
    }
    Ok(())
}

/// Opens a gRPC channel to `target` and wraps it in a client configured with
/// the target's compression and message limits.
///
/// The connection is established eagerly so an unreachable server fails here
/// with [`Error::Transport`].
pub async fn connect(target: &GrpcTarget) -> Result<ObjectAccessorClient<Channel>> {
    let mut endpoint = Endpoint::from_shared(target.uri())?;

    if let Some(tls) = &target.tls {
        let pem = tokio::fs::read(&tls.ca_file)
            .await
            .map_err(|source| Error::StartupIo {
                path: tls.ca_file.clone(),
                source,
            })?;
        endpoint = endpoint.tls_config(
            ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(pem))
                .domain_name(tls.domain.clone()),
        )?;
    }

    let channel = endpoint.connect().await?;
    let mut client = ObjectAccessorClient::new(channel)
        .max_decoding_message_size(target.max_message_bytes)
        .max_encoding_message_size(target.max_message_bytes);

    if let Some(encoding) = Option::<CompressionEncoding>::from(target.compression) {
        client = client.send_compressed(encoding).accept_compressed(encoding);
    }

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn verified_outcome_accepts_matching_fingerprint() -> Result<()> {
        let response = ObjectResponse {
            media_type: "application/octet-stream".to_string(),
            mtime: "Thu, 01 Jan 1970 00:00:00 GMT".to_string(),
            fingerprint: "781e5e245d69b566979b86e28d23f2c7".to_string(),
            content: Bytes::from_static(b"0123456789"),
        };

        let outcome = outcome(response, true)?;
        assert_eq!(outcome.size, 10);
        assert_eq!(outcome.fingerprint, "781e5e245d69b566979b86e28d23f2c7");
        Ok(())
    }

    #[test]
    fn verified_outcome_rejects_corrupted_content() {
        let response = ObjectResponse {
            fingerprint: "781e5e245d69b566979b86e28d23f2c7".to_string(),
            content: Bytes::from_static(b"0123456780"),
            ..Default::default()
        };

        assert!(matches!(outcome(response.clone(), true), Err(Error::Transport { .. })));
        assert!(outcome(response, false).is_ok());
    }

    /// Serves one connection with `reply` written verbatim, then hangs up.
    async fn reply_once(reply: &'static str) -> Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(Error::transport)?;
        let addr = listener.local_addr().map_err(Error::transport)?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        Ok(format!("http://{addr}/http"))
    }

    #[tokio::test]
    async fn server_error_carries_its_body_as_the_reason() -> Result<()> {
        let url = reply_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 7\r\nConnection: close\r\n\r\nmissing",
        )
        .await?;
        let fetcher = HttpFetcher::new(url, false)?;
        match fetcher.fetch().await {
            Err(Error::ContentUnavailable { reason }) => assert_eq!(reason, "missing"),
            other => panic!("expected ContentUnavailable, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn truncated_server_error_body_is_a_transport_error() -> Result<()> {
        let url = reply_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\nConnection: close\r\n\r\nshort",
        )
        .await?;
        let fetcher = HttpFetcher::new(url, false)?;
        assert!(matches!(fetcher.fetch().await, Err(Error::Transport { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_http_server_is_a_transport_error() -> Result<()> {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .map_err(Error::transport)?;
        let fetcher = HttpFetcher::new(format!("http://127.0.0.1:{port}/http"), false)?;
        assert!(matches!(fetcher.fetch().await, Err(Error::Transport { .. })));
        Ok(())
    }
}
