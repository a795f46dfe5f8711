//! Upstream model calls and the decoded event stream over them.

use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use switchyard_abstraction::{
    AuthContext, GatewayError, ModelRequest, ProviderConfig, UnifiedResponse,
};
use switchyard_events::{ChunkDecoder, FrameBuffer, StreamEvent};
use tracing::{debug, error};

/// Raw byte stream of one upstream response body.
pub type ByteStream =
    Pin<Box<dyn Stream<Item = std::result::Result<bytes::Bytes, GatewayError>> + Send>>;

/// Seam for issuing one streaming model call.
///
/// The production implementation drives HTTP through the provider config;
/// tests substitute scripted byte streams.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Issues one streaming call and returns its raw body stream.
    ///
    /// `tools` carries provider-ready function schemas to attach.
    async fn stream_response(
        &self,
        request: &ModelRequest,
        tools: &[serde_json::Value],
        auth: &AuthContext,
    ) -> Result<ByteStream>;
}

/// HTTP upstream client over a provider config.
pub struct HttpUpstream {
    client: reqwest::Client,
    provider: Arc<dyn ProviderConfig>,
    api_base: String,
}

impl HttpUpstream {
    /// Creates a client for the given provider and API base.
    pub fn new(provider: Arc<dyn ProviderConfig>, api_base: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), provider, api_base: api_base.into() }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn stream_response(
        &self,
        request: &ModelRequest,
        tools: &[serde_json::Value],
        auth: &AuthContext,
    ) -> Result<ByteStream> {
        let url = self.provider.get_complete_url(&self.api_base, &request.model)?;
        let headers = self.provider.validate_environment(auth)?;
        let body = self.provider.transform_request(request, tools)?;

        debug!(url = %url, model = %request.model, "issuing upstream streaming call");

        let mut builder = self.client.post(&url).json(&body);
        for (name, value) in headers {
            builder = builder.header(&name, &value);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, "failed to send upstream request");
            GatewayError::Transport(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text =
                response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "upstream returned error status");
            return Err(GatewayError::UpstreamResponse(format!(
                "API error ({}): {}",
                status, error_text
            ))
            .into());
        }

        let bytes = response
            .bytes_stream()
            .map(|item| item.map_err(|e| GatewayError::Transport(e.to_string())));
        Ok(Box::pin(bytes))
    }
}

/// Decoded event stream over one upstream body.
///
/// Buffers partial SSE lines across byte chunks and runs each complete
/// frame through the chunk decoder.
pub struct EventStream {
    bytes: ByteStream,
    buffer: FrameBuffer,
    decoder: ChunkDecoder,
    pending: std::collections::VecDeque<StreamEvent>,
    exhausted: bool,
}

impl EventStream {
    /// Wraps a byte stream with the given decoder.
    pub fn new(bytes: ByteStream, decoder: ChunkDecoder) -> Self {
        Self {
            bytes,
            buffer: FrameBuffer::new(),
            decoder,
            pending: std::collections::VecDeque::new(),
            exhausted: false,
        }
    }

    /// Returns the next decoded event, or `None` once the body is drained.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.exhausted {
                return Ok(None);
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    for frame in self.buffer.push(&chunk) {
                        if let Some(event) = self.decoder.decode(&frame) {
                            self.pending.push_back(event);
                        }
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.exhausted = true;
                    // A final frame may have arrived without its newline.
                    if let Some(frame) = self.buffer.take_remainder() {
                        if let Some(event) = self.decoder.decode(&frame) {
                            self.pending.push_back(event);
                        }
                    }
                }
            }
        }
    }

    /// Takes the aggregate response captured from the terminal event.
    pub fn take_final_response(&mut self) -> Option<UnifiedResponse> {
        self.decoder.take_final_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_abstraction::RequestInput;

    /// Minimal provider config pointing at a fixed deployment.
    struct TestProvider;

    impl ProviderConfig for TestProvider {
        fn deployment(&self) -> &str {
            "test/model"
        }

        fn get_complete_url(
            &self,
            api_base: &str,
            _model: &str,
        ) -> switchyard_abstraction::Result<String> {
            Ok(format!("{}/v1/responses", api_base))
        }

        fn validate_environment(
            &self,
            _auth: &AuthContext,
        ) -> switchyard_abstraction::Result<Vec<(String, String)>> {
            Ok(vec![("authorization".to_string(), "Bearer test".to_string())])
        }

        fn transform_request(
            &self,
            request: &ModelRequest,
            tools: &[serde_json::Value],
        ) -> switchyard_abstraction::Result<serde_json::Value> {
            Ok(serde_json::json!({
                "model": request.model,
                "input": request.input,
                "tools": tools,
                "stream": true,
            }))
        }

        fn transform_response(
            &self,
            raw: serde_json::Value,
            _input: &RequestInput,
        ) -> switchyard_abstraction::Result<UnifiedResponse> {
            Ok(serde_json::from_value(raw)?)
        }
    }

    fn scripted_stream(body: &str) -> ByteStream {
        let chunk = bytes::Bytes::from(body.to_string());
        Box::pin(futures::stream::iter(vec![Ok(chunk)]))
    }

    #[tokio::test]
    async fn test_event_stream_decodes_frames() {
        let body = concat!(
            "data: {\"type\":\"response.output_text.delta\",\"sequence_number\":0,",
            "\"output_index\":0,\"item_id\":\"msg_1\",\"delta\":\"hi\"}\n",
            "data: {\"type\":\"response.completed\",\"sequence_number\":1,",
            "\"response\":{\"id\":\"resp-1\",\"output\":[]}}\n",
            "data: [DONE]\n",
        );
        let mut stream = EventStream::new(scripted_stream(body), ChunkDecoder::new());

        let first = stream.next_event().await.unwrap().unwrap();
        assert!(matches!(first, StreamEvent::OutputTextDelta { .. }));

        let second = stream.next_event().await.unwrap().unwrap();
        assert!(second.is_terminal());

        assert!(stream.next_event().await.unwrap().is_none());
        assert_eq!(stream.take_final_response().unwrap().id, "resp-1");
    }

    #[tokio::test]
    async fn test_event_stream_flushes_trailing_frame() {
        // Terminal frame without a final newline.
        let body = concat!(
            "data: {\"type\":\"response.completed\",\"sequence_number\":0,",
            "\"response\":{\"id\":\"resp-9\",\"output\":[]}}",
        );
        let mut stream = EventStream::new(scripted_stream(body), ChunkDecoder::new());

        let event = stream.next_event().await.unwrap().unwrap();
        assert!(event.is_terminal());
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_stream_surfaces_transport_error() {
        let bytes: ByteStream = Box::pin(futures::stream::iter(vec![Err(
            GatewayError::Transport("connection reset".to_string()),
        )]));
        let mut stream = EventStream::new(bytes, ChunkDecoder::new());

        let result = stream.next_event().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_upstream_streams_sse_body() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"type\":\"response.output_text.delta\",\"sequence_number\":0,",
            "\"output_index\":0,\"item_id\":\"msg_1\",\"delta\":\"hello\"}\n",
            "data: [DONE]\n",
        );
        let mock = server
            .mock("POST", "/v1/responses")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let upstream = HttpUpstream::new(Arc::new(TestProvider), server.url());
        let request =
            ModelRequest::new("test-model", RequestInput::Text("hi".to_string()));
        let bytes = upstream
            .stream_response(&request, &[], &AuthContext::default())
            .await
            .unwrap();

        let mut stream = EventStream::new(bytes, ChunkDecoder::new());
        let event = stream.next_event().await.unwrap().unwrap();
        match event {
            StreamEvent::OutputTextDelta { delta, .. } => assert_eq!(delta, "hello"),
            other => panic!("unexpected event: {:?}", other),
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_upstream_error_status_is_upstream_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/responses")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let upstream = HttpUpstream::new(Arc::new(TestProvider), server.url());
        let request =
            ModelRequest::new("test-model", RequestInput::Text("hi".to_string()));
        let result = upstream
            .stream_response(&request, &[], &AuthContext::default())
            .await;

        match result {
            Err(crate::error::OrchestrationError::Gateway(
                GatewayError::UpstreamResponse(message),
            )) => assert!(message.contains("429")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
