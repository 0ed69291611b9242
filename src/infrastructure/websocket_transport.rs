// WebSocket transport built on tokio-tungstenite
use crate::application::transport::{
    SessionId, SocketHandle, Transport, TransportError, TransportEvent, TransportEventKind,
};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;

/// Spawns one task per socket. The task forwards frames as transport events
/// until the server closes, an error ends the stream, or the handle asks it to
/// shut down.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        url: &str,
        session: SessionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<SocketHandle, TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(run_socket(request, session, events, shutdown_rx));

        Ok(SocketHandle::new(session, shutdown_tx))
    }
}

async fn run_socket(
    request: Request,
    session: SessionId,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let emit = |kind: TransportEventKind| {
        // The event loop has gone away; nothing left to report to.
        let _ = events.send(TransportEvent::new(session, kind));
    };

    let mut stream = tokio::select! {
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok((stream, response)) => {
                tracing::debug!(%session, status = %response.status(), "WebSocket handshake complete");
                stream
            }
            Err(e) => {
                emit(TransportEventKind::Error(e.to_string()));
                emit(TransportEventKind::Closed);
                return;
            }
        },
        _ = &mut shutdown => {
            tracing::debug!(%session, "Shutdown requested before handshake completed");
            return;
        }
    };

    emit(TransportEventKind::Opened);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = stream.close(None).await {
                    tracing::debug!(%session, "Error while closing socket: {}", e);
                }
                return;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => emit(TransportEventKind::Message(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    emit(TransportEventKind::Message(binary_text(session, bytes)))
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(%session, ?frame, "Server closed the socket");
                    emit(TransportEventKind::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEventKind::Error(e.to_string()));
                    emit(TransportEventKind::Closed);
                    return;
                }
                None => {
                    emit(TransportEventKind::Closed);
                    return;
                }
            },
        }
    }
}

/// Binary frames are read as text. Invalid UTF-8 is replaced rather than
/// dropped so the decoder reports it like any other malformed payload.
fn binary_text(session: SessionId, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(%session, "Binary frame is not valid UTF-8");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}
