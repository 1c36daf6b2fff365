use futures_util::{SinkExt, StreamExt};
use tl_protocol::{ClientFrame, ServerFrame};
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A minimal WebSocket session client for driving the server in tests.
///
/// Connects with credentials either in the query string or via an `init`
/// frame, mirroring the two upgrade paths the endpoint accepts.
pub struct MockSessionClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockSessionClient {
    /// Connect to `base_url` (e.g. `ws://127.0.0.1:8080/ws/v1/sessions`)
    /// with optional `token` and `projectId` query parameters.
    pub async fn connect(
        base_url: &str,
        token: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut url = base_url.to_owned();
        let mut sep = '?';
        if let Some(token) = token {
            url.push(sep);
            url.push_str("token=");
            url.push_str(token);
            sep = '&';
        }
        if let Some(project_id) = project_id {
            url.push(sep);
            url.push_str("projectId=");
            url.push_str(project_id);
        }
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Connect without query credentials and authenticate with an `init`
    /// frame instead (the recommended path: tokens stay out of URL logs).
    pub async fn connect_with_init(
        base_url: &str,
        token: &str,
        project_id: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut client = Self::connect(base_url, None, None).await?;
        client
            .send_frame(&ClientFrame::Init {
                token: Some(token.to_owned()),
                project_id: project_id.map(ToOwned::to_owned),
            })
            .await?;
        Ok(client)
    }

    pub async fn send_frame(
        &mut self,
        frame: &ClientFrame,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(frame)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Send a raw text frame, bypassing frame serialization. For exercising
    /// the server's malformed-input handling.
    pub async fn send_text(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    /// Receive the next server frame, transparently answering transport
    /// pings and skipping pongs.
    pub async fn recv_frame(&mut self) -> Result<ServerFrame, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame: ServerFrame = serde_json::from_str(&text)?;
                    return Ok(frame);
                }
                Some(Ok(Message::Ping(data))) => {
                    self.write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    return Err(format!("connection closed by server (code {code:?})").into());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    /// Collect `count` frames, failing if `deadline` elapses first.
    pub async fn recv_frames(
        &mut self,
        count: usize,
        deadline: std::time::Duration,
    ) -> Result<Vec<ServerFrame>, Box<dyn std::error::Error>> {
        let mut frames = Vec::with_capacity(count);
        let outcome = tokio::time::timeout(deadline, async {
            while frames.len() < count {
                let frame = self.recv_frame().await?;
                frames.push(frame);
            }
            Ok::<_, Box<dyn std::error::Error>>(())
        })
        .await;
        match outcome {
            Ok(inner) => inner?,
            Err(_) => {
                return Err(format!("timed out after {} of {count} frames", frames.len()).into());
            }
        }
        Ok(frames)
    }

    /// Wait for the server to close the connection; returns the close code.
    pub async fn recv_close(&mut self) -> Result<Option<u16>, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Close(frame))) => {
                    return Ok(frame.map(|f| u16::from(f.code)));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.write.send(Message::Pong(data)).await?;
                }
                Some(Ok(_)) => continue,
                Some(Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)) => {
                    return Ok(None);
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    /// Assert that no frame arrives within `window`. Transport ping/pong
    /// traffic is not counted.
    pub async fn expect_silence(
        &mut self,
        window: std::time::Duration,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match tokio::time::timeout(window, self.recv_frame()).await {
            Err(_) => Ok(()),
            Ok(Ok(frame)) => Err(format!("expected silence, got {:?} frame", frame.kind).into()),
            Ok(Err(e)) => Err(e),
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
