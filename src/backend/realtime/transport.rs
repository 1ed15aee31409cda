//! WebSocket transport for the session relay

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use super::relay::{FrameReader, FrameWriter};
use crate::backend::error::BackendError;

pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

impl WsReader {
    pub fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<Option<Bytes>, BackendError> {
        while let Some(message) = self.stream.next().await {
            let message = message.map_err(|e| BackendError::transient(e.to_string()))?;
            match message {
                Message::Text(text) => {
                    return Ok(Some(Bytes::copy_from_slice(text.as_str().as_bytes())))
                }
                Message::Binary(data) => return Ok(Some(data)),
                Message::Close(_) => return Ok(None),
                // Control frames are answered by the websocket layer itself
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
        Ok(None)
    }
}

pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl WsWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), BackendError> {
        let message = match String::from_utf8(frame.to_vec()) {
            Ok(text) => Message::Text(text.into()),
            Err(err) => Message::Binary(Bytes::from(err.into_bytes())),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| BackendError::transient(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.sink
            .close()
            .await
            .map_err(|e| BackendError::transient(e.to_string()))
    }
}
