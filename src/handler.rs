//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, id
//! assignment, envelope decoding, and bidirectional communication with
//! the RelayServer.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::websocket_config;
use crate::error::AppError;
use crate::message::{self, ClientMessage};
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the connection with the
/// RelayServer, and relays envelopes until the stream ends or a frame
/// fails to decode. There is no retry; reconnecting is up to the client.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream =
        tokio_tungstenite::accept_async_with_config(stream, Some(websocket_config())).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel for server -> client frames
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

    // Register with RelayServer; it allocates our id and queues the assignment
    let (reply_tx, reply_rx) = oneshot::channel();
    if cmd_tx
        .send(ServerCommand::Connect {
            sender: frame_tx,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register connection from {} - server closed", peer_addr);
        return Err(AppError::ChannelSend);
    }
    let client_id = reply_rx.await.map_err(|_| AppError::ChannelSend)?;
    info!("Client {} connected from {}", client_id, peer_addr);

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand)
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match message::decode::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        let cmd = client_message_to_command(client_id, client_msg);
                        if cmd_tx_read.send(cmd).await.is_err() {
                            debug!("Server closed, ending read task for {}", client_id);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Undecodable frame from {}: {}", client_id, e);
                        break;
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(_) => {
                    // Ping/Pong handled by tungstenite; binary frames ignored
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (frames -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                debug!("WebSocket send failed, ending write task");
                break;
            }
        }
        debug!("Write task ended for {}", client_id);

        // Channel dropped by the server (deregistration or shutdown)
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete, then tear down the other direction
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
            write_task.abort();
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
            read_task.abort();
        }
    }

    // No-op if the entry was already removed by deregistration
    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Convert a ClientMessage to a ServerCommand
fn client_message_to_command(from: ClientId, msg: ClientMessage) -> ServerCommand {
    match msg {
        ClientMessage::Registration { client_id } => ServerCommand::Registration { from, client_id },
        ClientMessage::GroupUpdate { group } => ServerCommand::GroupUpdate { from, group },
        ClientMessage::Chat { message } => ServerCommand::Chat { from, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{ChatMessage, Group};
    use crate::types::GroupId;

    #[test]
    fn test_registration_maps_to_command() {
        let cmd = client_message_to_command(
            ClientId(2),
            ClientMessage::Registration { client_id: ClientId(2) },
        );
        assert!(matches!(
            cmd,
            ServerCommand::Registration { from: ClientId(2), client_id: ClientId(2) }
        ));
    }

    #[test]
    fn test_group_and_chat_map_to_commands() {
        let cmd = client_message_to_command(
            ClientId(0),
            ClientMessage::GroupUpdate { group: Group::new("g", [ClientId(0)]) },
        );
        assert!(matches!(cmd, ServerCommand::GroupUpdate { from: ClientId(0), .. }));

        let cmd = client_message_to_command(
            ClientId(1),
            ClientMessage::Chat {
                message: ChatMessage::new(GroupId(0), ClientId(1), "x", vec![]),
            },
        );
        match cmd {
            ServerCommand::Chat { from, message } => {
                assert_eq!(from, ClientId(1));
                assert_eq!(message.text, "x");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
