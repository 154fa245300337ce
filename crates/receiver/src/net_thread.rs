//! Threads de rede: aceitam clientes WebSocket e enviam os frames
//! decodificados para a thread principal via channel.

use crossbeam_channel::{Receiver, Sender, bounded};
use sensor_core::protocol::{StreamFrame, decode_frame};
use std::net::{SocketAddr, TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use tungstenite::Message;
use tungstenite::error::ProtocolError as WsProtocolError;

/// Frame recebido de um cliente.
#[derive(Debug, Clone)]
pub struct NetMessage {
    pub frame: StreamFrame,
    pub source_addr: SocketAddr,
    pub raw_size: usize,
}

/// Evento enviado das threads de rede para a thread principal.
#[derive(Debug, Clone)]
pub enum NetEvent {
    Connected(SocketAddr),
    Frame(NetMessage),
    /// Mensagem que não é um frame válido
    Invalid {
        source_addr: SocketAddr,
        raw: String,
        error: String,
    },
    Disconnected {
        source_addr: SocketAddr,
        graceful: bool,
        detail: String,
    },
}

/// Inicia a thread que aceita conexões. Retorna o receiver do channel.
pub fn spawn_server_thread(bind_ip: String, port: u16, capacity: usize) -> Receiver<NetEvent> {
    let (tx, rx) = bounded::<NetEvent>(capacity);

    let spawned = std::thread::Builder::new()
        .name("ws-acceptor".into())
        .spawn(move || {
            accept_loop(&tx, &bind_ip, port);
        });
    if let Err(e) = spawned {
        error!("Falha ao criar thread de rede: {e}");
    }

    rx
}

fn accept_loop(tx: &Sender<NetEvent>, bind_ip: &str, port: u16) {
    loop {
        match TcpListener::bind(format!("{bind_ip}:{port}")) {
            Ok(listener) => {
                info!("Servidor WebSocket em ws://{bind_ip}:{port}");

                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => spawn_client_thread(stream, tx.clone()),
                        Err(e) => warn!("Erro ao aceitar conexão: {e}"),
                    }
                }
            }
            Err(e) => {
                error!("Falha ao bind porta {port}: {e}. Tentando novamente em 2s...");
                std::thread::sleep(std::time::Duration::from_secs(2));
            }
        }
    }
}

fn spawn_client_thread(stream: TcpStream, tx: Sender<NetEvent>) {
    let addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Conexão sem endereço remoto: {e}");
            return;
        }
    };

    let spawned = std::thread::Builder::new()
        .name(format!("ws-client-{addr}"))
        .spawn(move || client_loop(stream, addr, &tx));
    if let Err(e) = spawned {
        error!("Falha ao criar thread para {addr}: {e}");
    }
}

fn client_loop(stream: TcpStream, addr: SocketAddr, tx: &Sender<NetEvent>) {
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake falhou com {addr}: {e}");
            return;
        }
    };
    let _ = tx.send(NetEvent::Connected(addr));

    let (graceful, detail) = loop {
        match ws.read() {
            Ok(Message::Text(text)) => forward(tx, addr, text.as_bytes()),
            Ok(Message::Binary(data)) => forward(tx, addr, &data),
            Ok(Message::Close(frame)) => {
                debug!("Close de {addr}: {frame:?}");
            }
            Ok(_) => {}
            Err(tungstenite::Error::ConnectionClosed) => break (true, "fechamento normal".into()),
            Err(tungstenite::Error::Protocol(WsProtocolError::ResetWithoutClosingHandshake)) => {
                break (false, "conexão resetada sem close".into());
            }
            Err(e) => break (false, e.to_string()),
        }
    };

    let _ = tx.send(NetEvent::Disconnected {
        source_addr: addr,
        graceful,
        detail,
    });
}

fn forward(tx: &Sender<NetEvent>, addr: SocketAddr, raw: &[u8]) {
    let event = match decode_frame(raw) {
        Ok(frame) => NetEvent::Frame(NetMessage {
            frame,
            source_addr: addr,
            raw_size: raw.len(),
        }),
        Err(e) => NetEvent::Invalid {
            source_addr: addr,
            raw: String::from_utf8_lossy(raw).into_owned(),
            error: e.to_string(),
        },
    };

    // Non-blocking send: se o log está lento, descarta frames
    if tx.try_send(event).is_err() {
        debug!("Channel cheio, descartando frame de {addr}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_core::protocol::{ProtocolProfile, encode_frame};
    use sensor_core::types::Sample;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn addr() -> SocketAddr {
        "10.0.2.15:40000".parse().unwrap()
    }

    fn valid_frame() -> Vec<u8> {
        encode_frame(&Sample::default(), "walking", 1_500, ProtocolProfile::Full).unwrap()
    }

    #[test]
    fn forward_decodes_valid_frame() {
        let (tx, rx) = bounded(4);
        let raw = valid_frame();
        forward(&tx, addr(), &raw);

        match rx.try_recv() {
            Ok(NetEvent::Frame(msg)) => {
                assert_eq!(msg.source_addr, addr());
                assert_eq!(msg.raw_size, raw.len());
                assert_eq!(msg.frame.timestamp, 1_500);
                assert_eq!(msg.frame.label.as_deref(), Some("walking"));
            }
            other => panic!("esperava Frame, veio {other:?}"),
        }
    }

    #[test]
    fn forward_maps_garbage_to_invalid() {
        let (tx, rx) = bounded(4);
        forward(&tx, addr(), b"hello server");

        match rx.try_recv() {
            Ok(NetEvent::Invalid {
                source_addr, raw, ..
            }) => {
                assert_eq!(source_addr, addr());
                assert_eq!(raw, "hello server");
            }
            other => panic!("esperava Invalid, veio {other:?}"),
        }
    }

    #[test]
    fn forward_drops_when_channel_is_full() {
        let (tx, rx) = bounded(1);
        forward(&tx, addr(), &valid_frame());
        forward(&tx, addr(), &valid_frame());
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn client_session_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = bounded(16);

        let server = std::thread::spawn(move || {
            let (stream, peer) = listener.accept().unwrap();
            client_loop(stream, peer, &tx);
        });

        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let (mut ws, _) = tungstenite::client(format!("ws://127.0.0.1:{port}/"), stream).unwrap();
        let text = String::from_utf8(valid_frame()).unwrap();
        ws.send(Message::Text(text)).unwrap();
        ws.send(Message::Text("not json".into())).unwrap();
        ws.close(None).unwrap();
        while ws.read().is_ok() {}

        assert!(matches!(rx.recv_timeout(WAIT), Ok(NetEvent::Connected(_))));
        assert!(matches!(rx.recv_timeout(WAIT), Ok(NetEvent::Frame(_))));
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(NetEvent::Invalid { .. })
        ));
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(NetEvent::Disconnected { graceful: true, .. })
        ));
        server.join().unwrap();
    }

    #[test]
    fn reset_without_close_is_not_graceful() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = bounded(16);

        let server = std::thread::spawn(move || {
            let (stream, peer) = listener.accept().unwrap();
            client_loop(stream, peer, &tx);
        });

        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let (ws, _) = tungstenite::client(format!("ws://127.0.0.1:{port}/"), stream).unwrap();
        drop(ws);

        assert!(matches!(rx.recv_timeout(WAIT), Ok(NetEvent::Connected(_))));
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(NetEvent::Disconnected { graceful: false, .. })
        ));
        server.join().unwrap();
    }
}
