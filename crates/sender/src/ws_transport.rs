//! Transporte WebSocket (tungstenite) com uma thread de I/O por conexão.
//!
//! `connect` retorna na hora; a thread conecta, escreve os frames
//! enfileirados, lê (e só registra) as mensagens do servidor e reporta
//! aberta/falha/fechada pela fila de eventos da sessão.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use sensor_core::config::Endpoint;
use sensor_core::connection::{Transport, TransportError, TransportEvent, TransportFactory};
use sensor_core::protocol::{CLOSE_NORMAL, REASON_APP_DISCONNECTED};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::handshake::client::Response;
use tungstenite::{Message, WebSocket};

/// Timeout de leitura: quanto um frame pendente pode esperar pela escrita.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Tempo máximo aguardando o servidor confirmar o fechamento.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Código usado quando o servidor fecha sem enviar status (RFC 6455).
const CLOSE_NO_STATUS: u16 = 1005;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Handle de uma conexão WebSocket.
pub struct WsTransport {
    outbound: Sender<Outbound>,
    closed: bool,
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

/// Cria conexões WebSocket reais.
#[derive(Debug, Default)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    type Transport = WsTransport;

    fn connect(
        &mut self,
        url: &str,
        conn_id: u64,
        connect_timeout: Option<Duration>,
        events: Sender<TransportEvent>,
    ) -> WsTransport {
        let (tx, rx) = unbounded::<Outbound>();
        let url = url.to_owned();
        let spawn_events = events.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("ws-client-{conn_id}"))
            .spawn(move || connection_thread(&url, conn_id, connect_timeout, &rx, &events));

        if let Err(e) = spawned {
            error!("Falha ao criar thread de rede: {e}");
            let _ = spawn_events.send(TransportEvent::Failed {
                conn_id,
                error: TransportError::Io(e.to_string()),
            });
        }

        WsTransport {
            outbound: tx,
            closed: false,
        }
    }
}

fn connection_thread(
    url: &str,
    conn_id: u64,
    connect_timeout: Option<Duration>,
    outbound: &Receiver<Outbound>,
    events: &Sender<TransportEvent>,
) {
    let mut ws = match open(url, connect_timeout) {
        Ok(ws) => ws,
        Err(error) => {
            let _ = events.send(TransportEvent::Failed { conn_id, error });
            return;
        }
    };

    info!("WebSocket aberto: {url}");
    let _ = events.send(TransportEvent::Opened { conn_id });

    if let Some(event) = io_loop(&mut ws, conn_id, outbound, events) {
        let _ = events.send(event);
    }
    debug!("Thread da conexão #{conn_id} finalizada");
}

/// Resolve, conecta (com timeout opcional) e faz o handshake.
fn open(url: &str, connect_timeout: Option<Duration>) -> Result<Socket, TransportError> {
    let endpoint =
        Endpoint::parse(url).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

    let addrs: Vec<SocketAddr> = endpoint
        .socket_addr()
        .to_socket_addrs()
        .map_err(|e| TransportError::Connect(format!("DNS {}: {e}", endpoint.host)))?
        .collect();

    let stream = connect_any(&addrs, connect_timeout)?;
    stream.set_nodelay(true).ok();

    // Handshake com o mesmo limite da conexão TCP
    stream.set_read_timeout(connect_timeout).ok();
    stream.set_write_timeout(connect_timeout).ok();
    let socket = stream
        .try_clone()
        .map_err(|e| TransportError::Io(e.to_string()))?;

    let (ws, response) = handshake(url, endpoint.secure, stream)?;
    debug!("Handshake concluído: HTTP {}", response.status());

    socket
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|e| TransportError::Io(e.to_string()))?;
    socket.set_write_timeout(None).ok();

    Ok(ws)
}

#[cfg(feature = "tls")]
fn handshake(
    url: &str,
    _secure: bool,
    stream: TcpStream,
) -> Result<(Socket, Response), TransportError> {
    tungstenite::client_tls_with_config(url, stream, None, None)
        .map_err(|e| TransportError::Connect(e.to_string()))
}

#[cfg(not(feature = "tls"))]
fn handshake(
    url: &str,
    secure: bool,
    stream: TcpStream,
) -> Result<(Socket, Response), TransportError> {
    if secure {
        return Err(TransportError::Connect(
            "wss:// requer a feature `tls` do sensor_sender".into(),
        ));
    }
    tungstenite::client::client_with_config(url, MaybeTlsStream::Plain(stream), None)
        .map_err(|e| TransportError::Connect(e.to_string()))
}

fn connect_any(addrs: &[SocketAddr], timeout: Option<Duration>) -> Result<TcpStream, TransportError> {
    let mut last_error = TransportError::Connect("nenhum endereço resolvido".into());

    for addr in addrs {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(addr, t),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                let ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
                debug!("Timeout conectando a {addr}");
                last_error = TransportError::ConnectTimeout(ms);
            }
            Err(e) => {
                debug!("Falha conectando a {addr}: {e}");
                last_error = TransportError::Connect(format!("{addr}: {e}"));
            }
        }
    }

    Err(last_error)
}

/// Escreve e lê até a conexão terminar. Retorna o evento final a reportar
/// (nenhum se o fechamento partiu do cliente).
fn io_loop(
    ws: &mut Socket,
    conn_id: u64,
    outbound: &Receiver<Outbound>,
    events: &Sender<TransportEvent>,
) -> Option<TransportEvent> {
    let mut closing_since: Option<Instant> = None;
    let mut remote_close: Option<(u16, String)> = None;

    loop {
        match closing_since {
            None => loop {
                match outbound.try_recv() {
                    Ok(Outbound::Text(text)) => {
                        if let Err(e) = ws.send(Message::Text(text)) {
                            warn!("Erro ao enviar frame: {e}");
                            return Some(TransportEvent::Failed {
                                conn_id,
                                error: TransportError::Io(e.to_string()),
                            });
                        }
                    }
                    Ok(Outbound::Close { code, reason }) => {
                        begin_close(ws, code, reason);
                        closing_since = Some(Instant::now());
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        begin_close(ws, CLOSE_NORMAL, REASON_APP_DISCONNECTED.into());
                        closing_since = Some(Instant::now());
                        break;
                    }
                }
            },
            Some(since) if since.elapsed() >= CLOSE_GRACE => {
                debug!("Servidor não confirmou o fechamento a tempo");
                return None;
            }
            Some(_) => {}
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                if closing_since.is_none() {
                    let _ = events.send(TransportEvent::Message { conn_id, text });
                }
            }
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    remote_close = Some((u16::from(frame.code), frame.reason.to_string()));
                }
            }
            Ok(Message::Binary(data)) => {
                debug!("Mensagem binária do servidor ignorada ({} bytes)", data.len());
            }
            Ok(other) => debug!("Controle do servidor: {other:?}"),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                if closing_since.is_some() {
                    return None;
                }
                let (code, reason) = remote_close.unwrap_or((CLOSE_NO_STATUS, String::new()));
                return Some(TransportEvent::Closed {
                    conn_id,
                    code,
                    reason,
                });
            }
            Err(e) => {
                if closing_since.is_some() {
                    debug!("Erro durante o fechamento: {e}");
                    return None;
                }
                return Some(TransportEvent::Failed {
                    conn_id,
                    error: TransportError::Io(e.to_string()),
                });
            }
        }
    }
}

fn begin_close(ws: &mut Socket, code: u16, reason: String) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    if let Err(e) = ws.close(Some(frame)) {
        debug!("Erro ao iniciar fechamento: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_core::protocol::REASON_SESSION_STOPPED;
    use std::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    fn loopback() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, format!("ws://127.0.0.1:{port}/"))
    }

    fn connect(url: &str) -> (WsTransport, Receiver<TransportEvent>) {
        let (tx, rx) = unbounded();
        let transport = WsTransportFactory.connect(url, 1, Some(WAIT), tx);
        (transport, rx)
    }

    #[test]
    fn frames_arrive_in_order_and_close_carries_reason() {
        let (listener, url) = loopback();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            let mut texts = Vec::new();
            let mut close = None;
            loop {
                match ws.read() {
                    Ok(Message::Text(text)) => texts.push(text),
                    Ok(Message::Close(frame)) => {
                        close = frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            (texts, close)
        });

        let (mut transport, events) = connect(&url);
        assert!(matches!(
            events.recv_timeout(WAIT),
            Ok(TransportEvent::Opened { conn_id: 1 })
        ));

        for i in 0..50 {
            transport.send_text(format!("frame-{i}")).unwrap();
        }
        transport.close(CLOSE_NORMAL, REASON_SESSION_STOPPED);
        assert!(matches!(
            transport.send_text("late".into()),
            Err(TransportError::Closed)
        ));

        let (texts, close) = server.join().unwrap();
        let expected: Vec<String> = (0..50).map(|i| format!("frame-{i}")).collect();
        assert_eq!(texts, expected);
        assert_eq!(close, Some((1000, "session stopped".to_owned())));

        // Fechamento iniciado pelo cliente não gera evento final
        assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn server_close_reports_code_and_reason() {
        let (listener, url) = loopback();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "bye".into(),
            }))
            .unwrap();
            while ws.read().is_ok() {}
        });

        let (_transport, events) = connect(&url);
        assert!(matches!(
            events.recv_timeout(WAIT),
            Ok(TransportEvent::Opened { conn_id: 1 })
        ));
        match events.recv_timeout(WAIT) {
            Ok(TransportEvent::Closed {
                conn_id,
                code,
                reason,
            }) => {
                assert_eq!(conn_id, 1);
                assert_eq!(code, 1001);
                assert_eq!(reason, "bye");
            }
            other => panic!("esperava Closed, veio {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn server_text_is_forwarded_and_binary_only_logged() {
        let (listener, url) = loopback();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            ws.send(Message::Binary(vec![1, 2, 3])).unwrap();
            ws.send(Message::Text("ack".into())).unwrap();
            while ws.read().is_ok() {}
        });

        let (mut transport, events) = connect(&url);
        assert!(matches!(
            events.recv_timeout(WAIT),
            Ok(TransportEvent::Opened { .. })
        ));
        match events.recv_timeout(WAIT) {
            Ok(TransportEvent::Message { conn_id, text }) => {
                assert_eq!(conn_id, 1);
                assert_eq!(text, "ack");
            }
            other => panic!("esperava Message, veio {other:?}"),
        }
        transport.close(CLOSE_NORMAL, REASON_SESSION_STOPPED);
        server.join().unwrap();
    }

    #[test]
    fn refused_port_reports_failed() {
        let (listener, url) = loopback();
        drop(listener);

        let (_transport, events) = connect(&url);
        assert!(matches!(
            events.recv_timeout(WAIT),
            Ok(TransportEvent::Failed {
                conn_id: 1,
                error: TransportError::Connect(_) | TransportError::ConnectTimeout(_)
            })
        ));
    }

    #[test]
    fn malformed_url_reports_failed() {
        let (_transport, events) = connect("http://127.0.0.1:1/");
        assert!(matches!(
            events.recv_timeout(WAIT),
            Ok(TransportEvent::Failed {
                error: TransportError::InvalidEndpoint(_),
                ..
            })
        ));
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn secure_endpoint_without_tls_feature_fails() {
        let (listener, url) = loopback();
        let url = url.replacen("ws://", "wss://", 1);

        let (_transport, events) = connect(&url);
        match events.recv_timeout(WAIT) {
            Ok(TransportEvent::Failed {
                error: TransportError::Connect(msg),
                ..
            }) => assert!(msg.contains("tls")),
            other => panic!("esperava Failed, veio {other:?}"),
        }
        drop(listener);
    }
}
