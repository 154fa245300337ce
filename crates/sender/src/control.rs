//! Superfície de controle pelo terminal.
//!
//! Faz o papel do switch de streaming e do seletor de label: lê comandos do
//! stdin e imprime os avisos da sessão.

use crossbeam_channel::{Receiver, Sender};
use sensor_core::session::{SessionCommand, SessionNotice, SessionState};
use std::io::BufRead;
use tracing::{info, warn};

pub const HELP: &str = "Comandos: on | off | label <nome> | status | help | quit";

/// Interpreta uma linha digitada.
pub fn parse_command(line: &str) -> Result<Option<SessionCommand>, String> {
    let line = line.trim();
    let (word, arg) = match line.split_once(char::is_whitespace) {
        Some((w, a)) => (w, a.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "" | "help" | "?" => return Ok(None),
        "on" | "start" => SessionCommand::Enable,
        "off" | "stop" => SessionCommand::Disable,
        "status" => SessionCommand::Status,
        "quit" | "exit" | "q" => SessionCommand::Shutdown,
        "label" if !arg.is_empty() => SessionCommand::SetLabel(arg.to_owned()),
        "label" => return Err("Uso: label <nome>".into()),
        other => return Err(format!("Comando desconhecido: {other}")),
    };
    Ok(Some(cmd))
}

/// Lê o stdin numa thread própria. EOF encerra a sessão.
pub fn spawn_stdin_reader(commands: Sender<SessionCommand>) {
    let spawned = std::thread::Builder::new()
        .name("stdin-control".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Ok(Some(cmd)) => {
                        let quit = cmd == SessionCommand::Shutdown;
                        if commands.send(cmd).is_err() || quit {
                            return;
                        }
                    }
                    Ok(None) => println!("{HELP}"),
                    Err(e) => println!("{e}\n{HELP}"),
                }
            }
            let _ = commands.send(SessionCommand::Shutdown);
        });

    if let Err(e) = spawned {
        warn!("Sem controle pelo terminal: {e}");
    }
}

/// Imprime os avisos da sessão numa thread própria.
pub fn spawn_notice_printer(notices: Receiver<SessionNotice>) {
    let spawned = std::thread::Builder::new()
        .name("notices".into())
        .spawn(move || {
            for notice in notices {
                print_notice(&notice);
            }
        });

    if let Err(e) = spawned {
        warn!("Avisos da sessão indisponíveis: {e}");
    }
}

fn print_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::ConnectionOpened => info!("✓ Conectado"),
        SessionNotice::StreamingDisabled { reason } => {
            warn!("✗ Streaming desligado: {reason}");
            println!("[switch] OFF");
        }
        SessionNotice::LabelChanged(label) => println!("[label] {label}"),
        SessionNotice::Status(status) => {
            let switch = match status.state {
                SessionState::Running => "ON",
                SessionState::Stopped => "OFF",
            };
            println!("──────────────────────────────");
            println!("  Switch:     {switch}");
            println!("  Conexão:    {:?}", status.connection);
            println!("  Label:      {}", status.label);
            println!(
                "  Frames:     {} enviados | {} descartados | {} tentativas",
                status.stats.frames_sent, status.stats.frames_dropped, status.stats.attempts
            );
            for line in status.sample.display_lines() {
                println!("  {line}");
            }
            println!("──────────────────────────────");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_switch_commands() {
        assert_eq!(parse_command("on"), Ok(Some(SessionCommand::Enable)));
        assert_eq!(parse_command("  OFF \n"), Ok(Some(SessionCommand::Disable)));
        assert_eq!(parse_command("quit"), Ok(Some(SessionCommand::Shutdown)));
        assert_eq!(parse_command("status"), Ok(Some(SessionCommand::Status)));
    }

    #[test]
    fn parses_label_with_argument() {
        assert_eq!(
            parse_command("label walking"),
            Ok(Some(SessionCommand::SetLabel("walking".into())))
        );
        assert!(parse_command("label").is_err());
    }

    #[test]
    fn help_and_unknown() {
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("help"), Ok(None));
        assert!(parse_command("fly").is_err());
    }
}
