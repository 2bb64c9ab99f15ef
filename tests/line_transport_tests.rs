// The TCP line transport against a scripted server on 127.0.0.1.

use std::time::Duration;

use afkbot::transport::line::{LineConnector, MAX_LINE_LEN};
use afkbot::transport::{Connector, Input, Position, SessionEvent, SessionHandle, SessionParams};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

const STEP: Duration = Duration::from_secs(5);

fn params(port: u16) -> SessionParams {
    SessionParams {
        username: "AfkBot".to_string(),
        password: None,
        host: "127.0.0.1".to_string(),
        port,
        version: "1.20.1".to_string(),
    }
}

async fn next_event(handle: &mut SessionHandle) -> SessionEvent {
    timeout(STEP, handle.events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

async fn next_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Option<String> {
    timeout(STEP, lines.next_line())
        .await
        .expect("timed out waiting for a client line")
        .unwrap()
}

async fn send(writer: &mut OwnedWriteHalf, line: &str) {
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
}

async fn connect() -> (
    SessionHandle,
    Lines<BufReader<OwnedReadHalf>>,
    OwnedWriteHalf,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = LineConnector::default()
        .create_session(&params(port))
        .unwrap();
    let (stream, _) = timeout(STEP, listener.accept()).await.unwrap().unwrap();
    let (read_half, write_half) = stream.into_split();
    (handle, BufReader::new(read_half).lines(), write_half)
}

#[tokio::test]
async fn test_login_line_and_server_events() {
    let (mut handle, mut lines, mut writer) = connect().await;

    assert_eq!(
        next_line(&mut lines).await.as_deref(),
        Some("login AfkBot 1.20.1")
    );

    send(&mut writer, "spawn").await;
    send(&mut writer, "chat Please /register <password> <password>").await;
    send(&mut writer, "keepalive 1").await;
    send(&mut writer, "goal_reached 10 64 -5").await;
    send(&mut writer, "kick Idle too long").await;

    assert_eq!(next_event(&mut handle).await, SessionEvent::Spawned);
    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::Message("Please /register <password> <password>".to_string())
    );
    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::GoalReached {
            position: Some(Position::new(10.0, 64.0, -5.0))
        }
    );
    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::Kicked {
            reason: "Idle too long".to_string()
        }
    );
}

#[tokio::test]
async fn test_client_frames_and_quit() {
    let (mut handle, mut lines, _writer) = connect().await;
    next_line(&mut lines).await;

    handle.session.send_command("/login hunter2");
    handle.session.seek_goal(Position::new(1.0, 2.0, 3.0));
    handle.session.set_input_state(Input::Jump, true);
    handle.session.end();

    assert_eq!(
        next_line(&mut lines).await.as_deref(),
        Some("chat /login hunter2")
    );
    assert_eq!(next_line(&mut lines).await.as_deref(), Some("goal 1 2 3"));
    assert_eq!(
        next_line(&mut lines).await.as_deref(),
        Some("input jump on")
    );
    assert_eq!(next_line(&mut lines).await.as_deref(), Some("quit"));
    assert_eq!(next_line(&mut lines).await, None);

    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::Ended {
            reason: "client requested disconnect".to_string()
        }
    );
}

#[tokio::test]
async fn test_server_close_ends_session_once() {
    let (mut handle, mut lines, writer) = connect().await;
    next_line(&mut lines).await;

    drop(writer);
    drop(lines);

    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::Ended {
            reason: "server closed the connection".to_string()
        }
    );
    assert_eq!(timeout(STEP, handle.events.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn test_refused_connection_reports_error_then_end() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut handle = LineConnector::default()
        .create_session(&params(port))
        .unwrap();

    assert!(matches!(
        next_event(&mut handle).await,
        SessionEvent::Errored(_)
    ));
    assert!(matches!(
        next_event(&mut handle).await,
        SessionEvent::Ended { .. }
    ));
}

#[tokio::test]
async fn test_bad_server_lines_do_not_end_session() {
    let (mut handle, mut lines, mut writer) = connect().await;
    next_line(&mut lines).await;

    writer.write_all(b"chat caf\xff\n").await.unwrap();
    let oversized = format!("chat {}", "x".repeat(MAX_LINE_LEN));
    send(&mut writer, &oversized).await;
    send(&mut writer, "spawn").await;

    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::Message("caf\u{FFFD}".to_string())
    );
    assert_eq!(next_event(&mut handle).await, SessionEvent::Spawned);
}

#[tokio::test]
async fn test_commands_go_out_while_server_floods() {
    let (mut handle, mut lines, mut writer) = connect().await;
    next_line(&mut lines).await;

    let flood = tokio::spawn(async move {
        let burst = "chat Steve joined the game\n".repeat(256);
        while writer.write_all(burst.as_bytes()).await.is_ok() {
            tokio::task::yield_now().await;
        }
    });

    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::Message("Steve joined the game".to_string())
    );
    handle.session.send_command("/login hunter2");
    assert_eq!(
        next_line(&mut lines).await.as_deref(),
        Some("chat /login hunter2")
    );
    flood.abort();
}
