//! HTTP status page.
//!
//! Shows the supervisor state and the most recent activity lines. This is
//! where log retention lives: [`StatusLog`] keeps the last `max_lines` lines
//! and evicts older ones.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::activity::{ActivityLog, LogLine};
use crate::supervisor::SupervisorState;

/// Bounded activity sink backing the status page.
#[derive(Clone)]
pub struct StatusLog {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    max_lines: usize,
}

impl StatusLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(max_lines.min(4096)))),
            max_lines,
        }
    }

    /// Return the retained lines, oldest first.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl ActivityLog for StatusLog {
    fn emit(&self, line: LogLine) {
        if self.max_lines == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.max_lines {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

#[derive(Clone)]
struct PageState {
    log: StatusLog,
    state: watch::Receiver<SupervisorState>,
}

pub fn router(log: StatusLog, state: watch::Receiver<SupervisorState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/logs", get(logs))
        .route("/health", get(health))
        .with_state(PageState { log, state })
}

/// Bind `addr` and serve until `shutdown` turns true.
pub async fn serve(
    addr: SocketAddr,
    log: StatusLog,
    state: watch::Receiver<SupervisorState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(target: "status", "Status page listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(log, state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

async fn index(State(page): State<PageState>) -> impl IntoResponse {
    let state = *page.state.borrow();
    Html(render_page(state, &page.log.lines()))
}

async fn logs(State(page): State<PageState>) -> Json<Vec<LogLine>> {
    Json(page.log.lines())
}

async fn health() -> &'static str {
    "ok"
}

pub fn render_page(state: SupervisorState, lines: &[LogLine]) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta http-equiv=\"refresh\" content=\"5\">\n<title>afkbot</title>\n\
         <style>body{font-family:monospace;background:#111;color:#ddd}\
         .warn{color:#e5c07b}.error{color:#e06c75}.fatal{color:#fff;background:#a00}</style>\n\
         </head>\n<body>\n",
    );
    let _ = writeln!(page, "<h1>afkbot: {}</h1>", state);
    page.push_str("<pre>\n");
    for line in lines {
        let _ = writeln!(
            page,
            "<span class=\"{}\">{}</span>",
            level_class(line),
            escape_html(&line.to_string())
        );
    }
    page.push_str("</pre>\n</body>\n</html>\n");
    page
}

fn level_class(line: &LogLine) -> &'static str {
    use crate::activity::LogLevel;
    match line.level {
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
        LogLevel::Fatal => "fatal",
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::LogLevel;

    fn line(level: LogLevel, text: &str) -> LogLine {
        LogLine::new(level, "test", text)
    }

    #[test]
    fn test_status_log_evicts_oldest() {
        let log = StatusLog::new(2);
        log.emit(line(LogLevel::Info, "one"));
        log.emit(line(LogLevel::Info, "two"));
        log.emit(line(LogLevel::Info, "three"));

        let texts: Vec<_> = log.lines().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let log = StatusLog::new(0);
        log.emit(line(LogLevel::Info, "dropped"));
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_page_escapes_server_text() {
        let page = render_page(
            SupervisorState::Active,
            &[
                line(LogLevel::Info, "<script>alert('x')</script>"),
                line(LogLevel::Fatal, "giving up"),
            ],
        );
        assert!(page.contains("<h1>afkbot: active</h1>"));
        assert!(page.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!page.contains("<script>"));
        assert!(page.contains("<span class=\"fatal\">"));
        assert!(page.contains("[FATAL] test: giving up"));
    }

    #[tokio::test]
    async fn test_logs_handler_returns_retained_lines() {
        let log = StatusLog::new(10);
        log.emit(line(LogLevel::Warn, "kicked"));
        let (_tx, state) = watch::channel(SupervisorState::Connecting);

        let Json(lines) = logs(State(PageState { log, state })).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "kicked");
    }
}
