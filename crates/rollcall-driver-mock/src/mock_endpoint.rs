//! Simulated Google Apps Script web app.
//!
//! Reproduces the execution model the dispatch protocol has to cope with:
//!
//! 1. `POST <exec url>` runs the script and answers `302 Moved Temporarily`
//!    with an HTML body whose `HREF="..."` points at the result, with `&`
//!    encoded as `&amp;`.
//! 2. `GET <redirect url>` returns the script output as plain text, but only
//!    when the request carries `X-Requested-With: XMLHttpRequest`; otherwise
//!    the text is wrapped in an HTML page.
//!
//! The script itself understands `insert_rows` (answers `Success <n>`) and
//! `test_connection` (answers `Success`). Every exchange can be overridden
//! with an [`EndpointBehaviour`] to exercise failure paths.

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rollcall_core::batch::{EndpointCommand, Row};
use rollcall_core::capabilities::{HttpMethod, HttpReply, HttpRequest, HttpTransport};
use rollcall_core::error::{DriverError, DriverErrorKind};
use std::collections::{HashMap, VecDeque};

const DRIVER_TYPE: &str = "mock_apps_script";

/// Exec URL used when none is given.
pub const DEFAULT_EXEC_URL: &str = "https://script.google.com/macros/s/MOCK_DEPLOYMENT/exec";

const ECHO_URL: &str = "https://script.googleusercontent.com/macros/echo";

/// How the endpoint handles one POST/GET exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndpointBehaviour {
    #[default]
    Healthy,
    /// The POST fails at the transport level.
    Unreachable,
    /// The POST answers this status instead of 302.
    SubmitStatus(u16),
    /// 302 whose body carries no `HREF`.
    MissingRedirect,
    /// The GET answers this status instead of 200.
    RedirectStatus(u16),
    /// The GET answers 200 with this body; the command is not executed.
    UnexpectedBody(String),
}

#[derive(Debug)]
struct PendingResult {
    command: EndpointCommand,
    behaviour: EndpointBehaviour,
}

#[derive(Debug, Default)]
struct EndpointState {
    default_behaviour: EndpointBehaviour,
    scripted: VecDeque<EndpointBehaviour>,
    pending: HashMap<String, PendingResult>,
    next_key: u64,
    commands: Vec<EndpointCommand>,
    sheet: Vec<(String, Row)>,
    posts: u32,
    gets: u32,
}

/// In-process stand-in for the spreadsheet web app.
pub struct MockAppsScript {
    exec_url: String,
    state: Mutex<EndpointState>,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
}

impl MockAppsScript {
    pub fn new() -> Self {
        Self::with_exec_url(DEFAULT_EXEC_URL)
    }

    pub fn with_exec_url(exec_url: impl Into<String>) -> Self {
        Self {
            exec_url: exec_url.into(),
            state: Mutex::new(EndpointState::default()),
            mode: MockMode::Instant,
            timing: TimingConfig::endpoint(),
            error_config: ErrorConfig::none(),
        }
    }

    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_error_config(mut self, error_config: ErrorConfig) -> Self {
        self.error_config = error_config;
        self
    }

    pub fn exec_url(&self) -> &str {
        &self.exec_url
    }

    /// Behaviour for exchanges with nothing scripted.
    pub fn set_behaviour(&self, behaviour: EndpointBehaviour) {
        self.state.lock().default_behaviour = behaviour;
    }

    /// Queue a behaviour for the next exchange only.
    pub fn script(&self, behaviour: EndpointBehaviour) {
        self.state.lock().scripted.push_back(behaviour);
    }

    /// Every command that reached the script, in arrival order.
    pub fn commands(&self) -> Vec<EndpointCommand> {
        self.state.lock().commands.clone()
    }

    /// Rows appended to `sheet_name`.
    pub fn rows(&self, sheet_name: &str) -> Vec<Row> {
        self.state
            .lock()
            .sheet
            .iter()
            .filter(|(sheet, _)| sheet == sheet_name)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn post_count(&self) -> u32 {
        self.state.lock().posts
    }

    pub fn get_count(&self) -> u32 {
        self.state.lock().gets
    }

    async fn settle(&self) {
        if self.mode.simulates_latency() {
            tokio::time::sleep(self.timing.round_trip()).await;
        }
    }

    fn handle_post(&self, request: &HttpRequest) -> Result<HttpReply> {
        let mut state = self.state.lock();
        state.posts += 1;
        let behaviour = match state.scripted.pop_front() {
            Some(behaviour) => behaviour,
            None => state.default_behaviour.clone(),
        };

        if behaviour == EndpointBehaviour::Unreachable {
            return Err(anyhow!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Communication,
                "connection refused",
            )));
        }
        if request.url != self.exec_url {
            return Ok(HttpReply::new(404, "Not Found"));
        }

        let body = request.body.as_deref().unwrap_or_default();
        let command: EndpointCommand = match serde_json::from_str(body) {
            Ok(command) => command,
            Err(e) => return Ok(HttpReply::new(400, format!("Bad Request: {}", e))),
        };
        state.commands.push(command.clone());

        match behaviour {
            EndpointBehaviour::SubmitStatus(status) => {
                Ok(HttpReply::new(status, "<HTML><BODY>Error</BODY></HTML>"))
            }
            EndpointBehaviour::MissingRedirect => Ok(HttpReply::new(
                302,
                "<HTML><HEAD><TITLE>Moved Temporarily</TITLE></HEAD><BODY>Moved</BODY></HTML>",
            )),
            behaviour => {
                state.next_key += 1;
                let key = format!("k{:04}", state.next_key);
                let location = format!("{}?user_content_key={}&amp;lib=MOCK", ECHO_URL, key);
                state
                    .pending
                    .insert(key, PendingResult { command, behaviour });
                Ok(HttpReply::new(
                    302,
                    format!(
                        "<HTML><HEAD><TITLE>Moved Temporarily</TITLE></HEAD>\
                         <BODY BGCOLOR=\"#FFFFFF\" TEXT=\"#000000\">\
                         <H1>Moved Temporarily</H1>\
                         The document has moved <A HREF=\"{}\">here</A>.\
                         </BODY></HTML>",
                        location
                    ),
                ))
            }
        }
    }

    fn handle_get(&self, request: &HttpRequest) -> Result<HttpReply> {
        let mut state = self.state.lock();
        state.gets += 1;

        let Some(query) = request
            .url
            .strip_prefix(ECHO_URL)
            .and_then(|rest| rest.strip_prefix('?'))
        else {
            return Ok(HttpReply::new(404, "Not Found"));
        };
        let params: HashMap<&str, &str> = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        if !params.contains_key("lib") {
            return Ok(HttpReply::new(400, "Bad Request"));
        }
        let Some(pending) = params
            .get("user_content_key")
            .and_then(|key| state.pending.remove(*key))
        else {
            return Ok(HttpReply::new(404, "Not Found"));
        };

        let output = match pending.behaviour {
            EndpointBehaviour::RedirectStatus(status) => {
                return Ok(HttpReply::new(status, "Error"));
            }
            EndpointBehaviour::UnexpectedBody(body) => body,
            _ => match pending.command {
                EndpointCommand::InsertRows { sheet_name, values } => {
                    let inserted = values.len();
                    state
                        .sheet
                        .extend(values.into_iter().map(|row| (sheet_name.clone(), row)));
                    format!("Success {}", inserted)
                }
                EndpointCommand::TestConnection => "Success".to_string(),
            },
        };

        let xhr = request
            .header_value("x-requested-with")
            .is_some_and(|value| value == "XMLHttpRequest");
        if xhr {
            Ok(HttpReply::new(200, output))
        } else {
            Ok(HttpReply::new(
                200,
                format!(
                    "<!DOCTYPE html><html><body><div id=\"output\">{}</div></body></html>",
                    output
                ),
            ))
        }
    }
}

impl Default for MockAppsScript {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockAppsScript {
    async fn execute(&self, request: HttpRequest) -> Result<HttpReply> {
        let operation = match request.method {
            HttpMethod::Post => "post",
            HttpMethod::Get => "get",
        };
        self.error_config
            .check_operation(DRIVER_TYPE, operation)
            .map_err(anyhow::Error::from)?;
        self.settle().await;

        let reply = match request.method {
            HttpMethod::Post => self.handle_post(&request),
            HttpMethod::Get => self.handle_get(&request),
        };
        if let Ok(reply) = &reply {
            tracing::trace!(method = %request.method, status = reply.status, "mock endpoint reply");
        }
        reply
    }
}
