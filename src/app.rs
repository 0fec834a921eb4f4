//! Assembly of the coordinator from configuration and run options.

use rollcall_core::{CardReader, HttpTransport, NetworkLink, StatusSink, UpdateGate};
use rollcall_driver_mock::{demo_roster, MockAppsScript, MockCardReader, MockMode};
use std::sync::Arc;
use tracing::info;

use crate::config::RollcallConfig;
use crate::coordinator::Coordinator;
use crate::dispatch::{AppsScriptDispatcher, Dispatcher, ReqwestTransport};
use crate::error::{AppError, AppResult};
use crate::feedback::TracingSink;
use crate::link::HostLink;

/// Chance that a simulated presence poll finds a roster card. At the default
/// tick rate this is a tap every few seconds.
const SIMULATED_TAP_RATE: f64 = 0.002;

/// How `rollcall run` picks its collaborators.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Use the simulated card reader.
    pub simulate: bool,
    /// Talk to the in-process endpoint instead of the network.
    pub offline: bool,
    /// Seed for the simulated reader.
    pub seed: Option<u64>,
}

/// HTTP transport plus the URL the dispatcher should post to.
pub fn transport(
    config: &RollcallConfig,
    offline: bool,
) -> AppResult<(Arc<dyn HttpTransport>, String)> {
    if offline {
        let endpoint = MockAppsScript::new().with_mode(MockMode::Realistic);
        let url = endpoint.exec_url().to_string();
        info!(url = %url, "using in-process endpoint");
        return Ok((Arc::new(endpoint), url));
    }
    let client = ReqwestTransport::new(config.endpoint.timeout(), config.endpoint.insecure_tls)?;
    Ok((Arc::new(client), config.endpoint.url.clone()))
}

pub fn dispatcher(
    config: &RollcallConfig,
    offline: bool,
    sink: Arc<dyn StatusSink>,
) -> AppResult<Arc<dyn Dispatcher>> {
    let (transport, url) = transport(config, offline)?;
    Ok(Arc::new(AppsScriptDispatcher::new(
        transport,
        url,
        config.endpoint.sheet_name.clone(),
        config.endpoint.retry_policy(),
        sink,
    )))
}

pub fn card_reader(options: &RunOptions) -> AppResult<Arc<dyn CardReader>> {
    if !options.simulate {
        return Err(AppError::Configuration(
            "no card reader driver is available on this host; run with --simulate".into(),
        ));
    }
    info!(seed = ?options.seed, "using simulated card reader");
    Ok(Arc::new(MockCardReader::simulated(
        demo_roster(),
        SIMULATED_TAP_RATE,
        options.seed,
    )))
}

/// Build a ready-to-start coordinator that reports through tracing.
pub fn coordinator(
    config: &RollcallConfig,
    options: &RunOptions,
    gate: UpdateGate,
) -> AppResult<Coordinator> {
    let sink: Arc<dyn StatusSink> = Arc::new(TracingSink);
    let reader = card_reader(options)?;
    let dispatcher = dispatcher(config, options.offline, sink.clone())?;
    let link: Arc<dyn NetworkLink> = Arc::new(HostLink);
    Ok(Coordinator::new(
        config, reader, dispatcher, link, sink, gate,
    )?)
}
