//! The communication worker
//!
//! One dedicated thread owns the serial channel for the engine's lifetime. It
//! is the only reader and the only writer, so the byte stream needs no lock.
//! Producers reach it through the shared [`CommandQueue`]; control requests
//! arrive on a channel that is checked once per loop iteration, so a
//! disconnect is honoured within one read timeout.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::commands::CommandTag;
use super::connection::{ConnectionState, EngineEvent};
use super::queue::{CommandQueue, FlowController};
use super::stream::Connector;
use super::telegram::{classify_line, Telegram};
use super::transport::LineTransport;
use super::STATUS_POLL;
use crate::config::{ConnectRequest, EngineConfig};

/// Requests from the engine handle to the worker
#[derive(Debug)]
pub(crate) enum Control {
    Connect(ConnectRequest),
    Disconnect,
    Shutdown,
}

pub(crate) struct Worker {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<EngineEvent>,
    state: watch::Sender<ConnectionState>,
    queue: CommandQueue,
    flow: FlowController,
    transport: Option<LineTransport>,
    last_poll: Option<Instant>,
}

impl Worker {
    pub(crate) fn new(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        control_rx: mpsc::UnboundedReceiver<Control>,
        events: mpsc::UnboundedSender<EngineEvent>,
        state: watch::Sender<ConnectionState>,
        queue: CommandQueue,
    ) -> Self {
        Self {
            config,
            connector,
            control_rx,
            events,
            state,
            queue,
            flow: FlowController::new(),
            transport: None,
            last_poll: None,
        }
    }

    /// Run until shutdown; hands the configuration back
    pub(crate) fn run(mut self) -> EngineConfig {
        debug!("communication worker started");

        loop {
            let keep_running = match self.current_state() {
                ConnectionState::Connected => self.service_session(),
                _ => self.wait_for_request(),
            };
            if !keep_running {
                break;
            }
        }

        if self.current_state() == ConnectionState::Connected {
            self.end_session(ConnectionState::Disconnected);
        }
        debug!("communication worker stopped");
        self.config
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&mut self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "connection state changed");
        self.emit(EngineEvent::StateChanged(next));
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    /// Idle states: block until the handle asks for something
    fn wait_for_request(&mut self) -> bool {
        match self.control_rx.blocking_recv() {
            Some(Control::Connect(request)) => {
                self.connect(request);
                true
            }
            Some(Control::Disconnect) => {
                debug!(state = %self.current_state(), "disconnect request ignored, no session");
                true
            }
            Some(Control::Shutdown) | None => false,
        }
    }

    fn connect(&mut self, request: ConnectRequest) {
        self.set_state(ConnectionState::Connecting);

        self.config.port_name = request.port_name.clone();
        self.config.baud_rate = request.baud_rate;
        self.config.read_timeout_ms = request.read_timeout.as_millis() as u64;
        let read_timeout = self.config.read_timeout();

        info!(
            port = %request.port_name,
            baud = request.baud_rate,
            timeout_ms = read_timeout.as_millis() as u64,
            "opening controller port"
        );

        match self
            .connector
            .open(&request.port_name, request.baud_rate, read_timeout)
        {
            Ok(mut channel) => {
                if let Err(e) = channel.clear_input_buffer() {
                    debug!(error = %e, "could not clear input buffer");
                }
                self.transport = Some(LineTransport::new(channel, self.config.max_line_len));

                let stale = self.queue.clear();
                if stale > 0 {
                    debug!(dropped = stale, "discarded commands queued before connect");
                }
                self.flow.reset();
                self.last_poll = None;
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                error!(port = %request.port_name, error = %e, "connect failed");
                self.emit(EngineEvent::Error(format!("Failed to connect: {}", e)));
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    /// Close the port and leave the session in `next`
    fn end_session(&mut self, next: ConnectionState) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        let dropped = self.queue.clear();
        if dropped > 0 {
            info!(dropped, "pending commands discarded with the session");
        }
        self.flow.reset();
        self.last_poll = None;
        self.set_state(next);
    }

    fn fail(&mut self, err: io::Error) {
        error!(error = %err, "serial I/O failed, closing session");
        self.emit(EngineEvent::Error(format!("Serial connection error: {}", err)));
        self.end_session(ConnectionState::Error);
    }

    /// One iteration of the connected loop
    fn service_session(&mut self) -> bool {
        loop {
            match self.control_rx.try_recv() {
                Ok(Control::Disconnect) => {
                    self.end_session(ConnectionState::Disconnected);
                    return true;
                }
                Ok(Control::Connect(request)) => {
                    warn!(port = %request.port_name, "connect request ignored, already connected");
                }
                Ok(Control::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => break,
            }
        }

        if let Err(e) = self.exchange() {
            self.fail(e);
        }
        true
    }

    fn exchange(&mut self) -> io::Result<()> {
        let read_timeout = self.config.read_timeout();
        let poll_interval = self.config.status_poll_interval();
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no open transport"))?;

        if let Some(interval) = poll_interval {
            let due = self.last_poll.map_or(true, |t| t.elapsed() >= interval);
            if due {
                transport.write_line(STATUS_POLL)?;
                self.flow.poll_sent();
                self.last_poll = Some(Instant::now());
            }
        }

        // One command per iteration keeps the controller's receive buffer
        // from filling faster than it answers.
        if let Some(command) = self.queue.try_dequeue(&mut self.flow) {
            transport.write_line(command.line())?;
            if command.tag() == CommandTag::StatusPoll {
                self.flow.poll_sent();
            }
        }

        if let Some(line) = transport.read_line(read_timeout)? {
            self.handle_line(&line);
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) {
        debug!(line, "received");

        match classify_line(line) {
            Ok(Telegram::Status(status)) => {
                self.flow.observe(&status);
                self.emit(EngineEvent::Status(status));
            }
            Ok(Telegram::Version(version)) => {
                info!(firmware = %version.firmware, ids = ?version.ids, "controller version");
                self.emit(EngineEvent::Version(version));
            }
            Ok(Telegram::ControllerError(code)) => {
                warn!(code = %code, "controller rejected a command");
            }
            Ok(Telegram::Alarm(code)) => {
                warn!(code = %code, "controller alarm");
            }
            Ok(Telegram::Ok) => {}
            Ok(Telegram::Setting { key, value }) => {
                debug!(key = %key, value = %value, "controller setting");
            }
            Ok(Telegram::Message(text)) => {
                debug!(text = %text, "controller message");
            }
            Ok(Telegram::Unrecognized(text)) => {
                debug!(line = %text, "unrecognized line discarded");
            }
            Err(e) => {
                warn!(error = %e, line, "undecodable telegram discarded");
            }
        }
    }
}
