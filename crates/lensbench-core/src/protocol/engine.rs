//! Engine handle
//!
//! The caller-facing side of the communication worker. Everything here is
//! safe to use from any thread; the handle never touches the serial port.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, watch};
use tracing::warn;

use super::commands::OutboundCommand;
use super::connection::{ConnectionState, EngineEvent};
use super::queue::CommandQueue;
use super::serial::PortInfo;
use super::stream::{Connector, SerialConnector};
use super::worker::{Control, Worker};
use super::ProtocolError;
use crate::config::{ConnectRequest, EngineConfig};
use crate::gcode::CommandLines;

/// Receiving end of the engine's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Handle to a running communication worker
pub struct Engine {
    control_tx: mpsc::UnboundedSender<Control>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    queue: CommandQueue,
    connector: Arc<dyn Connector>,
    worker: Option<JoinHandle<EngineConfig>>,
}

impl Engine {
    /// Start a worker that talks to real serial ports
    pub fn spawn(config: EngineConfig) -> Result<(Self, EventReceiver), ProtocolError> {
        Self::with_connector(config, SerialConnector)
    }

    /// Start a worker that opens its channels through `connector`
    pub fn with_connector<C: Connector>(
        config: EngineConfig,
        connector: C,
    ) -> Result<(Self, EventReceiver), ProtocolError> {
        let connector: Arc<dyn Connector> = Arc::new(connector);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let queue = CommandQueue::new();

        let worker = Worker::new(
            config,
            Arc::clone(&connector),
            control_rx,
            events_tx.clone(),
            state_tx,
            queue.clone(),
        );
        let handle = thread::Builder::new()
            .name("lensbench-serial".to_string())
            .spawn(move || worker.run())?;

        let engine = Self {
            control_tx,
            events_tx,
            state_rx,
            queue,
            connector,
            worker: Some(handle),
        };
        Ok((engine, events_rx))
    }

    /// Current connection state as last published by the worker
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn control(&self, request: Control) -> Result<(), ProtocolError> {
        self.control_tx
            .send(request)
            .map_err(|_| ProtocolError::EngineStopped)
    }

    /// Ask the worker to open a connection.
    ///
    /// The outcome arrives as events: `Connecting`, then `Connected` or an
    /// `Error` followed by `Disconnected`.
    pub fn connect(&self, request: ConnectRequest) -> Result<(), ProtocolError> {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                Err(ProtocolError::AlreadyConnected)
            }
            _ => self.control(Control::Connect(request)),
        }
    }

    /// Ask the worker to close the current session
    pub fn disconnect(&self) -> Result<(), ProtocolError> {
        self.control(Control::Disconnect)
    }

    /// Queue a command for the controller.
    ///
    /// Rejected unless connected; queued commands are dropped when the
    /// session ends.
    pub fn enqueue(&self, command: OutboundCommand) -> Result<(), ProtocolError> {
        if self.state() != ConnectionState::Connected {
            return Err(ProtocolError::NotConnected);
        }
        self.queue.enqueue(command);
        Ok(())
    }

    /// Queue an operator command line, subject to block-buffer flow control
    pub fn send(&self, line: &str) -> Result<(), ProtocolError> {
        self.enqueue(OutboundCommand::motion(line)?)
    }

    /// Queue every line of `lines` in order; nothing is queued if any is invalid
    pub fn send_lines(&self, lines: &CommandLines) -> Result<(), ProtocolError> {
        for command in lines.to_commands()? {
            self.enqueue(command)?;
        }
        Ok(())
    }

    /// Hint for the UI: nothing waiting to be written
    pub fn is_queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enumerate ports for a selection list.
    ///
    /// An enumeration failure is reported as an `Error` event and whatever
    /// the fallback scan found is returned.
    pub fn list_ports(&self) -> Vec<PortInfo> {
        match self.connector.try_list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "port enumeration failed");
                let _ = self.events_tx.send(EngineEvent::Error(e.to_string()));
                self.connector.list_ports()
            }
        }
    }

    /// Stop the worker, closing any open session, and recover the configuration
    pub fn shutdown(mut self) -> Result<EngineConfig, ProtocolError> {
        let handle = self.worker.take().ok_or(ProtocolError::EngineStopped)?;
        let _ = self.control_tx.send(Control::Shutdown);
        handle.join().map_err(|_| ProtocolError::EngineStopped)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.control_tx.send(Control::Shutdown);
            let _ = handle.join();
        }
    }
}
