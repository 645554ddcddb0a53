use lensbench_core::config::{ConnectRequest, EngineConfig};
use lensbench_core::gcode;
use lensbench_core::lens::LensClass;
use lensbench_core::protocol::{
    CommunicationChannel, ConnectionState, Connector, Engine, EngineEvent, EventReceiver,
    OutboundCommand, PortInfo, ProtocolError,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

/// Both ends of an in-memory serial line plus a scripted controller
#[derive(Default)]
struct Wire {
    incoming: VecDeque<u8>,
    partial: Vec<u8>,
    written: Vec<String>,
    fail_writes: bool,
    fail_reads: bool,
    responder: Option<Responder>,
}

type SharedWire = Arc<Mutex<Wire>>;

impl Wire {
    fn respond_with(wire: &SharedWire, responder: impl FnMut(&str) -> Vec<String> + Send + 'static) {
        wire.lock().unwrap().responder = Some(Box::new(responder));
    }

    fn written(wire: &SharedWire) -> Vec<String> {
        wire.lock().unwrap().written.clone()
    }
}

struct MockChannel {
    wire: SharedWire,
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        if wire.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if wire.incoming.is_empty() {
            drop(wire);
            std::thread::sleep(Duration::from_millis(2));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(wire.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(wire.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.wire.lock().unwrap();
        let wire = &mut *guard;
        if wire.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
        }
        wire.partial.extend_from_slice(buf);
        while let Some(pos) = wire.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = wire.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).to_string();
            let replies = match wire.responder.as_mut() {
                Some(responder) => responder(&line),
                None => Vec::new(),
            };
            wire.written.push(line);
            for reply in replies {
                wire.incoming.extend(reply.as_bytes());
                wire.incoming.push_back(b'\n');
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for MockChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.wire.lock().unwrap().incoming.clear();
        Ok(())
    }
}

#[derive(Default)]
struct MockConnector {
    wire: SharedWire,
    refuse: Option<String>,
    enumeration_broken: bool,
}

impl Connector for MockConnector {
    fn open(
        &self,
        port: &str,
        _baud_rate: u32,
        _read_timeout: Duration,
    ) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        if let Some(reason) = &self.refuse {
            return Err(ProtocolError::ConnectFailed {
                port: port.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(Box::new(MockChannel {
            wire: Arc::clone(&self.wire),
        }))
    }

    fn try_list_ports(&self) -> Result<Vec<PortInfo>, ProtocolError> {
        if self.enumeration_broken {
            return Err(ProtocolError::EnumerationFailed("udev unavailable".into()));
        }
        Ok(vec![PortInfo::bare("/dev/ttyMOCK0")])
    }

    fn list_ports(&self) -> Vec<PortInfo> {
        Vec::new()
    }
}

const IDLE_15: &str = "<Idle|MPos:0.000,0.000,0.000,0.000|Bf:15,128|Pn:>";

fn quiet_config() -> EngineConfig {
    EngineConfig {
        read_timeout_ms: 20,
        status_poll_interval_ms: 0,
        ..Default::default()
    }
}

fn request() -> ConnectRequest {
    ConnectRequest::new("/dev/ttyMOCK0", 115200, Duration::from_millis(20))
}

async fn next_event(rx: &mut EventReceiver) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn assert_no_event(rx: &mut EventReceiver) {
    let res = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(res.is_err(), "unexpected event: {:?}", res);
}

async fn wait_for_written(wire: &SharedWire, count: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let written = Wire::written(wire);
        if written.len() >= count || Instant::now() > deadline {
            return written;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn connected(connector: MockConnector) -> (Engine, EventReceiver) {
    let (engine, mut events) = Engine::with_connector(quiet_config(), connector).unwrap();
    engine.connect(request()).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Connected)
    );
    (engine, events)
}

#[tokio::test]
async fn test_connect_reaches_connected_through_connecting() {
    let (engine, _events) = connected(MockConnector::default()).await;
    assert_eq!(engine.state(), ConnectionState::Connected);
    assert!(matches!(
        engine.connect(request()),
        Err(ProtocolError::AlreadyConnected)
    ));
}

#[tokio::test]
async fn test_connect_failure_returns_to_disconnected() {
    let connector = MockConnector {
        refuse: Some("device busy".into()),
        ..Default::default()
    };
    let (engine, mut events) = Engine::with_connector(quiet_config(), connector).unwrap();
    engine.connect(request()).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Connecting)
    );
    match next_event(&mut events).await {
        EngineEvent::Error(cause) => assert!(cause.contains("device busy"), "{}", cause),
        other => panic!("expected Error event, got {:?}", other),
    }
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Disconnected)
    );
    assert!(matches!(engine.send("G0 X1"), Err(ProtocolError::NotConnected)));
}

#[tokio::test]
async fn test_poll_then_move_end_to_end() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    Wire::respond_with(&wire, |line| match line {
        "?" => vec![IDLE_15.to_string()],
        _ => vec!["ok".to_string()],
    });

    let (engine, mut events) = connected(connector).await;
    engine.enqueue(OutboundCommand::status_poll()).unwrap();
    engine.send("G91 X1 F100").unwrap();

    match next_event(&mut events).await {
        EngineEvent::Status(status) => assert_eq!(status.block_buffer_avail(), Some(15)),
        other => panic!("expected Status event, got {:?}", other),
    }

    let written = wait_for_written(&wire, 2).await;
    assert_eq!(written, vec!["?".to_string(), "G91 X1 F100".to_string()]);

    // The controller's "ok" is not turned into an event
    assert_no_event(&mut events).await;
    assert!(engine.is_queue_empty());
}

#[tokio::test]
async fn test_motion_waits_for_free_slots() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    Wire::respond_with(&wire, |line| match line {
        "?" => vec!["<Run|Bf:0,128>".to_string()],
        _ => vec!["ok".to_string()],
    });

    let (engine, mut events) = connected(connector).await;
    engine.enqueue(OutboundCommand::status_poll()).unwrap();
    engine.send("G91 X1 F100").unwrap();
    engine.send("G91 X2 F100").unwrap();

    assert!(matches!(next_event(&mut events).await, EngineEvent::Status(_)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(Wire::written(&wire), vec!["?".to_string()]);
    assert!(!engine.is_queue_empty());

    // One free slot releases exactly one move
    Wire::respond_with(&wire, |line| match line {
        "?" => vec!["<Run|Bf:1,128>".to_string()],
        _ => vec!["ok".to_string()],
    });
    engine.enqueue(OutboundCommand::status_poll()).unwrap();
    assert!(matches!(next_event(&mut events).await, EngineEvent::Status(_)));

    let written = wait_for_written(&wire, 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        written,
        vec!["?".to_string(), "?".to_string(), "G91 X1 F100".to_string()]
    );
    assert_eq!(Wire::written(&wire).len(), 3);
    assert!(!engine.is_queue_empty());
}

#[tokio::test]
async fn test_version_telegram_identifies_lens() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    Wire::respond_with(&wire, |line| match line {
        "$I" => vec![
            "[VER:1.1f-SCE:L086,6ZG-BEG19]".to_string(),
            "[OPT:V,15,128]".to_string(),
            "ok".to_string(),
        ],
        "?" => vec![IDLE_15.to_string()],
        _ => vec!["$110=500.000".to_string(), "ok".to_string()],
    });

    let (engine, mut events) = connected(connector).await;
    for cmd in gcode::discovery_sequence() {
        engine.enqueue(cmd).unwrap();
    }

    assert!(matches!(next_event(&mut events).await, EngineEvent::Status(_)));
    match next_event(&mut events).await {
        EngineEvent::Version(version) => {
            assert_eq!(version.firmware, "1.1f-SCE");
            assert_eq!(version.lens_class(), Some(LensClass::L086));
        }
        other => panic!("expected Version event, got {:?}", other),
    }
    assert_eq!(
        wait_for_written(&wire, 3).await,
        vec!["?".to_string(), "$I".to_string(), "$$".to_string()]
    );
}

#[tokio::test]
async fn test_garbage_lines_are_dropped_silently() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    Wire::respond_with(&wire, |_| {
        vec![
            "<>".to_string(),
            "#$%garbage".to_string(),
            "<Idle|Bf:abc>".to_string(),
            "<Idle|MPos:1,2>".to_string(),
            "<Idle|Bf:4,100>".to_string(),
        ]
    });

    let (engine, mut events) = connected(connector).await;
    engine.enqueue(OutboundCommand::status_poll()).unwrap();

    match next_event(&mut events).await {
        EngineEvent::Status(status) => {
            assert_eq!(status.block_buffer_avail(), Some(4));
            assert_eq!(status.positions, None);
        }
        other => panic!("expected Status event, got {:?}", other),
    }
    assert_no_event(&mut events).await;
    assert_eq!(engine.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_write_failure_enters_error_until_reconnect() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    let (engine, mut events) = connected(connector).await;

    wire.lock().unwrap().fail_writes = true;
    engine.enqueue(OutboundCommand::status_poll()).unwrap();

    match next_event(&mut events).await {
        EngineEvent::Error(cause) => assert!(cause.contains("cable pulled"), "{}", cause),
        other => panic!("expected Error event, got {:?}", other),
    }
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Error)
    );
    assert!(matches!(engine.send("G0 X1"), Err(ProtocolError::NotConnected)));

    // A disconnect request does not leave the error state
    engine.disconnect().unwrap();
    assert_no_event(&mut events).await;
    assert_eq!(engine.state(), ConnectionState::Error);

    wire.lock().unwrap().fail_writes = false;
    engine.connect(request()).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Connected)
    );
}

#[tokio::test]
async fn test_read_failure_enters_error() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    let (engine, mut events) = connected(connector).await;

    wire.lock().unwrap().fail_reads = true;

    match next_event(&mut events).await {
        EngineEvent::Error(cause) => assert!(cause.contains("device unplugged"), "{}", cause),
        other => panic!("expected Error event, got {:?}", other),
    }
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Error)
    );
    assert!(matches!(engine.send("G0 X1"), Err(ProtocolError::NotConnected)));
    assert!(engine.is_queue_empty());
}

#[tokio::test]
async fn test_replies_to_earlier_polls_never_overfill_planner() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    // Two free planner slots that never drain
    let mut free: u32 = 2;
    Wire::respond_with(&wire, move |line| {
        if line == "?" {
            vec![format!("<Run|Bf:{},128>", free)]
        } else {
            free = free.saturating_sub(1);
            vec!["ok".to_string()]
        }
    });

    let config = EngineConfig {
        read_timeout_ms: 20,
        status_poll_interval_ms: 1,
        ..Default::default()
    };
    let (engine, mut events) = Engine::with_connector(config, connector).unwrap();
    engine.connect(request()).unwrap();
    while next_event(&mut events).await != EngineEvent::StateChanged(ConnectionState::Connected) {}

    for i in 0..8 {
        engine.send(&format!("G91 X{} F100", i)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    let moves: Vec<String> = Wire::written(&wire)
        .into_iter()
        .filter(|l| l.starts_with("G91"))
        .collect();
    assert_eq!(moves, vec!["G91 X0 F100".to_string(), "G91 X1 F100".to_string()]);
    assert_eq!(engine.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_disconnect_and_shutdown_return_config() {
    let (engine, mut events) = connected(MockConnector::default()).await;

    engine.disconnect().unwrap();
    assert_eq!(
        next_event(&mut events).await,
        EngineEvent::StateChanged(ConnectionState::Disconnected)
    );
    assert!(engine.is_queue_empty());

    let config = engine.shutdown().unwrap();
    assert_eq!(config.port_name, "/dev/ttyMOCK0");
    assert_eq!(config.read_timeout_ms, 20);
}

#[tokio::test]
async fn test_automatic_status_polling() {
    let connector = MockConnector::default();
    let wire = Arc::clone(&connector.wire);
    Wire::respond_with(&wire, |line| match line {
        "?" => vec![IDLE_15.to_string()],
        _ => Vec::new(),
    });

    let config = EngineConfig {
        read_timeout_ms: 20,
        status_poll_interval_ms: 30,
        ..Default::default()
    };
    let (engine, mut events) = Engine::with_connector(config, connector).unwrap();
    engine.connect(request()).unwrap();

    let mut statuses = 0;
    while statuses < 2 {
        if let EngineEvent::Status(_) = next_event(&mut events).await {
            statuses += 1;
        }
    }
    assert!(Wire::written(&wire).iter().all(|l| l == "?"));
}

#[tokio::test]
async fn test_port_enumeration_failure_is_reported() {
    let connector = MockConnector {
        enumeration_broken: true,
        ..Default::default()
    };
    let (engine, mut events) = Engine::with_connector(quiet_config(), connector).unwrap();

    assert!(engine.list_ports().is_empty());
    match next_event(&mut events).await {
        EngineEvent::Error(cause) => assert!(cause.contains("udev unavailable")),
        other => panic!("expected Error event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_port_listing() {
    let (engine, _events) = Engine::with_connector(quiet_config(), MockConnector::default()).unwrap();
    let ports = engine.list_ports();
    assert_eq!(ports, vec![PortInfo::bare("/dev/ttyMOCK0")]);
}
