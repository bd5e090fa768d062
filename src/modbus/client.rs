use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::decoder::{decode_response, validate_frame, Measurement, MIN_RESPONSE_LEN};
use super::protocol::ModbusRequest;
use super::transport::Transport;
use crate::utils::error::{FrameError, ModbusError};

pub const DEFAULT_RESPONSE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    RequestSent,
    AwaitingResponse,
    Completed,
}

/// Result of one request/response exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Measurement(Measurement),
    /// Nothing, or fewer than five bytes, came back.
    NoResponse,
    InvalidFrame(FrameError),
    TransportError(String),
}

impl ExchangeOutcome {
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            ExchangeOutcome::Measurement(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExchangeOutcome::Measurement(_))
    }

    pub fn failure_reason(&self) -> Option<String> {
        match self {
            ExchangeOutcome::Measurement(_) => None,
            ExchangeOutcome::NoResponse => Some("no response".to_string()),
            ExchangeOutcome::InvalidFrame(e) => Some(e.to_string()),
            ExchangeOutcome::TransportError(cause) => Some(cause.clone()),
        }
    }
}

/// Modbus RTU master. Owns the transport and runs one exchange at a time.
pub struct ModbusMaster {
    transport: Box<dyn Transport>,
    response_delay: Duration,
    read_timeout: Duration,
    strict: bool,
    state: ExchangeState,
    transitions: Vec<ExchangeState>,
}

impl ModbusMaster {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            response_delay: DEFAULT_RESPONSE_DELAY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            strict: true,
            state: ExchangeState::Idle,
            transitions: vec![ExchangeState::Idle],
        }
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Lenient mode decodes any frame of five bytes or more without checking it.
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// States visited by the most recent exchange, starting with `Idle`.
    pub fn last_transitions(&self) -> &[ExchangeState] {
        &self.transitions
    }

    fn transition(&mut self, next: ExchangeState) {
        debug!("Exchange state: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    /// Writes the request once and reads at most once. Never retries.
    pub async fn read_register(&mut self, request: &ModbusRequest, scale_factor: f64) -> ExchangeOutcome {
        self.state = ExchangeState::Idle;
        self.transitions.clear();
        self.transitions.push(ExchangeState::Idle);
        let frame = request.to_frame();

        info!(
            "📊 Reading register 0x{:04X} from slave {}",
            request.register_address(),
            request.slave_address()
        );
        debug!("📤 Sending frame: [{}]", frame);

        if let Err(e) = self.transport.write(frame.as_bytes()).await {
            warn!("Write to slave {} failed: {}", request.slave_address(), e);
            self.transition(ExchangeState::Completed);
            return ExchangeOutcome::TransportError(e.to_string());
        }
        self.transition(ExchangeState::RequestSent);

        sleep(self.response_delay).await;

        let expected_len = request.expected_response_len();
        self.transition(ExchangeState::AwaitingResponse);
        let response = match timeout(self.read_timeout, self.transport.read(expected_len)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("Read from slave {} failed: {}", request.slave_address(), e);
                self.transition(ExchangeState::Completed);
                return ExchangeOutcome::TransportError(e.to_string());
            }
            Err(elapsed) => {
                warn!(
                    "⏰ Response timeout from slave {}: {} after {:?}",
                    request.slave_address(),
                    ModbusError::from(elapsed),
                    self.read_timeout
                );
                self.transition(ExchangeState::Completed);
                return ExchangeOutcome::NoResponse;
            }
        };

        debug!("📥 Complete response: [{}] ({} bytes)", hex::encode(&response), response.len());

        let outcome = interpret_response(&response, request, scale_factor, self.strict);
        self.transition(ExchangeState::Completed);
        outcome
    }
}

/// Classifies a raw response the way the master does after its single read.
pub fn interpret_response(
    response: &[u8],
    request: &ModbusRequest,
    scale_factor: f64,
    strict: bool,
) -> ExchangeOutcome {
    if response.len() < MIN_RESPONSE_LEN {
        debug!("Response too short: {} bytes", response.len());
        return ExchangeOutcome::NoResponse;
    }

    if strict {
        return match validate_frame(response, request) {
            Ok(validated) => ExchangeOutcome::Measurement(validated.decode(scale_factor)),
            Err(e) => {
                warn!("❌ Rejected response from slave {}: {}", request.slave_address(), e);
                ExchangeOutcome::InvalidFrame(e)
            }
        };
    }

    if response.len() < request.expected_response_len() {
        warn!(
            "Suspicious response: {} bytes, expected {}; decoding without CRC",
            response.len(),
            request.expected_response_len()
        );
    }

    match decode_response(Some(response), scale_factor) {
        Some(m) => ExchangeOutcome::Measurement(m),
        None => ExchangeOutcome::NoResponse,
    }
}
