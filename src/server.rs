use crate::request::Request;

/// The single processing unit.
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    pub in_service: Option<Request>,
    pub completion_time: f64,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.in_service.is_some()
    }

    /// Whether the request in service has completed by `now`.
    pub fn is_due(&self, now: f64) -> bool {
        self.is_busy() && now >= self.completion_time
    }

    /// Puts `request` into service, finishing `processing_time` after `now`.
    pub fn start(&mut self, request: Request, now: f64, processing_time: f64) {
        debug_assert!(self.in_service.is_none(), "server already busy");
        self.in_service = Some(request);
        self.completion_time = now + processing_time;
    }

    /// Takes the request out of service, leaving the server idle.
    pub fn finish(&mut self) -> Option<Request> {
        self.in_service.take()
    }
}
