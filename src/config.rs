/// Tuning knobs for a [`Reactor`](crate::Reactor).
///
/// Use [`ReactorConfig::builder`] for construction; unset fields fall back
/// to the defaults below.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Size of the fixed chunk each read syscall fills; a read shorter than
    /// this ends the per-event read loop.
    pub read_chunk: usize,
    /// Backlog passed to `listen(2)`.
    pub listen_backlog: i32,
    /// Connection slots allocated up front; the table grows on demand.
    pub initial_slots: usize,
    /// Apply TCP_NODELAY to accepted and connected sockets.
    pub no_delay: bool,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            read_chunk: 1024,
            listen_backlog: 8,
            initial_slots: 16,
            no_delay: true,
        }
    }
}

impl ReactorConfig {
    pub fn builder() -> ReactorConfigBuilder {
        ReactorConfigBuilder::new()
    }
}

pub struct ReactorConfigBuilder {
    read_chunk: Option<usize>,
    listen_backlog: Option<i32>,
    initial_slots: Option<usize>,
    no_delay: Option<bool>,
}

impl ReactorConfigBuilder {
    pub fn new() -> Self {
        Self {
            read_chunk: None,
            listen_backlog: None,
            initial_slots: None,
            no_delay: None,
        }
    }

    pub fn read_chunk(mut self, size: usize) -> Self {
        self.read_chunk = Some(size);
        self
    }

    pub fn listen_backlog(mut self, backlog: i32) -> Self {
        self.listen_backlog = Some(backlog);
        self
    }

    pub fn initial_slots(mut self, slots: usize) -> Self {
        self.initial_slots = Some(slots);
        self
    }

    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = Some(enabled);
        self
    }

    pub fn build(self) -> ReactorConfig {
        let default = ReactorConfig::default();
        ReactorConfig {
            read_chunk: self.read_chunk.unwrap_or(default.read_chunk),
            listen_backlog: self.listen_backlog.unwrap_or(default.listen_backlog),
            initial_slots: self.initial_slots.unwrap_or(default.initial_slots),
            no_delay: self.no_delay.unwrap_or(default.no_delay),
        }
    }
}

impl Default for ReactorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
