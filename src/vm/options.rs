use std::time::Duration;

/// Runtime configuration. Constructed with `Default` and adjusted through the chained
/// setters before the VM is built.
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Strict checking at the native call boundary: returned references are checked
    /// against the declared return type and violations abort.
    pub check_references: bool,
    /// Length of one wait slice while another thread runs a class initializer. The
    /// state is re-examined after every slice.
    pub init_wait_slice: Duration,
    /// A stop-the-world request taking longer than this gets logged.
    pub suspend_warn_after: Duration,
    /// Upper bound on the number of objects the default heap hands out.
    pub heap_limit: Option<usize>,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            check_references: false,
            init_wait_slice: Duration::from_millis(10),
            suspend_warn_after: Duration::from_secs(1),
            heap_limit: None,
        }
    }
}

impl VmOptions {
    pub fn check_references(mut self, enabled: bool) -> Self {
        self.check_references = enabled;
        self
    }

    pub fn init_wait_slice(mut self, slice: Duration) -> Self {
        self.init_wait_slice = slice;
        self
    }

    pub fn suspend_warn_after(mut self, after: Duration) -> Self {
        self.suspend_warn_after = after;
        self
    }

    pub fn heap_limit(mut self, limit: usize) -> Self {
        self.heap_limit = Some(limit);
        self
    }
}
