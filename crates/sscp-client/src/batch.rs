//! Greedy grouping of variable reads into wire-sized requests.

use sscp_core::frame::HEADER_LEN;
use sscp_core::pdu::{ReadDataRequest, VariableAddress};

/// Size limits one read request must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Largest request data length the PLC accepts (announced at login).
    pub max_request_data: usize,
    /// Largest reply data length this client accepts.
    pub max_reply_data: usize,
    pub max_variables: usize,
}

impl PlannerConfig {
    /// Limits for a session where the PLC accepts `max_data` request bytes
    /// and the client declared `max_receive` as its reply frame limit.
    pub fn new(max_data: u16, max_receive: u16, max_variables: usize) -> Self {
        Self {
            max_request_data: usize::from(max_data),
            max_reply_data: usize::from(max_receive).saturating_sub(HEADER_LEN),
            max_variables: max_variables.max(1),
        }
    }
}

/// One planned read request: indices into the caller's variable list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBatch {
    pub indices: Vec<usize>,
    /// Expected reply data length.
    pub reply_len: usize,
}

impl ReadBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn fits(&self, length: usize, config: &PlannerConfig) -> bool {
        let count = self.indices.len() + 1;
        count <= config.max_variables
            && ReadDataRequest::encoded_len(count) <= config.max_request_data
            && self.reply_len + length <= config.max_reply_data
    }
}

/// Split `variables` into consecutive batches, preserving order.
///
/// A variable too large for any batch still gets a batch of its own; the PLC
/// then reports it as failing.
pub fn plan_reads(variables: &[VariableAddress], config: &PlannerConfig) -> Vec<ReadBatch> {
    let mut batches = Vec::new();
    let mut current = ReadBatch::default();

    for (index, variable) in variables.iter().enumerate() {
        let length = usize::try_from(variable.length).unwrap_or(usize::MAX);
        if !current.is_empty() && !current.fits(length, config) {
            batches.push(std::mem::take(&mut current));
        }
        current.indices.push(index);
        current.reply_len = current.reply_len.saturating_add(length);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
