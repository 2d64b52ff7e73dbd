//! Accounting events surfaced to external monitoring components.

use serde::Serialize;

use crate::transfer::TransferState;

#[derive(Clone, Serialize)]
pub struct TransferStarted {
    pub transfer_id: u64,
    pub file_name: String,
    pub src_site: String,
    pub dst_site: String,
}

#[derive(Clone, Serialize)]
pub struct TransferFinished {
    pub transfer_id: u64,
    pub file_name: String,
    pub state: TransferState,
    pub transferred: f64,
    pub duration: f64,
}

#[derive(Clone, Serialize)]
pub struct FileDeleted {
    pub file_name: String,
}

#[derive(Clone, Serialize)]
pub struct BillingCompleted {
    pub storage_total: f64,
    pub network_total: f64,
}

#[derive(Clone, Serialize)]
pub struct ActiveTransfersSample {
    pub active_transfers: usize,
    pub files: usize,
}
