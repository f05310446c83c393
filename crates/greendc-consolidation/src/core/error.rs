//! Consolidation errors.

use thiserror::Error;

/// Fatal errors surfaced to the simulation driver.
///
/// Everything else inside a pass degrades silently: a VM or host that cannot
/// be handled is simply absent from the returned migration map.
#[derive(Debug, Error, PartialEq)]
pub enum ConsolidationError {
    /// The resource weights must sum to 1.
    #[error("weight_mips ({w_mips}) and weight_iops ({w_iops}) must sum to 1")]
    InvalidWeights { w_mips: f64, w_iops: f64 },

    /// The pre-pass allocation snapshot could not be reproduced. The snapshot
    /// is a known-good state, so this indicates fleet model corruption.
    #[error("failed to restore vm #{vm_id} on host #{host_id} from the saved allocation")]
    RestoreFailed { vm_id: u32, host_id: u32 },
}
