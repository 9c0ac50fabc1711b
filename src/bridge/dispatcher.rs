// SPDX-License-Identifier: GPL-3.0-only

//! Synchronous invocation of the host frame handler

use std::sync::Arc;

use tracing::{error, trace};

use crate::backends::host::{FrameDelivery, HostRuntime, RuntimeHandle};

/// How one handler invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// The call failed or the handler raised; the failure has been cleared
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

/// Calls the host frame handler and absorbs its failures
///
/// A failing handler never reaches the driver: the failure is logged,
/// cleared on the runtime and reported as [`DispatchOutcome::Failed`].
pub struct Dispatcher {
    runtime: Arc<dyn HostRuntime>,
}

impl Dispatcher {
    pub fn new(runtime: Arc<dyn HostRuntime>) -> Self {
        Self { runtime }
    }

    /// Invoke the handler and block until it returns
    ///
    /// There is no timeout. `handle` must belong to the calling thread.
    pub fn invoke(&self, handle: RuntimeHandle, delivery: &FrameDelivery<'_>) -> DispatchOutcome {
        let call = self.runtime.invoke_frame_handler(handle, delivery);

        // Checked even when the call errored so nothing stays pending on the
        // thread for the next frame.
        if let Some(failure) = self.runtime.take_pending_failure(handle) {
            error!(
                sequence = delivery.sequence,
                points = delivery.point_count,
                %failure,
                "Frame handler raised, failure cleared"
            );
            return DispatchOutcome::Failed(failure);
        }

        match call {
            Ok(()) => {
                trace!(
                    sequence = delivery.sequence,
                    points = delivery.point_count,
                    "Frame delivered"
                );
                DispatchOutcome::Delivered
            }
            Err(e) => {
                error!(sequence = delivery.sequence, error = %e, "Frame handler call failed");
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}
