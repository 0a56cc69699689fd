use crate::error::{Result, WakeError};
use nalgebra::Vector3;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

static GLOBAL_CONTEXT: OnceCell<FlowContext> = OnceCell::new();

/// Compressibility settings shared by every kernel evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowContext {
    mach: f64,
    karman_tsien: bool,
}

impl Default for FlowContext {
    fn default() -> Self {
        FlowContext::incompressible()
    }
}

impl FlowContext {
    pub fn new(mach: f64, karman_tsien: bool) -> Result<Self> {
        if !(0.0..1.0).contains(&mach) {
            return Err(WakeError::InvalidMach(mach));
        }
        Ok(FlowContext { mach, karman_tsien })
    }

    pub const fn incompressible() -> Self {
        FlowContext {
            mach: 0.0,
            karman_tsien: false,
        }
    }

    pub fn mach(&self) -> f64 {
        self.mach
    }

    pub fn karman_tsien(&self) -> bool {
        self.karman_tsien
    }

    /// The process-wide context, or the incompressible default before
    /// [`install`] has run.
    pub fn global() -> FlowContext {
        GLOBAL_CONTEXT.get().copied().unwrap_or_default()
    }

    /// Karman-Tsien scaling of an incompressible induced velocity `q`.
    ///
    /// The incompressible pressure coefficient is linearized from the
    /// streamwise perturbation, `Cp0 = -2 q·V̂∞ / |V∞|`, and fed through the
    /// Karman-Tsien rule. With no free stream `Cp0 = 0` and the factor reduces
    /// to Prandtl-Glauert.
    pub fn correct(&self, q: Vector3<f64>, free_stream: &Vector3<f64>) -> Vector3<f64> {
        if !self.karman_tsien || self.mach <= 0.0 {
            return q;
        }

        let m2 = self.mach * self.mach;
        let beta = (1.0 - m2).sqrt();

        let vinf = free_stream.norm();
        let cp0 = if vinf > 0.0 {
            -2.0 * q.dot(free_stream) / (vinf * vinf)
        } else {
            0.0
        };

        let mut denominator = beta + m2 / (1.0 + beta) * 0.5 * cp0;
        if denominator <= 0.5 * beta {
            denominator = beta;
        }

        q / denominator
    }
}

/// Sets the process-wide context. Call once per solver configuration, before
/// any evaluation reads it.
pub fn install(context: FlowContext) -> Result<()> {
    GLOBAL_CONTEXT
        .set(context)
        .map_err(|_| WakeError::ContextAlreadyInstalled)?;
    log::info!(
        "Flow context installed: Mach {:.3}, Karman-Tsien {}",
        context.mach,
        if context.karman_tsien { "on" } else { "off" }
    );
    Ok(())
}
