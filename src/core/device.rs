//! Compute backend and precision selection.
//!
//! The selector prefers the accelerator; every probing failure degrades to
//! the CPU profile.

use candle_core::{DType, Device, Tensor};
use once_cell::sync::OnceCell;
use std::fmt;
use std::process::Command;

/// Highest CUDA compute capability major version the engine is known to run on.
pub const MAX_SUPPORTED_CAPABILITY: u32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Accelerated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Reduced,
    Full,
}

impl Precision {
    pub fn dtype(&self) -> DType {
        match self {
            Precision::Reduced => DType::F16,
            Precision::Full => DType::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub backend: Backend,
    pub precision: Precision,
    pub ordinal: usize,
}

impl DeviceProfile {
    pub fn fallback() -> Self {
        Self {
            backend: Backend::Fallback,
            precision: Precision::Full,
            ordinal: 0,
        }
    }

    pub fn accelerated(ordinal: usize) -> Self {
        Self {
            backend: Backend::Accelerated,
            precision: Precision::Reduced,
            ordinal,
        }
    }

    pub fn is_accelerated(&self) -> bool {
        self.backend == Backend::Accelerated
    }

    pub fn dtype(&self) -> DType {
        self.precision.dtype()
    }

    pub fn device(&self) -> candle_core::Result<Device> {
        match self.backend {
            Backend::Accelerated => Device::new_cuda(self.ordinal),
            Backend::Fallback => Ok(Device::Cpu),
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend {
            Backend::Accelerated => write!(f, "cuda:{} ({:?})", self.ordinal, self.dtype()),
            Backend::Fallback => write!(f, "cpu ({:?})", self.dtype()),
        }
    }
}

/// Why the accelerated backend was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceProbeError {
    #[error("no accelerator available")]
    Absent,
    #[error("compute capability {found} exceeds supported maximum {max}")]
    UnsupportedCapability { found: u32, max: u32 },
    #[error("could not read compute capability: {0}")]
    Capability(String),
    #[error("smoke allocation failed: {0}")]
    Allocation(String),
}

pub trait AcceleratorProbe {
    fn is_present(&self) -> bool;
    fn capability_major(&self) -> Result<u32, DeviceProbeError>;
    fn smoke_allocate(&self) -> Result<(), DeviceProbeError>;
    fn ordinal(&self) -> usize {
        0
    }
}

/// Probes a CUDA device through candle, reading the capability from `nvidia-smi`.
pub struct CudaProbe {
    ordinal: usize,
}

impl CudaProbe {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }
}

impl Default for CudaProbe {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AcceleratorProbe for CudaProbe {
    fn is_present(&self) -> bool {
        candle_core::utils::cuda_is_available()
    }

    fn capability_major(&self) -> Result<u32, DeviceProbeError> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=compute_cap",
                "--format=csv,noheader",
                &format!("--id={}", self.ordinal),
            ])
            .output()
            .map_err(|e| DeviceProbeError::Capability(e.to_string()))?;

        if !output.status.success() {
            return Err(DeviceProbeError::Capability(format!(
                "nvidia-smi exited with {}",
                output.status
            )));
        }

        parse_capability_major(&String::from_utf8_lossy(&output.stdout))
    }

    fn smoke_allocate(&self) -> Result<(), DeviceProbeError> {
        let device = Device::new_cuda(self.ordinal)
            .map_err(|e| DeviceProbeError::Allocation(e.to_string()))?;
        Tensor::zeros(1, DType::F16, &device)
            .map(|_| ())
            .map_err(|e| DeviceProbeError::Allocation(e.to_string()))
    }

    fn ordinal(&self) -> usize {
        self.ordinal
    }
}

fn parse_capability_major(raw: &str) -> Result<u32, DeviceProbeError> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    line.split('.')
        .next()
        .and_then(|major| major.trim().parse().ok())
        .ok_or_else(|| DeviceProbeError::Capability(format!("unparseable capability {:?}", line)))
}

pub struct DeviceSelector<P> {
    probe: P,
    max_capability: u32,
}

impl<P: AcceleratorProbe> DeviceSelector<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            max_capability: MAX_SUPPORTED_CAPABILITY,
        }
    }

    pub fn max_capability(mut self, max: u32) -> Self {
        self.max_capability = max;
        self
    }

    /// Checks the accelerator end to end without falling back.
    pub fn probe(&self) -> Result<DeviceProfile, DeviceProbeError> {
        if !self.probe.is_present() {
            return Err(DeviceProbeError::Absent);
        }

        let major = self.probe.capability_major()?;
        if major > self.max_capability {
            return Err(DeviceProbeError::UnsupportedCapability {
                found: major,
                max: self.max_capability,
            });
        }

        self.probe.smoke_allocate()?;
        Ok(DeviceProfile::accelerated(self.probe.ordinal()))
    }

    pub fn select(&self) -> DeviceProfile {
        match self.probe() {
            Ok(profile) => profile,
            Err(reason) => {
                tracing::debug!(%reason, "accelerator unavailable, using cpu");
                DeviceProfile::fallback()
            }
        }
    }
}

static PROCESS_PROFILE: OnceCell<DeviceProfile> = OnceCell::new();

/// Selects the process-wide profile on first call; later calls return the same value.
pub fn process_profile(force_fallback: bool, max_capability: u32) -> DeviceProfile {
    *PROCESS_PROFILE.get_or_init(|| {
        let profile = if force_fallback {
            DeviceProfile::fallback()
        } else {
            DeviceSelector::new(CudaProbe::default())
                .max_capability(max_capability)
                .select()
        };
        tracing::info!(device = %profile, "compute device selected");
        profile
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProbe {
        present: bool,
        capability: Result<u32, DeviceProbeError>,
        allocation: Result<(), DeviceProbeError>,
    }

    impl FakeProbe {
        fn healthy(capability: u32) -> Self {
            Self {
                present: true,
                capability: Ok(capability),
                allocation: Ok(()),
            }
        }
    }

    impl AcceleratorProbe for FakeProbe {
        fn is_present(&self) -> bool {
            self.present
        }

        fn capability_major(&self) -> Result<u32, DeviceProbeError> {
            self.capability.clone()
        }

        fn smoke_allocate(&self) -> Result<(), DeviceProbeError> {
            self.allocation.clone()
        }
    }

    #[test]
    fn test_supported_accelerator_uses_reduced_precision() {
        let profile = DeviceSelector::new(FakeProbe::healthy(8)).select();
        assert_eq!(profile, DeviceProfile::accelerated(0));
        assert_eq!(profile.dtype(), DType::F16);
    }

    #[test]
    fn test_capability_above_threshold_falls_back() {
        let selector = DeviceSelector::new(FakeProbe::healthy(12));
        assert_eq!(
            selector.probe(),
            Err(DeviceProbeError::UnsupportedCapability { found: 12, max: 11 })
        );
        let profile = selector.select();
        assert_eq!(profile, DeviceProfile::fallback());
        assert_eq!(profile.dtype(), DType::F32);
    }

    #[test]
    fn test_capability_at_threshold_is_accepted() {
        let profile = DeviceSelector::new(FakeProbe::healthy(11)).select();
        assert!(profile.is_accelerated());

        let profile = DeviceSelector::new(FakeProbe::healthy(9))
            .max_capability(8)
            .select();
        assert!(!profile.is_accelerated());
    }

    #[test]
    fn test_absent_accelerator_falls_back() {
        let probe = FakeProbe {
            present: false,
            ..FakeProbe::healthy(8)
        };
        let selector = DeviceSelector::new(probe);
        assert_eq!(selector.probe(), Err(DeviceProbeError::Absent));
        assert_eq!(selector.select(), DeviceProfile::fallback());
    }

    #[test]
    fn test_probe_failures_fall_back() {
        let unreadable = FakeProbe {
            capability: Err(DeviceProbeError::Capability("driver".into())),
            ..FakeProbe::healthy(8)
        };
        assert_eq!(DeviceSelector::new(unreadable).select(), DeviceProfile::fallback());

        let allocation = FakeProbe {
            allocation: Err(DeviceProbeError::Allocation("oom".into())),
            ..FakeProbe::healthy(8)
        };
        assert_eq!(DeviceSelector::new(allocation).select(), DeviceProfile::fallback());
    }

    #[test]
    fn test_parse_capability_major() {
        assert_eq!(parse_capability_major("8.6\n"), Ok(8));
        assert_eq!(parse_capability_major("\n12.0\n9.0\n"), Ok(12));
        assert!(parse_capability_major("N/A").is_err());
        assert!(parse_capability_major("").is_err());
    }

    #[test]
    fn test_fallback_device_is_cpu() {
        let device = DeviceProfile::fallback().device().unwrap();
        assert!(matches!(device, Device::Cpu));
        assert_eq!(DeviceProfile::fallback().to_string(), "cpu (F32)");
    }

    #[test]
    fn test_process_profile_is_selected_once() {
        let first = process_profile(true, MAX_SUPPORTED_CAPABILITY);
        let second = process_profile(false, 0);
        assert_eq!(first, second);
        assert_eq!(process_profile(true, 99), first);
    }
}
