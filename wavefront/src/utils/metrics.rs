#[cfg(feature = "metrics")]
mod imp {
    use std::time::{Duration, Instant};

    use fxhash::FxHashMap;

    use crate::gpu::DeviceKernel;

    /// Wall time spent per integrator kernel, including the synchronization
    /// that follows its launch.
    #[derive(Debug, Default)]
    pub struct KernelMetrics {
        timings: FxHashMap<DeviceKernel, (Duration, u32)>,
    }

    #[derive(Debug)]
    pub struct KernelTimer(Instant);

    impl KernelMetrics {
        pub fn start(&self) -> KernelTimer {
            KernelTimer(Instant::now())
        }

        pub fn record(&mut self, kernel: DeviceKernel, timer: KernelTimer) {
            let (total, count) = self.timings.entry(kernel).or_default();

            *total += timer.0.elapsed();
            *count += 1;
        }

        pub fn report(&mut self) {
            let mut timings: Vec<_> = self.timings.drain().collect();

            timings.sort_by(|(_, (a, _)), (_, (b, _))| b.cmp(a));

            for (kernel, (total, count)) in timings {
                log::debug!(
                    "Kernel `{kernel}`: tt={}, launches={count}",
                    humantime::format_duration(total),
                );
            }
        }
    }
}

#[cfg(not(feature = "metrics"))]
mod imp {
    use crate::gpu::DeviceKernel;

    #[derive(Debug, Default)]
    pub struct KernelMetrics;

    #[derive(Debug)]
    pub struct KernelTimer;

    impl KernelMetrics {
        pub fn start(&self) -> KernelTimer {
            KernelTimer
        }

        pub fn record(&mut self, _: DeviceKernel, _: KernelTimer) {
            //
        }

        pub fn report(&mut self) {
            //
        }
    }
}

pub use self::imp::*;
