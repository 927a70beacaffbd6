use glam::Vec3;

use crate::gpu::{
    hash_uint2, DeviceKernel, KernelFeatures, MainPathIndex, PathFlags,
    PathIndex, ShadowPathIndex, VolumeStackEntry, WorkTile,
    PATH_BOUNCE, PATH_DIFFUSE_BOUNCE, PATH_FLAG, PATH_GLOSSY_BOUNCE,
    PATH_MIS_RAY_PDF, PATH_RENDER_PIXEL_INDEX, PATH_RNG_HASH,
    PATH_RNG_OFFSET, PATH_SAMPLE, PATH_THROUGHPUT,
    PATH_TRANSMISSION_BOUNCE, PATH_TRANSPARENT_BOUNCE, PATH_VOLUME_BOUNCE,
    VOLUME_STACK,
};
use crate::{
    Dispatch, HostMemory, IntegratorState, KernelArgs, KernelContext,
    KernelFault,
};

/// Pixel and sample a fresh camera path is traced for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelSample {
    pub x: u32,
    pub y: u32,
    pub sample: u32,
    pub render_pixel_index: u32,
}

/// Integrator kernels of the host device.
///
/// The device handles everything around them (picking which states to run,
/// early-exiting states queued for some other kernel, bookkeeping kernels);
/// implementations only advance a single state at a time, moving it along
/// through [`KernelContext`]'s state transitions.
pub trait IntegratorKernels {
    /// Fills ray of a freshly initialized camera (or bake) path; returning
    /// `false` discards the path.
    ///
    /// Path-level fields (pixel, sample, bounces, flags, RNG) are already
    /// filled when this gets called, and the path gets queued for
    /// [`DeviceKernel::IntegratorIntersectClosest`] afterwards.
    fn init_path(
        &mut self,
        _kernel: DeviceKernel,
        _ctx: &mut KernelContext<'_>,
        _path: MainPathIndex,
        _pixel: &PixelSample,
    ) -> Result<bool, KernelFault> {
        Ok(true)
    }

    fn run(
        &mut self,
        kernel: DeviceKernel,
        ctx: &mut KernelContext<'_>,
        path: PathIndex,
    ) -> Result<(), KernelFault>;
}

/// Device without integrator kernels; useful for exercising bookkeeping
/// alone.
impl IntegratorKernels for () {
    fn run(
        &mut self,
        kernel: DeviceKernel,
        _: &mut KernelContext<'_>,
        _: PathIndex,
    ) -> Result<(), KernelFault> {
        Err(KernelFault::new(format!("`{kernel}` is not implemented")))
    }
}

pub(super) fn init_paths(
    kernels: &mut impl IntegratorKernels,
    ctx: &mut KernelContext<'_>,
    kernel: DeviceKernel,
    work_size: u32,
    args: &KernelArgs,
    trace: Option<&mut Vec<Dispatch>>,
) -> Result<(), KernelFault> {
    let num_tiles = args.get_count(1)? as usize;
    let max_tile_work_size = args.get_count(3)?;

    let tiles = ctx
        .memory()
        .slice::<WorkTile>(args.get_buffer(0)?)?
        .get(..num_tiles)
        .ok_or_else(|| KernelFault::new("not enough work tiles"))?
        .to_vec();

    if max_tile_work_size == 0 {
        return Ok(());
    }

    let mut states = Vec::new();

    for work_index in 0..work_size {
        let tile_index = work_index / max_tile_work_size;
        let tile_work_index = work_index - tile_index * max_tile_work_size;

        let Some(tile) = tiles.get(tile_index as usize) else {
            continue;
        };

        if tile_work_index >= tile.work_size {
            continue;
        }

        let path =
            MainPathIndex::new(tile.path_index_offset + tile_work_index);
        let (x, y, sample) = tile.pixel(tile_work_index);

        let pixel = PixelSample {
            x,
            y,
            sample,
            render_pixel_index: tile.render_pixel_index(x, y),
        };

        init_path_state(ctx, path, tile, &pixel)?;

        if kernels.init_path(kernel, ctx, path, &pixel)? {
            ctx.path_init(path, DeviceKernel::IntegratorIntersectClosest)?;
        }

        states.push(path.into());
    }

    if let Some(trace) = trace {
        trace.push(Dispatch { kernel, states });
    }

    Ok(())
}

fn init_path_state(
    ctx: &mut KernelContext<'_>,
    path: MainPathIndex,
    tile: &WorkTile,
    pixel: &PixelSample,
) -> Result<(), KernelFault> {
    let features = ctx.state().features;
    let seed = ctx.state().seed;

    let mut flags = PathFlags::CAMERA;

    if features.contains(KernelFeatures::SHADOW_CATCHER) {
        flags |= PathFlags::TRANSPARENT_BACKGROUND;
    }

    ctx.write(PATH_RENDER_PIXEL_INDEX, path, pixel.render_pixel_index)?;
    ctx.write(PATH_SAMPLE, path, pixel.sample)?;
    ctx.write(PATH_BOUNCE, path, 0)?;
    ctx.write(PATH_DIFFUSE_BOUNCE, path, 0)?;
    ctx.write(PATH_GLOSSY_BOUNCE, path, 0)?;
    ctx.write(PATH_TRANSMISSION_BOUNCE, path, 0)?;
    ctx.write(PATH_TRANSPARENT_BOUNCE, path, 0)?;
    ctx.write(PATH_FLAG, path, flags.bits())?;
    ctx.write(
        PATH_RNG_HASH,
        path,
        hash_uint2(pixel.render_pixel_index, seed),
    )?;
    ctx.write(PATH_RNG_OFFSET, path, tile.sample_offset)?;
    ctx.write(PATH_THROUGHPUT, path, Vec3::ONE)?;
    ctx.write(PATH_MIS_RAY_PDF, path, 0.0)?;

    if features.contains(KernelFeatures::VOLUME) {
        ctx.write(PATH_VOLUME_BOUNCE, path, 0)?;

        if ctx.state().layout.slots(VOLUME_STACK.id()) > 0 {
            ctx.write(VOLUME_STACK, path, VolumeStackEntry::NONE)?;
        }
    }

    Ok(())
}

pub(super) fn run_kernel(
    kernels: &mut impl IntegratorKernels,
    memory: &mut HostMemory,
    state: &IntegratorState,
    kernel: DeviceKernel,
    work_size: u32,
    args: &KernelArgs,
    trace: Option<&mut Vec<Dispatch>>,
) -> Result<(), KernelFault> {
    let path_index = args.get_opt_buffer(0)?;

    let render_buffer = if kernel.is_shading() {
        args.get_opt_buffer(1)?
    } else {
        None
    };

    let mut ctx = KernelContext::new(memory, state, render_buffer);
    let mut states = Vec::with_capacity(work_size as usize);

    // States handed over to this very kernel while it runs wait for the next
    // launch
    for work_index in 0..work_size {
        let index = match path_index {
            Some(path_index) => {
                ctx.memory().read_at::<u32>(path_index, work_index)?
            }
            None => work_index,
        };

        let path = if kernel.is_shadow_path() {
            PathIndex::from(ShadowPathIndex::new(index))
        } else {
            PathIndex::from(MainPathIndex::new(index))
        };

        if ctx.queued_raw(path)? == kernel as u32 {
            states.push(path);
        }
    }

    for &path in &states {
        kernels.run(kernel, &mut ctx, path)?;
    }

    if let Some(trace) = trace {
        trace.push(Dispatch { kernel, states });
    }

    Ok(())
}
