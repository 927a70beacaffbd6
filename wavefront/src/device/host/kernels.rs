//! Scheduler-side kernels of the host device: index arrays, compaction,
//! sorting and the like.

use crate::gpu::{
    DeviceKernel, MainPathIndex, PathIndex, ShadowPathIndex,
    PATH_SHADER_SORT_KEY,
};
use crate::{KernelArgs, KernelContext, KernelFault};

pub(super) fn run_kernel(
    ctx: &mut KernelContext<'_>,
    kernel: DeviceKernel,
    work_size: u32,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    use DeviceKernel::*;

    match kernel {
        IntegratorReset => reset(ctx, args),

        IntegratorQueuedPathsArray => queued_paths_array(ctx, args, false),
        IntegratorQueuedShadowPathsArray => queued_paths_array(ctx, args, true),

        IntegratorTerminatedPathsArray => {
            terminated_paths_array(ctx, args, false)
        }
        IntegratorTerminatedShadowPathsArray => {
            terminated_paths_array(ctx, args, true)
        }

        IntegratorCompactPathsArray => compact_paths_array(ctx, args, false),
        IntegratorCompactShadowPathsArray => {
            compact_paths_array(ctx, args, true)
        }

        IntegratorCompactStates => compact_states(ctx, args, false),
        IntegratorCompactShadowStates => compact_states(ctx, args, true),

        IntegratorSortedPathsArray => sorted_paths_array(ctx, args),
        PrefixSum => prefix_sum(ctx, args),

        IntegratorShadowCatcherCountPossibleSplits => {
            count_possible_splits(ctx, args)
        }

        kernel => Err(KernelFault::new(format!(
            "`{kernel}` can't be launched with work size {work_size} here"
        ))),
    }
}

fn path(index: u32, shadow: bool) -> PathIndex {
    if shadow {
        ShadowPathIndex::new(index).into()
    } else {
        MainPathIndex::new(index).into()
    }
}

fn num_states(
    ctx: &KernelContext<'_>,
    args: &KernelArgs,
) -> Result<u32, KernelFault> {
    let num_states = args.get_count(0)?;

    if num_states > ctx.capacity() {
        return Err(KernelFault::new(format!(
            "{num_states} states requested, but capacity is {}",
            ctx.capacity()
        )));
    }

    Ok(num_states)
}

fn reset(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    for index in 0..num_states(ctx, args)? {
        ctx.clear_queued(path(index, false))?;
        ctx.clear_queued(path(index, true))?;
    }

    Ok(())
}

/// Appends states matching `filter` to an index array, bumping its length
/// counter for each one.
fn collect_indices(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
    shadow: bool,
    offset: u32,
    filter: impl Fn(u32, u32) -> bool,
) -> Result<(), KernelFault> {
    let indices = args.get_buffer(1)?;
    let num_indices = args.get_buffer(2)?;

    for index in 0..num_states(ctx, args)? {
        let queued = ctx.queued_raw(path(index, shadow))?;

        if !filter(index, queued) {
            continue;
        }

        let memory = ctx.memory_mut();
        let len: u32 = memory.read_at(num_indices, 0)?;

        memory.write_at(indices, offset + len, index)?;
        memory.write_at(num_indices, 0, len + 1)?;
    }

    Ok(())
}

fn queued_paths_array(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
    shadow: bool,
) -> Result<(), KernelFault> {
    let kernel = args.get_count(3)?;

    collect_indices(ctx, args, shadow, 0, |_, queued| queued == kernel)
}

fn terminated_paths_array(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
    shadow: bool,
) -> Result<(), KernelFault> {
    let offset = args.get_count(3)?;

    collect_indices(ctx, args, shadow, offset, |_, queued| queued == 0)
}

fn compact_paths_array(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
    shadow: bool,
) -> Result<(), KernelFault> {
    let num_active = args.get_count(3)?;

    collect_indices(ctx, args, shadow, 0, |index, queued| {
        index >= num_active && queued != 0
    })
}

/// Moves states listed at `[active_offset, active_offset + n)` into the
/// slots listed at `[terminated_offset, terminated_offset + n)`.
fn compact_states(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
    shadow: bool,
) -> Result<(), KernelFault> {
    let indices = args.get_buffer(0)?;
    let active_offset = args.get_count(1)?;
    let terminated_offset = args.get_count(2)?;
    let work_size = args.get_count(3)?;

    for idx in 0..work_size {
        let from: u32 = ctx.memory().read_at(indices, active_offset + idx)?;
        let to: u32 = ctx.memory().read_at(indices, terminated_offset + idx)?;

        if ctx.queued_raw(path(to, shadow))? != 0 {
            return Err(KernelFault::new(format!(
                "compaction target {:?} is still alive",
                path(to, shadow)
            )));
        }

        ctx.copy_state(from, to, |group| group.is_shadow() == shadow)?;
        ctx.clear_queued(path(from, shadow))?;
    }

    Ok(())
}

fn sorted_paths_array(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    let num_states = num_states(ctx, args)?;
    let limit = args.get_count(1)?;
    let indices = args.get_buffer(2)?;
    let key_counter = args.get_buffer(4)?;
    let prefix_sum = args.get_buffer(5)?;
    let kernel = args.get_count(6)?;

    for index in 0..num_states {
        let path = MainPathIndex::new(index);

        if ctx.queued_raw(path.into())? != kernel {
            continue;
        }

        let key = ctx.read(PATH_SHADER_SORT_KEY, path)?;
        let memory = ctx.memory_mut();
        let slot: u32 = memory.read_at(prefix_sum, key)?;

        memory.write_at(prefix_sum, key, slot + 1)?;

        if slot < limit {
            memory.write_at(indices, slot, index)?;
        } else {
            // Doesn't fit into this launch; count it again, so that the next
            // sort picks it up
            let count: u32 = memory.read_at(key_counter, key)?;

            memory.write_at(key_counter, key, count + 1)?;
        }
    }

    Ok(())
}

/// Exclusive prefix sum of `counter`, zeroing the counter along the way.
fn prefix_sum(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    let counter = args.get_buffer(0)?;
    let prefix_sum = args.get_buffer(1)?;
    let num_values = args.get_count(2)?;
    let memory = ctx.memory_mut();
    let mut offset = 0;

    for idx in 0..num_values {
        let count: u32 = memory.read_at(counter, idx)?;

        memory.write_at(prefix_sum, idx, offset)?;
        memory.write_at(counter, idx, 0u32)?;

        offset += count;
    }

    Ok(())
}

fn count_possible_splits(
    ctx: &mut KernelContext<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    let num_states = num_states(ctx, args)?;
    let num_possible_splits = args.get_buffer(1)?;
    let mut count = 0u32;

    for index in 0..num_states {
        let path = MainPathIndex::new(index);

        if ctx.queued_raw(path.into())? != 0
            && ctx.path_flags(path)?.can_split()
        {
            count += 1;
        }
    }

    ctx.memory_mut().write_at(num_possible_splits, 0, count)
}
