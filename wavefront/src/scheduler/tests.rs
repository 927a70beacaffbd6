use std::collections::{HashSet, VecDeque};

use approx::assert_relative_eq;

use crate::gpu::{
    DeviceKernel, KernelFeatures, MainPathIndex, QueueCounter,
    ShadowPathIndex, WorkTile, PATH_RENDER_PIXEL_INDEX, SHADOW_PATH_SAMPLE,
};
use crate::testing::{film, scheduler, MockRenderer, MockScheduler};
use crate::{
    Admission, BufferParams, Error, HostQueue, IntegratorKernels, SceneInfo,
    SchedulerConfig, StateLayoutKind, WorkTileScheduler,
};

fn tile(w: u32, h: u32, num_samples: u32) -> WorkTile {
    WorkTile {
        w,
        h,
        num_samples,
        stride: w as i32,
        ..Default::default()
    }
}

fn bare(capacity: u32) -> MockScheduler<()> {
    let queue = HostQueue::builder(()).with_capacity(capacity).build();

    scheduler(
        queue,
        SceneInfo::new(KernelFeatures::empty()),
        16,
        16,
        Default::default(),
    )
}

fn mock(
    renderer: MockRenderer,
    capacity: u32,
    scene: SceneInfo,
    width: u32,
    height: u32,
) -> MockScheduler<MockRenderer> {
    let queue = HostQueue::builder(renderer).with_capacity(capacity).build();

    scheduler(queue, scene, width, height, Default::default())
}

fn set_counter<K>(
    target: &mut MockScheduler<K>,
    kernel: DeviceKernel,
    value: i32,
) where
    K: IntegratorKernels,
{
    target
        .queue_mut()
        .with_context(|ctx| {
            let buffer = ctx.state().queue_counter;

            ctx.memory_mut()
                .write(buffer, QueueCounter::offset_of(kernel), value)
        })
        .unwrap();
}

fn assert_film<K>(target: &MockScheduler<K>, num_samples: u32)
where
    K: IntegratorKernels,
{
    for value in film(target) {
        assert_relative_eq!(num_samples as f32, value);
    }
}

#[test]
fn admission_of_a_single_tile() {
    let mut target = bare(8);

    target.reset().unwrap();

    let mut tiles = VecDeque::from([tile(2, 2, 1)]);
    let actual = target.enqueue_work_tiles(&mut tiles).unwrap();

    assert_eq!(
        Admission {
            admitted: true,
            finished: false,
        },
        actual
    );

    let counter = *target.sync_counters().unwrap();

    assert_eq!(4, counter.get(DeviceKernel::IntegratorIntersectClosest));
    assert_eq!(4, counter.num_main_paths());
    assert_eq!(4, target.max_active_main_path_index());
    assert!(tiles.is_empty());
}

#[test]
fn admission_of_a_multi_sample_tile() {
    let mut target = bare(8);

    target.reset().unwrap();

    let mut tiles = VecDeque::from([tile(2, 2, 2)]);

    assert!(target.enqueue_work_tiles(&mut tiles).unwrap().admitted);

    let counter = *target.sync_counters().unwrap();

    assert_eq!(8, counter.get(DeviceKernel::IntegratorIntersectClosest));
    assert_eq!(8, target.max_active_main_path_index());
}

#[test]
fn admission_without_shadow_catcher() {
    let mut target = bare(100);
    let mut tiles: VecDeque<_> = (0..30).map(|_| tile(5, 5, 1)).collect();

    target.reset().unwrap();

    assert!(target.enqueue_work_tiles(&mut tiles).unwrap().admitted);

    let counter = *target.sync_counters().unwrap();

    assert_eq!(0, target.num_predicted_splits());
    assert_eq!(100, counter.get(DeviceKernel::IntegratorIntersectClosest));
    assert_eq!(100, target.max_active_main_path_index());
    assert_eq!(26, tiles.len());

    // pool is busy enough
    assert_eq!(
        Admission::default(),
        target.enqueue_work_tiles(&mut tiles).unwrap()
    );

    assert_eq!(26, tiles.len());
}

#[test]
fn admission_waits_for_intersect_closest() {
    let mut target = bare(100);
    let mut tiles = VecDeque::from([tile(2, 2, 1)]);

    target.reset().unwrap();

    set_counter(&mut target, DeviceKernel::IntegratorShadeSurface, 1);
    target.sync_counters().unwrap();

    assert_eq!(
        Admission::default(),
        target.enqueue_work_tiles(&mut tiles).unwrap()
    );

    assert_eq!(1, tiles.len());
}

#[test]
fn admission_finishes_once_tiles_run_out() {
    let mut target = bare(8);
    let mut tiles = VecDeque::new();

    target.reset().unwrap();

    assert_eq!(
        Admission {
            admitted: false,
            finished: true,
        },
        target.enqueue_work_tiles(&mut tiles).unwrap()
    );
}

#[test]
fn tile_larger_than_the_pool_is_an_error() {
    let mut target = bare(8);
    let mut tiles = VecDeque::from([tile(4, 4, 1)]);

    let result = target.render_tiles(&mut tiles);

    assert!(
        matches!(result, Err(Error::WorkTileTooLarge { max_num_paths: 8 })),
        "unexpected result: {result:?}"
    );

    assert_eq!(1, tiles.len());
}

#[test]
fn tile_larger_than_the_free_states_waits() {
    let queue = HostQueue::builder(())
        .with_capacity(8)
        .with_busy_states(8)
        .build();

    let mut target = scheduler(
        queue,
        SceneInfo::new(KernelFeatures::empty()),
        16,
        16,
        Default::default(),
    );

    let mut tiles = VecDeque::from([tile(2, 1, 1), tile(4, 2, 1)]);

    target.reset().unwrap();

    assert!(target.enqueue_work_tiles(&mut tiles).unwrap().admitted);
    assert_eq!(1, tiles.len());

    target.sync_counters().unwrap();

    assert_eq!(4, target.min_num_active_main_paths());

    // 2 paths in flight, 6 states free, but the tile needs 8
    assert_eq!(
        Admission::default(),
        target.enqueue_work_tiles(&mut tiles).unwrap()
    );

    assert_eq!(1, tiles.len());
}

#[test]
fn admission_reserves_room_for_splits() {
    let queue = HostQueue::builder(()).with_capacity(100).build();

    let mut target = scheduler(
        queue,
        SceneInfo::new(KernelFeatures::SHADOW_CATCHER),
        16,
        16,
        Default::default(),
    );

    let mut tiles: VecDeque<_> = (0..30).map(|_| tile(10, 1, 1)).collect();

    target.reset().unwrap();

    assert!(target.enqueue_work_tiles(&mut tiles).unwrap().admitted);

    let counter = *target.sync_counters().unwrap();

    assert_eq!(50, counter.get(DeviceKernel::IntegratorIntersectClosest));
    assert_eq!(50, target.num_predicted_splits());
    assert_eq!(100, target.max_active_main_path_index());
    assert_eq!(50, target.count_possible_splits().unwrap());

    let next_main_path_index = target
        .queue_mut()
        .with_context(|ctx| {
            let buffer = ctx.state().next_main_path_index;

            ctx.memory().read_at::<u32>(buffer, 0)
        })
        .unwrap();

    assert_eq!(50, next_main_path_index);
}

#[test]
fn shadow_paths_are_drained_first() {
    let mut target = mock(
        MockRenderer::new(0),
        16,
        SceneInfo::new(KernelFeatures::empty()),
        4,
        4,
    );

    target.reset().unwrap();

    target
        .queue_mut()
        .with_context(|ctx| {
            for index in 0..10 {
                ctx.path_init_sorted(
                    MainPathIndex::new(index),
                    DeviceKernel::IntegratorShadeSurface,
                    0,
                )?;
            }

            for index in 0..10 {
                let path = ctx
                    .shadow_path_init(DeviceKernel::IntegratorIntersectShadow)?;

                if index >= 3 {
                    ctx.shadow_path_terminate(
                        path,
                        DeviceKernel::IntegratorIntersectShadow,
                    )?;
                }
            }

            Ok(())
        })
        .unwrap();

    target.sync_counters().unwrap();

    // 10 states queued for shading, but only 6 free shadow states
    assert_eq!(10, target.next_shadow_path_index());

    assert_eq!(
        Some(DeviceKernel::IntegratorIntersectShadow),
        target.enqueue_path_iteration().unwrap()
    );

    target.sync_counters().unwrap();

    assert_eq!(
        Some(DeviceKernel::IntegratorShadeShadow),
        target.enqueue_path_iteration().unwrap()
    );

    let counter = *target.sync_counters().unwrap();

    assert_eq!(0, counter.num_shadow_paths());
    assert_eq!(3, target.queue().kernels().num_shadow_hits);
}

fn compaction(layout: StateLayoutKind) {
    let queue = HostQueue::builder(()).with_capacity(100).build();

    let mut target = scheduler(
        queue,
        SceneInfo::new(KernelFeatures::empty()),
        10,
        10,
        SchedulerConfig::default().with_layout(layout),
    );

    let mut tiles = VecDeque::from([tile(10, 10, 1)]);

    target.reset().unwrap();
    target.enqueue_work_tiles(&mut tiles).unwrap();

    assert_eq!(100, target.max_active_main_path_index());

    let expected: HashSet<u32> = target
        .queue_mut()
        .with_context(|ctx| {
            let mut pixels = HashSet::new();

            for index in 0..100 {
                let path = MainPathIndex::new(index);

                if index % 2 == 0 {
                    ctx.path_terminate(
                        path,
                        DeviceKernel::IntegratorIntersectClosest,
                    )?;
                } else {
                    pixels.insert(ctx.read(PATH_RENDER_PIXEL_INDEX, path)?);
                }
            }

            Ok(pixels)
        })
        .unwrap();

    assert_eq!(50, target.sync_counters().unwrap().num_main_paths());

    let live_states = |target: &mut MockScheduler<()>| {
        target
            .queue_mut()
            .with_context(|ctx| {
                let mut pixels = Vec::new();

                for index in 0..100 {
                    let path = MainPathIndex::new(index);

                    if ctx.queued_kernel(path.into())?.is_some() {
                        assert!(index < 50, "state #{index} is still alive");

                        pixels.push(ctx.read(PATH_RENDER_PIXEL_INDEX, path)?);
                    }
                }

                Ok(pixels)
            })
            .unwrap()
    };

    target.compact_states(50).unwrap();

    assert_eq!(50, target.max_active_main_path_index());

    let actual = live_states(&mut target);

    assert_eq!(50, actual.len());
    assert_eq!(expected, actual.iter().copied().collect());

    // compacting again changes nothing
    target.compact_states(50).unwrap();

    assert_eq!(50, target.max_active_main_path_index());
    assert_eq!(actual, live_states(&mut target));
    assert_eq!(50, target.sync_counters().unwrap().num_main_paths());
}

#[test]
fn compaction_soa() {
    compaction(StateLayoutKind::Soa);
}

#[test]
fn compaction_aos() {
    compaction(StateLayoutKind::Aos);
}

#[test]
fn compaction_of_empty_pool() {
    let mut target = bare(8);
    let mut tiles = VecDeque::from([tile(2, 2, 1)]);

    target.reset().unwrap();
    target.enqueue_work_tiles(&mut tiles).unwrap();

    assert_eq!(4, target.max_active_main_path_index());

    target.compact_states(0).unwrap();

    assert_eq!(0, target.max_active_main_path_index());
}

#[test]
fn shadow_index_is_reclaimed() {
    let mut target = mock(
        MockRenderer::new(0),
        64,
        SceneInfo::new(KernelFeatures::empty()),
        4,
        4,
    );

    target.reset().unwrap();

    target
        .queue_mut()
        .with_context(|ctx| {
            for index in 0..40 {
                let path = ctx
                    .shadow_path_init(DeviceKernel::IntegratorIntersectShadow)?;

                ctx.write(SHADOW_PATH_SAMPLE, path, index)?;

                if index % 4 != 0 {
                    ctx.shadow_path_terminate(
                        path,
                        DeviceKernel::IntegratorIntersectShadow,
                    )?;
                }
            }

            Ok(())
        })
        .unwrap();

    target.sync_counters().unwrap();

    assert_eq!(40, target.next_shadow_path_index());

    target.compact_shadow_paths().unwrap();

    assert_eq!(10, target.next_shadow_path_index());

    let (samples, next_shadow_path_index) = target
        .queue_mut()
        .with_context(|ctx| {
            let mut samples = HashSet::new();

            for index in 0..40 {
                let path = ShadowPathIndex::new(index);

                if ctx.queued_kernel(path.into())?.is_some() {
                    assert!(index < 10, "state #{index} is still alive");

                    samples.insert(ctx.read(SHADOW_PATH_SAMPLE, path)?);
                }
            }

            let buffer = ctx.state().next_shadow_path_index;

            Ok((samples, ctx.memory().read_at::<u32>(buffer, 0)?))
        })
        .unwrap();

    assert_eq!((0..40).step_by(4).collect::<HashSet<u32>>(), samples);
    assert_eq!(10, next_shadow_path_index);

    // once no shadow path is alive, the index starts over
    target
        .queue_mut()
        .with_context(|ctx| {
            for index in 0..10 {
                ctx.shadow_path_terminate(
                    ShadowPathIndex::new(index),
                    DeviceKernel::IntegratorIntersectShadow,
                )?;
            }

            Ok(())
        })
        .unwrap();

    target.sync_counters().unwrap();
    target.compact_shadow_paths().unwrap();

    assert_eq!(0, target.next_shadow_path_index());
    assert!(target.sync_counters().unwrap().is_empty());
}

#[test]
fn shadow_compaction_waits_for_enough_terminated_paths() {
    let mut target = mock(
        MockRenderer::new(0),
        64,
        SceneInfo::new(KernelFeatures::empty()),
        4,
        4,
    );

    target.reset().unwrap();

    target
        .queue_mut()
        .with_context(|ctx| {
            for index in 0..40 {
                let path = ctx
                    .shadow_path_init(DeviceKernel::IntegratorIntersectShadow)?;

                if index % 2 == 0 {
                    ctx.shadow_path_terminate(
                        path,
                        DeviceKernel::IntegratorIntersectShadow,
                    )?;
                }
            }

            Ok(())
        })
        .unwrap();

    target.sync_counters().unwrap();

    // 21 alive out of 40 is above the ratio
    target
        .queue_mut()
        .with_context(|ctx| {
            ctx.shadow_path_init(DeviceKernel::IntegratorIntersectShadow)
                .map(drop)
        })
        .unwrap();

    target.sync_counters().unwrap();
    target.compact_shadow_paths().unwrap();

    assert_eq!(41, target.next_shadow_path_index());
}

#[test]
fn every_pixel_gets_every_sample() {
    let mut target = mock(
        MockRenderer::new(1),
        64,
        SceneInfo::new(KernelFeatures::empty()).with_max_shaders(4),
        13,
        7,
    );

    let stats = target.render_samples(0, 5, 0).unwrap();

    assert_film(&target, 5);
    assert!(target.queue_counter().is_empty());
    assert!(stats.iterations > 0);
    assert!(stats.occupancy > 0.0 && stats.occupancy <= 1.0);
    assert!(stats.launches(DeviceKernel::IntegratorIntersectClosest) > 0);
    assert!(stats.launches(DeviceKernel::IntegratorShadeSurface) > 0);
    assert!(target.queue().kernels().num_shadow_hits > 0);

    // next batch of samples accumulates on top
    target.render_samples(5, 2, 0).unwrap();

    assert_film(&target, 7);
}

#[test]
fn every_pixel_gets_every_sample_with_volumes_and_aos() {
    let renderer = MockRenderer::new(2)
        .with_volume_probability(0.3)
        .with_max_bounces(5);

    let queue = HostQueue::builder(renderer)
        .with_capacity(48)
        .with_layout(StateLayoutKind::Aos)
        .build();

    let scene = SceneInfo::new(KernelFeatures::VOLUME)
        .with_volume_stack_size(4)
        .with_max_shaders(2);

    let mut target = scheduler(queue, scene, 9, 9, Default::default());

    assert_eq!(
        StateLayoutKind::Aos,
        target.path_states().layout().kind()
    );

    let stats = target.render_samples(0, 3, 0).unwrap();

    assert_film(&target, 3);
    assert!(stats.launches(DeviceKernel::IntegratorShadeVolume) > 0);
}

#[test]
fn every_pixel_gets_every_sample_without_sorting() {
    let queue = HostQueue::builder(MockRenderer::new(3))
        .with_capacity(32)
        .build();

    let mut target = scheduler(
        queue,
        SceneInfo::new(KernelFeatures::empty()).with_max_shaders(3),
        8,
        8,
        SchedulerConfig::default().with_shader_sorting(false),
    );

    target.render_samples(0, 2, 0).unwrap();

    assert_film(&target, 2);
}

#[test]
fn every_pixel_gets_every_sample_with_sort_partitions() {
    let queue = HostQueue::builder(MockRenderer::new(4))
        .with_capacity(32)
        .with_sort_partition_elements(8)
        .build();

    let mut target = scheduler(
        queue,
        SceneInfo::new(KernelFeatures::empty()).with_max_shaders(3),
        8,
        8,
        Default::default(),
    );

    target.render_samples(0, 2, 0).unwrap();

    assert_film(&target, 2);
}

#[test]
fn ambient_occlusion_creates_two_shadow_paths() {
    let renderer = MockRenderer::new(5).with_background_probability(0.0);

    let mut target = mock(
        renderer,
        32,
        SceneInfo::new(KernelFeatures::AO).with_max_shaders(2),
        8,
        8,
    );

    let stats = target.render_samples(0, 3, 0).unwrap();

    assert_film(&target, 3);
    assert!(target.queue_counter().is_empty());

    let num_shadow_hits = target.queue().kernels().num_shadow_hits;

    assert!(num_shadow_hits > 0);
    assert_eq!(0, num_shadow_hits % 2);
    assert!(stats.launches(DeviceKernel::IntegratorShadeShadow) > 0);
}

#[test]
fn launches_never_share_states() {
    let queue = HostQueue::builder(MockRenderer::new(6).with_max_bounces(4))
        .with_capacity(32)
        .with_trace()
        .build();

    let mut target = scheduler(
        queue,
        SceneInfo::new(KernelFeatures::AO).with_max_shaders(3),
        8,
        8,
        Default::default(),
    );

    let mut tiles = WorkTileScheduler::default();

    tiles.set_max_num_path_states(4);
    tiles.reset(BufferParams::new(8, 8), 0, 2, 0);
    target.reset().unwrap();

    for _ in 0..10_000 {
        let iteration = target.step(&mut tiles).unwrap();

        let launches: Vec<_> = target
            .queue_mut()
            .take_trace()
            .into_iter()
            .filter(|dispatch| !dispatch.kernel.is_init())
            .collect();

        assert!(launches.len() <= 1);

        for launch in &launches {
            assert_eq!(Some(launch.kernel), iteration.dispatched);

            let states: HashSet<_> = launch.states.iter().collect();

            assert_eq!(launch.states.len(), states.len());
        }

        let counter = target.queue_counter();

        assert!(counter.num_main_paths() <= 32);
        assert!(counter.num_shadow_paths() <= 32);
        assert!(target.max_active_main_path_index() <= 32);

        if iteration.finished {
            assert_film(&target, 2);
            return;
        }
    }

    panic!("render didn't finish");
}

#[test]
fn shadow_catcher_splits_fit_into_capacity() {
    let renderer = MockRenderer::new(7)
        .with_shadow_catcher_probability(1.0)
        .with_background_probability(0.5);

    let mut target = mock(
        renderer,
        64,
        SceneInfo::new(KernelFeatures::SHADOW_CATCHER),
        16,
        16,
    );

    let mut tiles = WorkTileScheduler::default();

    tiles.set_max_num_path_states(8);
    tiles.reset(BufferParams::new(16, 16), 0, 4, 0);
    target.reset().unwrap();

    loop {
        let iteration = target.step(&mut tiles).unwrap();

        assert!(target.max_active_main_path_index() <= 64);

        if iteration.finished {
            break;
        }
    }

    assert_film(&target, 4);
}

#[test]
fn shadow_catcher_render() {
    let renderer = MockRenderer::new(8).with_shadow_catcher_probability(0.5);

    let mut target = mock(
        renderer,
        40,
        SceneInfo::new(KernelFeatures::SHADOW_CATCHER | KernelFeatures::AO),
        10,
        10,
    );

    target.render_samples(0, 3, 0).unwrap();

    assert_film(&target, 3);
    assert!(target.queue_counter().is_empty());
}

#[test]
fn cancellation_drains_paths_in_flight() {
    let mut target = mock(
        MockRenderer::new(9),
        64,
        SceneInfo::new(KernelFeatures::empty()),
        16,
        16,
    );

    let token = target.cancel_token();

    *target.queue_mut().kernels_mut() =
        MockRenderer::new(9).with_cancel_after(50, token);

    target.render_samples(0, 8, 0).unwrap();

    assert!(target.is_cancel_requested());
    assert!(target.queue_counter().is_empty());

    let film = film(&target);
    let total: f32 = film.iter().sum();

    assert!(total > 0.0);
    assert!(total < (16 * 16 * 8) as f32);

    for value in film {
        assert!((0.0..=8.0).contains(&value));
        assert_relative_eq!(value.round(), value);
    }
}

#[test]
fn cancellation_is_cleared_by_the_next_frame() {
    let mut target = mock(
        MockRenderer::new(13),
        32,
        SceneInfo::new(KernelFeatures::empty()),
        6,
        6,
    );

    target.cancel_token().cancel();

    let stats = target.render_samples(0, 2, 0).unwrap();

    assert!(stats.iterations > 0);
    assert!(!target.is_cancel_requested());
    assert_film(&target, 2);
}

#[test]
fn device_failure_aborts_the_frame() {
    let renderer = MockRenderer::new(10)
        .with_failure(DeviceKernel::IntegratorShadeSurface);

    let mut target = mock(
        renderer,
        32,
        SceneInfo::new(KernelFeatures::empty()),
        8,
        8,
    );

    let result = target.render_samples(0, 2, 0);

    assert!(
        matches!(result, Err(Error::Device { .. })),
        "unexpected result: {result:?}"
    );

    // the next frame starts from scratch
    target.queue_mut().kernels_mut().heal();
    target.render_samples(0, 2, 0).unwrap();

    assert!(target.queue_counter().is_empty());

    for value in film(&target) {
        assert!(value >= 2.0);
    }
}

#[test]
fn negative_counters_are_rejected() {
    let mut target = bare(8);

    target.reset().unwrap();
    set_counter(&mut target, DeviceKernel::IntegratorShadeLight, -1);

    let result = target.sync_counters().map(|counter| *counter);

    assert!(
        matches!(
            result,
            Err(Error::NegativeQueueCounter {
                kernel: DeviceKernel::IntegratorShadeLight,
                count: -1,
            })
        ),
        "unexpected result: {result:?}"
    );
}

#[test]
fn overflowing_counters_are_rejected() {
    let mut target = bare(8);

    target.reset().unwrap();
    set_counter(&mut target, DeviceKernel::IntegratorIntersectClosest, 9);

    let result = target.sync_counters().map(|counter| *counter);

    assert!(
        matches!(
            result,
            Err(Error::CapacityExceeded {
                space: "main",
                queued: 9,
                capacity: 8,
            })
        ),
        "unexpected result: {result:?}"
    );

    set_counter(&mut target, DeviceKernel::IntegratorIntersectClosest, 0);
    set_counter(&mut target, DeviceKernel::IntegratorShadeShadow, 9);

    let result = target.sync_counters().map(|counter| *counter);

    assert!(
        matches!(result, Err(Error::CapacityExceeded { space: "shadow", .. })),
        "unexpected result: {result:?}"
    );
}

#[test]
fn inconsistent_counters_stall() {
    let renderer = MockRenderer::new(11)
        .with_background_probability(1.0)
        .with_leak(DeviceKernel::IntegratorShadeShadow);

    let mut target = mock(
        renderer,
        32,
        SceneInfo::new(KernelFeatures::empty()),
        4,
        4,
    );

    let result = target.render_samples(0, 1, 0);

    assert!(
        matches!(result, Err(Error::Stalled { active_paths: 1 })),
        "unexpected result: {result:?}"
    );
}

#[test]
fn scene_update_reallocates_states_when_needed() {
    let renderer = MockRenderer::new(12).with_volume_probability(0.3);

    let mut target = mock(
        renderer,
        32,
        SceneInfo::new(KernelFeatures::empty()),
        8,
        8,
    );

    target.render_samples(0, 1, 0).unwrap();

    let layout = target.path_states().layout().clone();

    // already covered
    target
        .update_scene(
            SceneInfo::new(KernelFeatures::empty()).with_max_shaders(1),
        )
        .unwrap();

    assert!(std::sync::Arc::ptr_eq(
        &layout,
        target.path_states().layout()
    ));

    target
        .update_scene(
            SceneInfo::new(KernelFeatures::VOLUME)
                .with_volume_stack_size(2)
                .with_max_shaders(5),
        )
        .unwrap();

    assert!(!std::sync::Arc::ptr_eq(
        &layout,
        target.path_states().layout()
    ));

    assert!(target
        .path_states()
        .covers(KernelFeatures::VOLUME, 2));

    assert_eq!(32, target.max_num_paths());

    target.render_samples(1, 2, 0).unwrap();

    assert_film(&target, 3);
}

#[test]
fn capacity_is_derived_from_the_device() {
    let queue = HostQueue::builder(())
        .with_capacity(40)
        .with_busy_states(30)
        .build();

    let target = scheduler(
        queue,
        SceneInfo::new(KernelFeatures::empty()),
        4,
        4,
        Default::default(),
    );

    assert_eq!(40, target.max_num_paths());
    assert_eq!(20, target.min_num_active_main_paths());

    let queue = HostQueue::builder(()).with_capacity(0).build();

    let result = crate::WavefrontScheduler::new(
        queue,
        SceneInfo::new(KernelFeatures::empty()),
        BufferParams::new(4, 4),
        crate::BufferHandle::new(0),
        Default::default(),
    );

    assert!(matches!(result, Err(Error::NoCapacity { .. })));
}

#[test]
fn ambient_occlusion_needs_room_for_two_shadow_paths() {
    let queue = HostQueue::builder(MockRenderer::new(14))
        .with_capacity(1)
        .build();

    let result = crate::WavefrontScheduler::new(
        queue,
        SceneInfo::new(KernelFeatures::AO),
        BufferParams::new(2, 2),
        crate::BufferHandle::new(0),
        Default::default(),
    );

    assert!(matches!(
        result,
        Err(Error::NoCapacity {
            min_num_paths: 2,
            ..
        })
    ));

    let renderer = MockRenderer::new(14).with_background_probability(0.0);
    let scene = SceneInfo::new(KernelFeatures::AO);
    let mut target = mock(renderer, 2, scene, 2, 2);

    target.render_samples(0, 2, 0).unwrap();

    assert_film(&target, 2);
    assert!(target.queue().kernels().num_shadow_hits > 0);
}
