use kiln_rt::set_max_tasks;
use kiln_tir::{attr, DataType, Expr, ForKind, PrimFunc, Stmt, Var};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;
use std::thread::ThreadId;

mod common;
use common::*;

static RECORDED: Mutex<Vec<(ThreadId, i32)>> = Mutex::new(Vec::new());
// Held by tests that change the task cap and read `RECORDED`.
static TASK_CAP: Mutex<()> = Mutex::new(());
static BUMPS: AtomicI32 = AtomicI32::new(0);

extern "C" fn record_index(index: i32) -> i32 {
    RECORDED.lock().unwrap().push((std::thread::current().id(), index));
    0
}

extern "C" fn bump() -> i32 {
    BUMPS.fetch_add(1, Ordering::SeqCst);
    0
}

/// Indices seen by each task, sorted.
fn take_partition() -> Vec<Vec<i32>> {
    let mut by_thread: BTreeMap<String, Vec<i32>> = BTreeMap::new();
    for (thread, index) in RECORDED.lock().unwrap().drain(..) {
        by_thread.entry(format!("{thread:?}")).or_default().push(index);
    }
    let mut parts: Vec<Vec<i32>> = by_thread
        .into_values()
        .map(|mut part| {
            part.sort();
            part
        })
        .collect();
    parts.sort();
    parts
}

fn recording_kernel(name: &str, stride: bool) -> PrimFunc {
    let record = extern_call("record_index", vec![Expr::var(&i())]);
    let parallel = Stmt::for_loop(&i(), Expr::var(&n()), ForKind::Parallel, record);
    let body = if stride {
        Stmt::attr(attr::PRAGMA_PARALLEL_STRIDE_PATTERN, Expr::int32(1), parallel)
    } else {
        parallel
    };
    kernel(name, launch(body))
}

#[test]
fn test_loop_partitioning_across_tasks() {
    let _cap = TASK_CAP.lock().unwrap_or_else(|e| e.into_inner());
    let module = load(
        &[recording_kernel("blocks", false), recording_kernel("strides", true)],
        &[("record_index", record_index as *const u8)],
    );
    let blocks: Kernel = unsafe { module.get("blocks").unwrap() };
    let strides: Kernel = unsafe { module.get("strides").unwrap() };

    set_max_tasks(3);
    assert_eq!(blocks(std::ptr::null_mut(), 10), 0);
    assert_eq!(take_partition(), vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);

    assert_eq!(strides(std::ptr::null_mut(), 7), 0);
    assert_eq!(take_partition(), vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    set_max_tasks(0);
}

#[test]
fn test_partitions_cover_every_index_once() {
    let _cap = TASK_CAP.lock().unwrap_or_else(|e| e.into_inner());
    let module = load(
        &[recording_kernel("blocks", false), recording_kernel("strides", true)],
        &[("record_index", record_index as *const u8)],
    );
    let blocks: Kernel = unsafe { module.get("blocks").unwrap() };
    let strides: Kernel = unsafe { module.get("strides").unwrap() };

    for tasks in 1..=6 {
        set_max_tasks(tasks);
        for extent in 1..=13 {
            for (stride, run) in [(false, blocks), (true, strides)] {
                assert_eq!(run(std::ptr::null_mut(), extent), 0);
                let parts = take_partition();
                let context = format!("tasks={tasks} extent={extent} stride={stride}: {parts:?}");

                assert!(parts.len() <= tasks, "{context}");
                let mut all: Vec<i32> = parts.iter().flatten().copied().collect();
                all.sort();
                assert_eq!(all, (0..extent).collect::<Vec<_>>(), "{context}");

                for part in &parts {
                    let step = if stride { tasks as i32 } else { 1 };
                    assert!(part.windows(2).all(|w| w[1] - w[0] == step), "{context}");
                }
            }
        }
    }
    set_max_tasks(0);
}

#[test]
fn test_parallel_fill_writes_every_element() {
    let body = launch(fill_loop(ForKind::Parallel, Expr::var(&i())));
    let module = load(&[kernel("fill", body)], &[]);
    let fill: Kernel = unsafe { module.get("fill").unwrap() };

    let mut data = vec![-1i32; 1000];
    assert_eq!(fill(data.as_mut_ptr(), data.len() as i32), 0);
    assert!(data.iter().enumerate().all(|(index, value)| *value == index as i32));
}

#[test]
fn test_parallel_loop_outside_launch_is_launched() {
    let module = load(&[kernel("fill", fill_loop(ForKind::Parallel, Expr::var(&i())))], &[]);
    let fill: Kernel = unsafe { module.get("fill").unwrap() };

    let mut data = vec![0i32; 33];
    assert_eq!(fill(data.as_mut_ptr(), 33), 0);
    assert_eq!(data[32], 32);
}

#[test]
fn test_barrier_orders_dependent_loops() {
    // tmp[i] = 10 * i, then out[i] = tmp[n - 1 - i] across tasks.
    let tmp = Var::handle("tmp");
    let produce = Stmt::for_loop(
        &i(),
        Expr::var(&n()),
        ForKind::Parallel,
        Stmt::store(&tmp, Expr::var(&i()), Expr::mul(Expr::var(&i()), Expr::int32(10))),
    );
    let mirrored = Expr::sub(Expr::sub(Expr::var(&n()), Expr::int32(1)), Expr::var(&i()));
    let consume = fill_loop(ForKind::Parallel, Expr::load(DataType::int32(), &tmp, mirrored));
    let body = launch(Stmt::seq(vec![
        Stmt::attr(attr::PRAGMA_PARALLEL_BARRIER_WHEN_FINISH, Expr::int32(1), produce),
        consume,
    ]));
    let func = PrimFunc::new("mirror", vec![out(), tmp, n()], body).exported();
    let module = load(&[func], &[]);
    let mirror: extern "C" fn(*mut i32, *mut i32, i32) -> i32 = unsafe { module.get("mirror").unwrap() };

    let mut data = vec![0i32; 256];
    let mut scratch = vec![0i32; 256];
    assert_eq!(mirror(data.as_mut_ptr(), scratch.as_mut_ptr(), 256), 0);
    for (index, value) in data.iter().enumerate() {
        assert_eq!(*value, (255 - index as i32) * 10);
    }
}

#[test]
fn test_launch_without_captured_variables() {
    let body = launch(Stmt::for_loop(&i(), Expr::int32(8), ForKind::Parallel, extern_call("bump", vec![])));
    let func = PrimFunc::new("bump_all", vec![], body).exported();
    let module = load(&[func], &[("bump", bump as *const u8)]);
    let bump_all: extern "C" fn() -> i32 = unsafe { module.get("bump_all").unwrap() };

    assert_eq!(bump_all(), 0);
    assert_eq!(BUMPS.load(Ordering::SeqCst), 8);
}

#[test]
fn test_closure_with_a_single_variable() {
    // Only `out` is free in the launch body.
    let body = launch(Stmt::for_loop(
        &i(),
        Expr::int32(16),
        ForKind::Parallel,
        Stmt::store(&out(), Expr::var(&i()), Expr::mul(Expr::var(&i()), Expr::int32(3))),
    ));
    let func = PrimFunc::new("triple", vec![out()], body).exported();
    let module = load(&[func], &[]);
    let triple: extern "C" fn(*mut i32) -> i32 = unsafe { module.get("triple").unwrap() };

    let mut data = vec![0i32; 16];
    assert_eq!(triple(data.as_mut_ptr()), 0);
    assert!(data.iter().enumerate().all(|(index, value)| *value == 3 * index as i32));
}

#[test]
fn test_closure_carries_mixed_types() {
    let base = Var::new("base", DataType::int64());
    let value = Expr::add(Expr::cast(DataType::int32(), Expr::var(&base)), Expr::var(&i()));
    let func = PrimFunc::new("offset_fill", vec![out(), n(), base], launch(fill_loop(ForKind::Parallel, value)))
        .exported();
    let module = load(&[func], &[]);
    let offset_fill: extern "C" fn(*mut i32, i32, i64) -> i32 = unsafe { module.get("offset_fill").unwrap() };

    let mut data = vec![0i32; 17];
    assert_eq!(offset_fill(data.as_mut_ptr(), 17, 100), 0);
    assert_eq!(data[0], 100);
    assert_eq!(data[16], 116);
}
