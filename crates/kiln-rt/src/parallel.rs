//! Thread-pool launch of parallel lambdas and the barrier shared by their tasks.

use crate::abi::{ParallelGroupEnv, ParallelLambda};
use crate::last_error;
use parking_lot::{Condvar, Mutex};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

static MAX_TASKS: AtomicUsize = AtomicUsize::new(0);

/// Caps the number of tasks of a launch that asks for the default. 0 restores `num_cpus`.
pub fn set_max_tasks(tasks: usize) {
    MAX_TASKS.store(tasks, Ordering::Relaxed);
}

pub fn max_tasks() -> usize {
    match MAX_TASKS.load(Ordering::Relaxed) {
        0 => num_cpus::get(),
        tasks => tasks,
    }
}

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    broken: bool,
}

/// Reusable barrier for the tasks of one launch.
///
/// Broken once any task fails, so tasks still waiting for it are released instead of
/// blocking on a peer that will never arrive.
struct TaskBarrier {
    tasks: usize,
    state: Mutex<BarrierState>,
    opened: Condvar,
}

impl TaskBarrier {
    fn new(tasks: usize) -> Self {
        TaskBarrier { tasks, state: Mutex::new(BarrierState::default()), opened: Condvar::new() }
    }

    /// Waits for every task. Returns false if the barrier broke before it opened.
    fn wait(&self) -> bool {
        let mut state = self.state.lock();
        if state.broken {
            return false;
        }
        state.arrived += 1;
        if state.arrived == self.tasks {
            state.arrived = 0;
            state.generation += 1;
            self.opened.notify_all();
            return true;
        }
        let generation = state.generation;
        while state.generation == generation && !state.broken {
            self.opened.wait(&mut state);
        }
        state.generation != generation
    }

    fn break_barrier(&self) {
        self.state.lock().broken = true;
        self.opened.notify_all();
    }
}

/// Closure data shared by every task; the generated lambda only reads it.
#[derive(Clone, Copy)]
struct SharedData(*mut c_void);

unsafe impl Send for SharedData {}
unsafe impl Sync for SharedData {}

/// Runs `entry` once per task and waits for all of them.
///
/// Returns the first nonzero status reported by a task. The failing task's error is moved to
/// the calling thread, and the launch barrier is broken so that tasks waiting on it return
/// an error instead of blocking forever.
///
/// # Safety
///
/// `entry` must be a generated parallel lambda and `cdata` the closure it expects.
#[no_mangle]
pub unsafe extern "C" fn kiln_backend_parallel_launch(
    entry: ParallelLambda,
    cdata: *mut c_void,
    num_task: i32,
) -> i32 {
    let num_task = match usize::try_from(num_task) {
        Ok(0) | Err(_) => max_tasks(),
        Ok(n) => n,
    }
    .max(1);
    let Ok(task_count) = i32::try_from(num_task) else {
        last_error::set("ValueError", "too many parallel tasks");
        return -1;
    };
    log::debug!("Launching {num_task} parallel tasks");

    let barrier = TaskBarrier::new(num_task);
    let data = SharedData(cdata);
    let failure = Mutex::new(None);

    let scoped = crossbeam_utils::thread::scope(|scope| {
        for task_id in 0..task_count {
            let barrier = &barrier;
            let failure = &failure;
            scope.spawn(move |_| {
                let data = data;
                let penv = ParallelGroupEnv {
                    sync_handle: barrier as *const TaskBarrier as *mut c_void,
                    num_task: task_count,
                };
                // SAFETY: the caller guarantees `entry` and `cdata` match.
                let status = unsafe { entry(task_id, &penv, data.0) };
                if status != 0 {
                    let mut failure = failure.lock();
                    if failure.is_none() {
                        *failure = Some((status, last_error::take()));
                    }
                    drop(failure);
                    barrier.break_barrier();
                }
            });
        }
    });
    if scoped.is_err() {
        last_error::set("RuntimeError", "a parallel task panicked");
        return -1;
    }

    match failure.into_inner() {
        Some((status, err)) => {
            if let Some(err) = err {
                last_error::restore(err);
            }
            status
        }
        None => 0,
    }
}

/// Blocks until every task of the launch reaches the barrier.
///
/// Returns -1 if another task of the launch failed before the barrier opened.
///
/// # Safety
///
/// `penv` must be the environment passed to the calling task.
#[no_mangle]
pub unsafe extern "C" fn kiln_backend_parallel_barrier(_task_id: i32, penv: *const ParallelGroupEnv) -> i32 {
    let Some(barrier) = penv.as_ref().and_then(|env| (env.sync_handle as *const TaskBarrier).as_ref()) else {
        last_error::set("RuntimeError", "barrier outside a parallel launch");
        return -1;
    };
    if barrier.wait() {
        0
    } else {
        last_error::set("RuntimeError", "parallel launch aborted by a failed task");
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    unsafe extern "C" fn count_tasks(task_id: i32, penv: *const ParallelGroupEnv, cdata: *mut c_void) -> i32 {
        let counter = &*(cdata as *const AtomicI32);
        counter.fetch_add(1, Ordering::SeqCst);
        kiln_backend_parallel_barrier(task_id, penv);
        // Every task has counted once the barrier opens.
        if counter.load(Ordering::SeqCst) == (*penv).num_task {
            0
        } else {
            -2
        }
    }

    unsafe extern "C" fn fail_odd(task_id: i32, _: *const ParallelGroupEnv, _: *mut c_void) -> i32 {
        if task_id % 2 == 1 {
            last_error::set("ValueError", "odd task");
            -5
        } else {
            0
        }
    }

    unsafe extern "C" fn fail_before_barrier(
        task_id: i32,
        penv: *const ParallelGroupEnv,
        _: *mut c_void,
    ) -> i32 {
        if task_id == 0 {
            last_error::set("ValueError", "first task");
            return -3;
        }
        kiln_backend_parallel_barrier(task_id, penv)
    }

    unsafe extern "C" fn pass_barrier_twice(
        task_id: i32,
        penv: *const ParallelGroupEnv,
        _: *mut c_void,
    ) -> i32 {
        let first = kiln_backend_parallel_barrier(task_id, penv);
        let second = kiln_backend_parallel_barrier(task_id, penv);
        first | second
    }

    #[test]
    fn barrier_is_reusable_within_a_launch() {
        let status = unsafe { kiln_backend_parallel_launch(pass_barrier_twice, std::ptr::null_mut(), 3) };
        assert_eq!(status, 0);
    }

    #[test]
    fn failure_before_the_barrier_releases_waiting_tasks() {
        let status = unsafe { kiln_backend_parallel_launch(fail_before_barrier, std::ptr::null_mut(), 4) };
        assert_eq!(status, -3);
        assert_eq!(last_error::take().unwrap().message, "first task");
    }

    #[test]
    fn broken_barrier_reports_an_error() {
        let barrier = TaskBarrier::new(2);
        barrier.break_barrier();
        let penv = ParallelGroupEnv { sync_handle: &barrier as *const TaskBarrier as *mut c_void, num_task: 2 };
        assert_eq!(unsafe { kiln_backend_parallel_barrier(1, &penv) }, -1);
        assert!(last_error::take().unwrap().message.contains("aborted"));
    }

    #[test]
    fn all_tasks_meet_at_the_barrier() {
        let counter = AtomicI32::new(0);
        let status = unsafe {
            kiln_backend_parallel_launch(count_tasks, &counter as *const AtomicI32 as *mut c_void, 4)
        };
        assert_eq!(status, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn task_failure_reaches_the_caller() {
        let status = unsafe { kiln_backend_parallel_launch(fail_odd, std::ptr::null_mut(), 4) };
        assert_eq!(status, -5);
        assert_eq!(last_error::take().unwrap().message, "odd task");
    }
}
